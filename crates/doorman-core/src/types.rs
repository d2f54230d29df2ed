use crate::{
    Result,
    constants::{MAX_UID_LENGTH, MIN_UID_LENGTH, TIMESTAMP_FORMAT},
    error::Error,
};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized NFC tag identifier.
///
/// Device firmwares disagree on separators and casing (`aa-bb-cc-01`,
/// `AA BB CC 01`, ...). Every uid entering the system goes through the same
/// normalization: trim surrounding whitespace, uppercase. Comparisons are
/// therefore exact after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid(String);

impl Uid {
    /// Create a normalized uid with validation.
    ///
    /// The input is normalized (trimmed and converted to uppercase) before
    /// validation. Normalization is idempotent: feeding the output back in
    /// yields an equal uid.
    ///
    /// # Errors
    /// Returns `Error::InvalidUidFormat` if:
    /// - The normalized length is not between 2-64 characters
    /// - The uid contains characters other than hex digits, `-` and spaces
    pub fn new(raw: &str) -> Result<Self> {
        // Normalize: trim and uppercase
        let uid = raw.trim().to_uppercase();

        let len = uid.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&len) {
            return Err(Error::InvalidUidFormat(format!(
                "uid must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} chars, got {len}"
            )));
        }

        if !uid
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-' || c == ' ')
        {
            return Err(Error::InvalidUidFormat(format!(
                "uid contains non-hex characters: {uid}"
            )));
        }

        Ok(Uid(uid))
    }

    /// Get the normalized uid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an arbitrary raw token.
    ///
    /// Used where the counterpart may not have passed through [`Uid::new`]
    /// yet, e.g. the configured admin uid or operator-typed input.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        self.0 == raw.trim().to_uppercase()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Uid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uid::new(s)
    }
}

/// Outcome of one access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Granted,
    Denied,
    Unknown,
}

impl Decision {
    /// Status label written to the durable log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Granted => "GRANTED",
            Decision::Denied => "DENIED",
            Decision::Unknown => "UNKNOWN",
        }
    }

    /// Parse a status label leniently.
    ///
    /// Unrecognized labels map to [`Decision::Unknown`] rather than failing:
    /// log files may contain rows written by older firmware bridges and one
    /// bad row must not poison a batch import.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "GRANTED" => Decision::Granted,
            "DENIED" => Decision::Denied,
            _ => Decision::Unknown,
        }
    }

    /// Returns `true` if the decision opens the door.
    #[inline]
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, Decision::Granted)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wall-clock timestamp in the on-disk format (`yyyy-MM-dd HH:mm:ss`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTimestamp(NaiveDateTime);

impl LogTimestamp {
    /// Create a timestamp from the current local time.
    #[must_use]
    pub fn now() -> Self {
        LogTimestamp(Local::now().naive_local())
    }

    /// Create a timestamp from a naive datetime.
    #[must_use]
    pub fn from_naive(dt: NaiveDateTime) -> Self {
        LogTimestamp(dt)
    }

    /// Parse from the log format: "2025-03-01 08:15:00".
    ///
    /// # Errors
    /// Returns `Error::InvalidMessageFormat` if the string does not match
    /// the `yyyy-MM-dd HH:mm:ss` format.
    pub fn parse(s: &str) -> Result<Self> {
        let dt = NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).map_err(|e| {
            Error::InvalidMessageFormat {
                message: format!("Invalid timestamp '{s}': {e}"),
            }
        })?;
        Ok(LogTimestamp(dt))
    }

    /// Format for the durable log and registry files.
    #[must_use]
    pub fn format(&self) -> String {
        self.0.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Get the inner datetime.
    #[must_use]
    pub fn inner(&self) -> NaiveDateTime {
        self.0
    }

    /// Returns `true` if this timestamp falls on today's local date.
    #[must_use]
    pub fn is_today(&self) -> bool {
        self.0.date() == Local::now().date_naive()
    }
}

impl fmt::Display for LogTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// One access attempt, immutable once built.
///
/// Appended to the durable log and fanned out to notification subscribers;
/// never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub uid: Uid,
    pub timestamp: LogTimestamp,
    pub decision: Decision,
    pub station_id: u32,
    pub resolved_name: Option<String>,
}

impl AccessEvent {
    /// Build an event stamped with the current local time.
    #[must_use]
    pub fn new(uid: Uid, decision: Decision, station_id: u32) -> Self {
        AccessEvent {
            uid,
            timestamp: LogTimestamp::now(),
            decision,
            station_id,
            resolved_name: None,
        }
    }

    /// Attach the display name resolved from the registry.
    #[must_use]
    pub fn with_resolved_name(mut self, name: impl Into<String>) -> Self {
        self.resolved_name = Some(name.into());
        self
    }
}

/// An enrolled uid/name pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub uid: Uid,
    pub display_name: String,
    pub registered_at: Option<LogTimestamp>,
}

impl Credential {
    /// Build a credential registered now.
    #[must_use]
    pub fn new(uid: Uid, display_name: impl Into<String>) -> Self {
        Credential {
            uid,
            display_name: display_name.into(),
            registered_at: Some(LogTimestamp::now()),
        }
    }
}

/// Folded counters over today's access events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStats {
    pub granted: u64,
    pub denied: u64,
    pub unknown: u64,
    pub total: u64,
}

impl DayStats {
    /// Count one decision.
    pub fn record(&mut self, decision: Decision) {
        match decision {
            Decision::Granted => self.granted += 1,
            Decision::Denied => self.denied += 1,
            Decision::Unknown => self.unknown += 1,
        }
        self.total += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("aa-bb-cc-01", "AA-BB-CC-01")]
    #[case("  EB-EE-C0-1  ", "EB-EE-C0-1")]
    #[case("11 22 33 44", "11 22 33 44")]
    #[case("04a3f25b", "04A3F25B")]
    fn test_uid_normalization(#[case] input: &str, #[case] expected: &str) {
        let uid = Uid::new(input).unwrap();
        assert_eq!(uid.as_str(), expected);
    }

    #[rstest]
    #[case("aa-bb-cc-01")]
    #[case("  11 22 33 44 ")]
    #[case("EB-EE-C0-1")]
    fn test_uid_normalization_idempotent(#[case] input: &str) {
        let once = Uid::new(input).unwrap();
        let twice = Uid::new(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[rstest]
    #[case("")] // empty
    #[case("   ")] // whitespace only
    #[case("a")] // too short
    #[case("GG-HH-II-JJ")] // non-hex
    #[case("uid:zz")] // non-hex
    fn test_uid_invalid(#[case] input: &str) {
        assert!(Uid::new(input).is_err());
    }

    #[test]
    fn test_uid_too_long() {
        let input = "A".repeat(65);
        assert!(Uid::new(&input).is_err());
    }

    #[test]
    fn test_uid_matches_case_insensitive() {
        let uid = Uid::new("AA-BB-CC-01").unwrap();
        assert!(uid.matches("aa-bb-cc-01"));
        assert!(uid.matches("  AA-bb-CC-01 "));
        assert!(!uid.matches("AA-BB-CC-02"));
    }

    #[rstest]
    #[case("GRANTED", Decision::Granted)]
    #[case("granted", Decision::Granted)]
    #[case(" DENIED ", Decision::Denied)]
    #[case("UNKNOWN", Decision::Unknown)]
    #[case("whatever", Decision::Unknown)]
    fn test_decision_from_label(#[case] label: &str, #[case] expected: Decision) {
        assert_eq!(Decision::from_label(label), expected);
    }

    #[test]
    fn test_decision_labels_round_trip() {
        for d in [Decision::Granted, Decision::Denied, Decision::Unknown] {
            assert_eq!(Decision::from_label(d.as_str()), d);
        }
    }

    #[test]
    fn test_log_timestamp_round_trip() {
        let ts = LogTimestamp::parse("2025-03-01 08:15:00").unwrap();
        assert_eq!(ts.format(), "2025-03-01 08:15:00");
    }

    #[test]
    fn test_log_timestamp_rejects_wire_garbage() {
        assert!(LogTimestamp::parse("01/03/2025 08:15").is_err());
        assert!(LogTimestamp::parse("not a date").is_err());
    }

    #[test]
    fn test_access_event_resolved_name() {
        let uid = Uid::new("EB-EE-C0-1").unwrap();
        let event = AccessEvent::new(uid, Decision::Granted, 1).with_resolved_name("Ana");
        assert_eq!(event.resolved_name.as_deref(), Some("Ana"));
        assert!(event.decision.is_granted());
        assert_eq!(event.station_id, 1);
    }

    #[test]
    fn test_day_stats_fold() {
        let mut stats = DayStats::default();
        stats.record(Decision::Granted);
        stats.record(Decision::Granted);
        stats.record(Decision::Denied);
        stats.record(Decision::Unknown);
        assert_eq!(stats.granted, 2);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.total, 4);
    }
}
