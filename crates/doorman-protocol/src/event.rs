//! Inbound line parsing.
//!
//! The reader firmware emits newline-terminated ASCII. Only two line shapes
//! carry meaning for the host; everything else is firmware chatter (boot
//! banners, debug prints) and is deliberately ignored rather than treated as
//! an error.
//!
//! # Line Shapes
//!
//! ```text
//! UID: 04 A3 F2 5B        tag presentation (separator and casing vary)
//! UID:AA-BB-CC-01
//! PONG:DOORMAN-FW-1.4     reply to a connectivity probe
//! ```
//!
//! # Examples
//!
//! ```
//! use doorman_protocol::{DeviceEvent, parse_line};
//!
//! match parse_line("UID: aa-bb-cc-01") {
//!     DeviceEvent::UidReported(uid) => assert_eq!(uid.as_str(), "AA-BB-CC-01"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//!
//! assert!(matches!(parse_line("NFC reader ready"), DeviceEvent::Unrecognized));
//! ```

use doorman_core::{Uid, constants::PONG_PREFIX};
use regex::Regex;
use std::sync::LazyLock;

/// Permissive tag extraction: "UID" with optional colon, then hex digit
/// groups joined by `-` or whitespace. Firmware revisions disagree on the
/// exact shape, so the pattern accepts all of them.
static UID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"UID:?\s*([A-Fa-f0-9\s\-]+)").expect("uid pattern is a valid regex")
});

/// A semantically meaningful line received from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A tag was presented; the uid is already normalized.
    UidReported(Uid),
    /// Reply to the ping probe, carrying the firmware tag.
    Pong(String),
    /// Diagnostic or otherwise meaningless line. Not an error.
    Unrecognized,
}

impl DeviceEvent {
    /// Returns `true` for lines the host acts on.
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        !matches!(self, DeviceEvent::Unrecognized)
    }
}

/// Parse one raw line into a [`DeviceEvent`].
///
/// Pong detection runs first so a probing host is never confused by hex
/// digits inside a firmware tag. A uid match that fails normalization (for
/// example a lone `-`) degrades to `Unrecognized`, matching the policy that
/// unparseable device output is dropped, not raised.
#[must_use]
pub fn parse_line(raw: &str) -> DeviceEvent {
    let line = raw.trim();
    if line.is_empty() {
        return DeviceEvent::Unrecognized;
    }

    if let Some(idx) = line.find(PONG_PREFIX) {
        let tag = line[idx + PONG_PREFIX.len()..].trim();
        if !tag.is_empty() {
            return DeviceEvent::Pong(tag.to_string());
        }
        return DeviceEvent::Unrecognized;
    }

    if let Some(caps) = UID_PATTERN.captures(line)
        && let Some(m) = caps.get(1)
        && let Ok(uid) = Uid::new(m.as_str())
    {
        return DeviceEvent::UidReported(uid);
    }

    DeviceEvent::Unrecognized
}
