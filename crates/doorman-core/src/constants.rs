//! Core constants for the station wire protocol and on-disk formats.
//!
//! This module defines the constants shared across the Doorman access control
//! station: the single-character command vocabulary spoken over the serial
//! link, the timestamp and CSV formats of the durable log, and the default
//! timing parameters of the enrollment flow.
//!
//! # Wire Protocol
//!
//! The device and the host exchange newline-terminated ASCII lines. The
//! device reports tag presentations as `UID:XX-XX-XX-XX` lines and answers
//! connectivity probes with `PONG:<firmware-tag>`. The host replies with
//! single-character commands:
//!
//! | Byte | Meaning |
//! |------|---------|
//! | `1` | access granted |
//! | `0` | access denied |
//! | `E` | enter enrollment mode |
//! | `A` | return to access mode |
//! | `W` | await admin validation |
//! | `X` | admin validation rejected |
//! | `K` | enrollment confirmed (optionally `K:<name>`) |
//! | `P` | connectivity probe |
//!
//! # Usage
//!
//! ```
//! use doorman_core::constants::*;
//!
//! assert_eq!(CMD_GRANTED, '1');
//! assert_eq!(LOG_HEADER, "timestamp,uid,status,station_id");
//! ```

// ============================================================================
// Wire Commands (host -> device)
// ============================================================================

/// Access granted: the device releases the lock/servo.
pub const CMD_GRANTED: char = '1';

/// Access denied: the device signals rejection.
pub const CMD_DENIED: char = '0';

/// Enter enrollment mode: the device switches its display to capture mode.
pub const CMD_ENROLL: char = 'E';

/// Return to access mode. Also sent shortly after the port opens to wake
/// firmwares that reset on DTR.
pub const CMD_ACCESS: char = 'A';

/// Await admin validation: the device prompts for the administrator tag.
pub const CMD_AWAIT_ADMIN: char = 'W';

/// Admin validation rejected.
pub const CMD_ADMIN_REJECTED: char = 'X';

/// Enrollment confirmed. May carry a display name as `K:<name>`.
pub const CMD_CONFIRM: char = 'K';

/// Connectivity probe; the firmware answers with a pong line.
pub const CMD_PING: char = 'P';

// ============================================================================
// Wire Tokens (device -> host)
// ============================================================================

/// Marker preceding the firmware tag in a probe reply.
///
/// A healthy device answers [`CMD_PING`] with a line containing
/// `PONG:<firmware-tag>`, e.g. `PONG:DOORMAN-FW-1.4`.
pub const PONG_PREFIX: &str = "PONG:";

/// Marker preceding a reported tag identifier.
///
/// The device emits `UID:XX-XX-XX-XX` (separator and spacing vary between
/// firmware revisions, which is why parsing is permissive).
pub const UID_PREFIX: &str = "UID";

// ============================================================================
// UID Constraints
// ============================================================================

/// Minimum normalized uid length (characters).
///
/// # Value: 2
pub const MIN_UID_LENGTH: usize = 2;

/// Maximum normalized uid length (characters).
///
/// NFC tag identifiers are 4, 7, or 10 bytes; with separators that tops out
/// well under this bound. The limit protects parsers and file formats from
/// pathological input, it is not a protocol figure.
///
/// # Value: 64
pub const MAX_UID_LENGTH: usize = 64;

// ============================================================================
// Durable Log Formats
// ============================================================================

/// Timestamp format used in the append log and the registry.
///
/// # Examples
///
/// ```
/// use doorman_core::constants::TIMESTAMP_FORMAT;
/// use chrono::NaiveDateTime;
///
/// let ts = NaiveDateTime::parse_from_str("2025-03-01 08:15:00", TIMESTAMP_FORMAT);
/// assert!(ts.is_ok());
/// ```
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date suffix appended to session log file names (`<label>_<date>.csv`).
pub const FILE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Header line of every append-log file.
pub const LOG_HEADER: &str = "timestamp,uid,status,station_id";

/// Header line of the user registry file.
pub const REGISTRY_HEADER: &str = "uid,name,registered_at";

// ============================================================================
// Pointer Sidecar
// ============================================================================

/// Magic marker identifying a pointer sidecar file: `DOOR` in ASCII.
///
/// The sidecar records which log file is currently active so a restart can
/// resume the interrupted session. All sidecar fields are big-endian.
pub const POINTER_MAGIC: u32 = 0x444F_4F52;

/// Pointer sidecar format version.
pub const POINTER_VERSION: u16 = 1;

// ============================================================================
// Timing Defaults
// ============================================================================

/// How long the station waits for the administrator tag before giving up
/// and reverting to access mode (seconds).
///
/// # Value: 15 seconds
pub const DEFAULT_ADMIN_WAIT_SECS: u64 = 15;

/// How long an enrollment capture may remain open before the station
/// reverts to access mode (seconds).
///
/// # Value: 20 seconds
pub const DEFAULT_ENROLL_SECS: u64 = 20;

/// Delay between opening the port and sending the wake-up [`CMD_ACCESS`].
///
/// Serial adapters assert DTR on open, which resets common microcontroller
/// boards; the firmware needs this long to boot before it accepts commands.
///
/// # Value: 2000 ms
pub const ACTIVATION_DELAY_MS: u64 = 2000;

/// Bounded wait for a pong line during a connectivity probe.
///
/// # Value: 3000 ms
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;

/// Interval of the background sweep that restores deleted log/registry
/// files from their backups.
///
/// # Value: 30 seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

// ============================================================================
// Station Defaults
// ============================================================================

/// Default serial baud rate for the reader/servo firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default station identifier recorded with every access event.
pub const DEFAULT_STATION_ID: u32 = 1;

/// Default administrator uid, overridable in the station config.
pub const DEFAULT_ADMIN_UID: &str = "EB-EE-C0-1";

/// Bound of the in-memory cache of today's events kept for fast queries.
///
/// Oldest entries are evicted first; the durable log is never truncated.
///
/// # Value: 512 events
pub const TODAY_CACHE_CAPACITY: usize = 512;
