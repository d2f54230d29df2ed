//! Outbound command encoding.
//!
//! Replies to the device are single ASCII characters terminated by a
//! newline; the enrollment confirmation may additionally carry the display
//! name (`K:<name>\n`) so the firmware can greet the new user.

use doorman_core::{
    Error, Result,
    constants::{
        CMD_ACCESS, CMD_ADMIN_REJECTED, CMD_AWAIT_ADMIN, CMD_CONFIRM, CMD_DENIED, CMD_ENROLL,
        CMD_GRANTED, CMD_PING,
    },
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Commands the host sends to the device.
///
/// # Wire Format
///
/// Every command is one character plus `\n`; [`HostCommand::Confirm`] with a
/// name becomes `K:<name>\n`.
///
/// # Examples
///
/// ```
/// use doorman_protocol::HostCommand;
///
/// assert_eq!(HostCommand::Granted.encode(), b"1\n");
/// let confirm = HostCommand::confirm_with_name("Ana");
/// assert_eq!(confirm.encode(), b"K:Ana\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostCommand {
    /// Access granted; the device releases the lock.
    Granted,
    /// Access denied.
    Denied,
    /// Switch the device into enrollment capture mode.
    EnterEnrollment,
    /// Return to (or activate) access mode.
    AccessMode,
    /// Prompt for the administrator tag.
    AwaitAdmin,
    /// The presented tag was not the administrator's.
    AdminRejected,
    /// Enrollment stored; optionally carries the display name.
    Confirm { name: Option<String> },
    /// Connectivity probe; the firmware answers with a pong line.
    Ping,
}

impl HostCommand {
    /// Plain confirmation without a display name.
    #[must_use]
    pub fn confirm() -> Self {
        HostCommand::Confirm { name: None }
    }

    /// Confirmation carrying the enrolled display name.
    #[must_use]
    pub fn confirm_with_name(name: impl Into<String>) -> Self {
        HostCommand::Confirm {
            name: Some(name.into()),
        }
    }

    /// The single-character code of this command.
    #[must_use]
    pub fn code(&self) -> char {
        match self {
            HostCommand::Granted => CMD_GRANTED,
            HostCommand::Denied => CMD_DENIED,
            HostCommand::EnterEnrollment => CMD_ENROLL,
            HostCommand::AccessMode => CMD_ACCESS,
            HostCommand::AwaitAdmin => CMD_AWAIT_ADMIN,
            HostCommand::AdminRejected => CMD_ADMIN_REJECTED,
            HostCommand::Confirm { .. } => CMD_CONFIRM,
            HostCommand::Ping => CMD_PING,
        }
    }

    /// Map a bare command character back to its command.
    ///
    /// `K` maps to a nameless confirmation; the name, when present on the
    /// wire, is recovered by [`HostCommand::parse_wire`].
    ///
    /// # Errors
    /// Returns `Error::InvalidCommandCode` for characters outside the
    /// vocabulary.
    pub fn from_code(c: char) -> Result<Self> {
        match c {
            _ if c == CMD_GRANTED => Ok(HostCommand::Granted),
            _ if c == CMD_DENIED => Ok(HostCommand::Denied),
            _ if c == CMD_ENROLL => Ok(HostCommand::EnterEnrollment),
            _ if c == CMD_ACCESS => Ok(HostCommand::AccessMode),
            _ if c == CMD_AWAIT_ADMIN => Ok(HostCommand::AwaitAdmin),
            _ if c == CMD_ADMIN_REJECTED => Ok(HostCommand::AdminRejected),
            _ if c == CMD_CONFIRM => Ok(HostCommand::confirm()),
            _ if c == CMD_PING => Ok(HostCommand::Ping),
            _ => Err(Error::InvalidCommandCode(c.to_string())),
        }
    }

    /// Parse a full wire line (without the trailing newline) back into a
    /// command. Used by the loopback tests and the emulated device end.
    ///
    /// # Errors
    /// Returns `Error::InvalidCommandCode` if the line is empty or the
    /// leading character is outside the vocabulary.
    pub fn parse_wire(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut chars = line.chars();
        let code = chars
            .next()
            .ok_or_else(|| Error::InvalidCommandCode("<empty>".to_string()))?;

        if code == CMD_CONFIRM {
            return match line[code.len_utf8()..].strip_prefix(':') {
                Some(name) if !name.is_empty() => Ok(HostCommand::confirm_with_name(name)),
                _ => Ok(HostCommand::confirm()),
            };
        }

        if chars.next().is_some() {
            return Err(Error::InvalidCommandCode(line.to_string()));
        }
        HostCommand::from_code(code)
    }

    /// Encode to wire bytes, newline-terminated.
    ///
    /// Newlines inside a confirmation name would terminate the frame early,
    /// so they are replaced by spaces before framing.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            HostCommand::Confirm { name: Some(name) } => {
                let clean = name.replace(['\r', '\n'], " ");
                format!("{}:{}\n", CMD_CONFIRM, clean).into_bytes()
            }
            other => {
                let mut bytes = Vec::with_capacity(2);
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.code().encode_utf8(&mut buf).as_bytes());
                bytes.push(b'\n');
                bytes
            }
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HostCommand::Confirm { name: Some(name) } => write!(f, "K:{name}"),
            other => write!(f, "{}", other.code()),
        }
    }
}
