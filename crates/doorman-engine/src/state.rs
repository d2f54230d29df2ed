//! Station mode machine.
//!
//! This module provides the state machine for the station's operating mode,
//! from normal access checking through the admin-gated enrollment flow and
//! back.
//!
//! # Modes
//!
//! - `Access`: every tap is an access attempt, answered grant or deny
//! - `AwaitingAdmin`: enrollment was requested; waiting for the admin tag
//! - `Enrolling`: admin approved; waiting for the new tag and its name
//!
//! # Valid Transitions
//!
//! - Access → AwaitingAdmin (operator asks to enroll)
//! - AwaitingAdmin → Enrolling (admin tag confirmed)
//! - AwaitingAdmin → Access (wrong tag, timeout or cancel)
//! - Enrolling → Access (saved, timeout or cancel)
//!
//! # Wire Mapping
//!
//! Each mode has a prompt command the reader displays while the mode is
//! active:
//! - `Access` → `'A'`
//! - `AwaitingAdmin` → `'W'`
//! - `Enrolling` → `'E'`
//!
//! # Examples
//!
//! ```
//! use doorman_engine::state::{ModeMachine, SystemMode};
//!
//! let mut machine = ModeMachine::new();
//! assert_eq!(machine.mode(), SystemMode::Access);
//!
//! machine.transition_to(SystemMode::AwaitingAdmin).unwrap();
//! assert_eq!(machine.mode(), SystemMode::AwaitingAdmin);
//!
//! // Enrollment cannot be entered without the admin step
//! assert!(!SystemMode::Access.can_transition_to(SystemMode::Enrolling));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use doorman_core::{Error, Result, Uid};
use doorman_protocol::HostCommand;
use serde::{Deserialize, Serialize};

/// Maximum number of mode changes kept for inspection.
///
/// A full enrollment is three changes, so this covers the last thirty-odd
/// enrollments, which is plenty for debugging a station day.
const MAX_HISTORY_SIZE: usize = 100;

/// The station's operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMode {
    /// Normal operation; taps are access attempts.
    Access,

    /// Enrollment requested; waiting for the admin tag.
    AwaitingAdmin,

    /// Admin approved; waiting for the candidate tag and display name.
    Enrolling,
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            SystemMode::Access => "Access",
            SystemMode::AwaitingAdmin => "AwaitingAdmin",
            SystemMode::Enrolling => "Enrolling",
        };
        write!(f, "{}", mode)
    }
}

impl SystemMode {
    /// Check if a transition to `target` is valid from this mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use doorman_engine::state::SystemMode;
    ///
    /// assert!(SystemMode::Access.can_transition_to(SystemMode::AwaitingAdmin));
    /// assert!(!SystemMode::Access.can_transition_to(SystemMode::Enrolling));
    /// ```
    pub fn can_transition_to(&self, target: SystemMode) -> bool {
        matches!(
            (self, target),
            // From Access
            (SystemMode::Access, SystemMode::AwaitingAdmin)
            // From AwaitingAdmin
            | (SystemMode::AwaitingAdmin, SystemMode::Enrolling | SystemMode::Access)
            // From Enrolling
            | (SystemMode::Enrolling, SystemMode::Access)
        )
    }

    /// The command the reader should display while this mode is active.
    ///
    /// # Examples
    ///
    /// ```
    /// use doorman_engine::state::SystemMode;
    /// use doorman_protocol::HostCommand;
    ///
    /// assert_eq!(SystemMode::Enrolling.prompt(), HostCommand::EnterEnrollment);
    /// ```
    pub fn prompt(&self) -> HostCommand {
        match self {
            SystemMode::Access => HostCommand::AccessMode,
            SystemMode::AwaitingAdmin => HostCommand::AwaitAdmin,
            SystemMode::Enrolling => HostCommand::EnterEnrollment,
        }
    }
}

/// A single recorded mode change.
///
/// `at` is process-local time and is not serialized; deserialized records
/// get the time of deserialization instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeChange {
    pub from: SystemMode,
    pub to: SystemMode,

    #[serde(skip, default = "Instant::now")]
    pub at: Instant,
}

impl ModeChange {
    pub fn new(from: SystemMode, to: SystemMode) -> Self {
        Self {
            from,
            to,
            at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.at.elapsed()
    }
}

/// State machine for the station mode.
///
/// Tracks the current mode, the open countdown window (admin wait or
/// enrollment), the candidate UID captured during enrollment, and a bounded
/// history of mode changes.
///
/// # Thread Safety
///
/// Not thread-safe by itself. The engine wraps it in a mutex and keeps
/// every decision that reads or changes the mode inside one lock hold.
///
/// # Examples
///
/// ```
/// use doorman_engine::state::{ModeMachine, SystemMode};
///
/// let mut machine = ModeMachine::new();
/// machine.transition_to(SystemMode::AwaitingAdmin).unwrap();
/// machine.transition_to(SystemMode::Enrolling).unwrap();
/// machine.transition_to(SystemMode::Access).unwrap();
/// assert_eq!(machine.history().len(), 3);
/// ```
pub struct ModeMachine {
    mode: SystemMode,
    mode_entered_at: Instant,
    history: VecDeque<ModeChange>,
    window: Option<Duration>,
    captured_uid: Option<Uid>,
}

impl ModeMachine {
    /// Create a machine in `Access` mode.
    pub fn new() -> Self {
        Self {
            mode: SystemMode::Access,
            mode_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            window: None,
            captured_uid: None,
        }
    }

    pub fn mode(&self) -> SystemMode {
        self.mode
    }

    /// Time spent in the current mode.
    pub fn time_in_mode(&self) -> Duration {
        self.mode_entered_at.elapsed()
    }

    /// Start a countdown window for the current mode.
    pub fn open_window(&mut self, window: Duration) {
        self.window = Some(window);
    }

    pub fn clear_window(&mut self) {
        self.window = None;
    }

    /// Whether an open window has run out.
    pub fn has_expired(&self) -> bool {
        self.window
            .is_some_and(|window| self.time_in_mode() >= window)
    }

    /// Time left in the open window, `None` when no window is open or it
    /// already expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.window
            .and_then(|window| window.checked_sub(self.time_in_mode()))
    }

    /// Record the candidate UID read during enrollment.
    ///
    /// # Errors
    ///
    /// Returns a state violation outside `Enrolling` mode.
    pub fn capture(&mut self, uid: Uid) -> Result<()> {
        if self.mode != SystemMode::Enrolling {
            return Err(Error::state_violation(format!(
                "Cannot capture a UID in {} mode",
                self.mode
            )));
        }
        self.captured_uid = Some(uid);
        Ok(())
    }

    pub fn captured(&self) -> Option<&Uid> {
        self.captured_uid.as_ref()
    }

    /// Transition to `target`, validating the move.
    ///
    /// Every change closes the window and drops any captured UID; the new
    /// mode starts clean.
    ///
    /// # Errors
    ///
    /// `Error::InvalidStateTransition` when the move is not in the
    /// transition table.
    pub fn transition_to(&mut self, target: SystemMode) -> Result<ModeChange> {
        if !self.mode.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.mode.to_string(),
                to: target.to_string(),
            });
        }

        let change = ModeChange::new(self.mode, target);
        self.apply_change(target, change.clone());
        Ok(change)
    }

    /// Force the machine back to `Access`, bypassing the transition table.
    /// For error recovery only.
    pub fn reset(&mut self) -> ModeChange {
        let change = ModeChange::new(self.mode, SystemMode::Access);
        self.apply_change(SystemMode::Access, change.clone());
        change
    }

    /// Recent mode changes, oldest first.
    pub fn history(&self) -> &VecDeque<ModeChange> {
        &self.history
    }

    fn apply_change(&mut self, target: SystemMode, change: ModeChange) {
        self.mode = target;
        self.mode_entered_at = Instant::now();
        self.window = None;
        self.captured_uid = None;

        self.history.push_back(change);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new()
    }
}
