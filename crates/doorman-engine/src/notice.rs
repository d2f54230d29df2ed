//! Station notices.
//!
//! Everything interesting the engine does is published as a [`Notice`] on a
//! broadcast bus. Attached frontends (a web UI, a status command) subscribe;
//! a headless station publishes into the void, which is fine.

use doorman_core::{AccessEvent, Credential, Uid};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::state::SystemMode;

/// Default capacity of the notice channel. Slow subscribers that fall more
/// than this many notices behind start losing the oldest ones.
pub const DEFAULT_NOTICE_CAPACITY: usize = 64;

/// One event on the station notice bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notice {
    /// An access attempt was decided and durably logged.
    NewRecord { event: AccessEvent },

    /// The station changed mode; `remaining_secs` counts down open windows.
    EnrollmentModeChanged {
        mode: SystemMode,
        remaining_secs: u64,
    },

    /// A candidate credential was read during enrollment.
    UidCaptured { uid: Uid },

    /// Enrollment finished and the credential is saved.
    EnrollmentComplete { credential: Credential },

    /// Enrollment was refused or failed; the station stays operational.
    EnrollmentError { message: String },

    /// Enrollment was requested; an admin tap is needed within the window.
    AdminRequired { remaining_secs: u64 },

    AdminApproved,

    AdminRejected,

    /// A credential was removed from the registry.
    UserDeleted { uid: Uid },

    /// A batch mirror run began.
    BatchStarted { manual: bool },

    /// A batch mirror run finished.
    BatchCompleted {
        records: u64,
        errors: u64,
        success: bool,
    },

    /// Periodic session summary.
    SessionStatus {
        active: bool,
        port: Option<String>,
        label: Option<String>,
        events_today: u64,
    },
}

/// Broadcast channel for [`Notice`] values.
///
/// Cloning the bus is cheap; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct NoticeBus {
    sender: broadcast::Sender<Notice>,
}

impl NoticeBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_NOTICE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all notices published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Publish a notice, returning how many subscribers saw it.
    ///
    /// No subscribers is not an error; the notice is simply dropped.
    pub fn publish(&self, notice: Notice) -> usize {
        match self.sender.send(notice) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(notice)) => {
                trace!(?notice, "Notice dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new()
    }
}
