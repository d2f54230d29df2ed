//! Capture session lifecycle.
//!
//! A session binds one serial port to one log file under an operator-chosen
//! label. [`StationSession`] owns that binding: it resolves the port (from
//! an explicit name, the config, or a probe of every port), opens the link
//! with the engine as line callback, keeps the log writer on the right
//! file, and publishes a [`Notice::SessionStatus`] after every change.
//!
//! Starting over an active session supersedes it; stopping twice is a
//! no-op. The device goes quiet for roughly two seconds after the port
//! opens (the serial adapter's DTR pulse resets the board), so the wake-up
//! access-mode command is sent by a delayed task instead of immediately.

use crate::config::StationConfig;
use crate::engine::AccessEngine;
use crate::error::{EngineError, EngineResult};
use crate::notice::{Notice, NoticeBus};
use doorman_core::constants::ACTIVATION_DELAY_MS;
use doorman_core::{AccessEvent, DayStats, Error as CoreError, LogTimestamp, Uid};
use doorman_protocol::HostCommand;
use doorman_serial::{CommandSink, SerialLink, find_station};
use doorman_store::AccessLogWriter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot of the session state, fit for serialization to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub active: bool,
    pub id: Option<Uuid>,
    pub port: Option<String>,
    pub label: Option<String>,
    pub started_at: Option<LogTimestamp>,
    /// Rows appended since this session's file was opened.
    pub events: u64,
    pub log_path: Option<PathBuf>,
}

impl SessionStatus {
    fn inactive() -> Self {
        Self {
            active: false,
            id: None,
            port: None,
            label: None,
            started_at: None,
            events: 0,
            log_path: None,
        }
    }
}

/// The live half of a session: the open link plus its identity.
struct ActiveSession {
    id: Uuid,
    port_name: String,
    label: String,
    started_at: LogTimestamp,
    link: Arc<SerialLink>,
    activation: JoinHandle<()>,
}

/// Owns the port-to-log binding of one station.
///
/// # Example
///
/// ```no_run
/// use doorman_engine::{AccessEngine, NoticeBus, StationConfig, StationSession};
/// use doorman_store::{AccessLogWriter, UserRegistry};
/// use std::sync::Arc;
///
/// # async fn example() -> doorman_engine::EngineResult<()> {
/// let config = StationConfig::default();
/// let writer = Arc::new(AccessLogWriter::open(config.log_config(), "morning")?);
/// let registry = Arc::new(UserRegistry::open(config.registry_config())?);
/// let bus = NoticeBus::new();
/// let engine = AccessEngine::new(&config, Arc::clone(&writer), registry, bus.clone())?;
///
/// let session = StationSession::new(&config, engine, writer, bus)?;
/// session.start(None, Some("morning".to_string()))?;
/// session.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct StationSession {
    config: StationConfig,
    engine: Arc<AccessEngine>,
    writer: Arc<AccessLogWriter>,
    bus: NoticeBus,
    slot: Mutex<Option<ActiveSession>>,
    rt: Handle,
}

impl StationSession {
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when called outside a tokio runtime.
    pub fn new(
        config: &StationConfig,
        engine: Arc<AccessEngine>,
        writer: Arc<AccessLogWriter>,
        bus: NoticeBus,
    ) -> EngineResult<Self> {
        let rt = Handle::try_current().map_err(|_| {
            EngineError::Config("station session must be created inside a tokio runtime".into())
        })?;
        Ok(Self {
            config: config.clone(),
            engine,
            writer,
            bus,
            slot: Mutex::new(None),
            rt,
        })
    }

    /// Start a session, superseding any active one.
    ///
    /// `port` falls back to the configured port, and failing that to a
    /// probe of every serial port. `label` falls back to the configured
    /// session label; the log writer is moved onto the labelled file
    /// unless it is already there.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoDeviceFound`] when probing finds no reader, link
    /// errors when the port cannot be opened, store errors when the log
    /// file cannot be staged.
    pub fn start(&self, port: Option<String>, label: Option<String>) -> EngineResult<SessionStatus> {
        let mut slot = self.lock_slot();
        if let Some(previous) = slot.take() {
            info!(label = %previous.label, "Superseding active session");
            self.teardown(previous);
        }

        let label = clean_label(label.as_deref().unwrap_or(&self.config.session_label))?;
        let port_name = match port.or_else(|| self.config.port.clone()) {
            Some(name) => name,
            None => find_station(
                self.config.baud_rate,
                self.config.probe_timeout(),
                self.config.expected_firmware.as_deref(),
            )?
            .ok_or(EngineError::NoDeviceFound)?,
        };

        match self.writer.label() {
            Some(current) if current == label => {}
            _ => {
                self.writer.reopen(&label)?;
            }
        }

        let engine = Arc::clone(&self.engine);
        let link = Arc::new(SerialLink::open(
            self.config.link_config(port_name.clone()),
            move |line| engine.handle_line(line),
        )?);
        self.engine.attach(Arc::clone(&link) as Arc<dyn CommandSink>);
        let activation = self.schedule_activation(&link);

        let active = ActiveSession {
            id: Uuid::new_v4(),
            port_name,
            label,
            started_at: LogTimestamp::now(),
            link,
            activation,
        };
        info!(
            id = %active.id,
            port = %active.port_name,
            label = %active.label,
            "Session started"
        );
        *slot = Some(active);
        drop(slot);

        let status = self.status();
        self.publish_status(&status);
        Ok(status)
    }

    /// Stop the session: close the link and the log file.
    ///
    /// Idempotent; stopping with nothing active just logs.
    pub fn stop(&self) -> EngineResult<()> {
        let mut slot = self.lock_slot();
        let Some(active) = slot.take() else {
            debug!("No active session to stop");
            return Ok(());
        };
        let label = active.label.clone();
        let events = self.writer.session_events();
        self.teardown(active);
        self.writer.close();
        drop(slot);

        info!(label = %label, events = events, "Session stopped");
        let status = self.status();
        self.publish_status(&status);
        Ok(())
    }

    /// Close and reopen the link on the same port, keeping the log file.
    ///
    /// A failed reopen leaves the session without a link; retry or call
    /// [`StationSession::stop`].
    ///
    /// # Errors
    ///
    /// `NoActiveSession` when nothing is running, link errors when the
    /// port cannot be reopened.
    pub fn reconnect(&self) -> EngineResult<SessionStatus> {
        let mut slot = self.lock_slot();
        let Some(active) = slot.as_mut() else {
            return Err(CoreError::NoActiveSession.into());
        };
        info!(port = %active.port_name, "Reconnecting device link");
        active.activation.abort();
        active.link.close();
        self.engine.detach();

        let engine = Arc::clone(&self.engine);
        let link = Arc::new(SerialLink::open(
            self.config.link_config(active.port_name.clone()),
            move |line| engine.handle_line(line),
        )?);
        self.engine.attach(Arc::clone(&link) as Arc<dyn CommandSink>);
        active.activation = self.schedule_activation(&link);
        active.link = link;
        drop(slot);

        let status = self.status();
        self.publish_status(&status);
        Ok(status)
    }

    /// Rename the active session's log pair and label.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` when nothing is running, store errors when the
    /// files cannot be moved.
    pub fn rename(&self, new_label: &str) -> EngineResult<SessionStatus> {
        let mut slot = self.lock_slot();
        let Some(active) = slot.as_mut() else {
            return Err(CoreError::NoActiveSession.into());
        };
        let label = clean_label(new_label)?;
        let path = self.writer.rename_session(&label)?;
        active.label = label;
        info!(path = %path.display(), "Session renamed");
        drop(slot);

        let status = self.status();
        self.publish_status(&status);
        Ok(status)
    }

    /// Current snapshot.
    pub fn status(&self) -> SessionStatus {
        let slot = self.lock_slot();
        match slot.as_ref() {
            Some(active) => SessionStatus {
                active: true,
                id: Some(active.id),
                port: Some(active.port_name.clone()),
                label: Some(active.label.clone()),
                started_at: Some(active.started_at),
                events: self.writer.session_events(),
                log_path: self.writer.active_path(),
            },
            None => SessionStatus::inactive(),
        }
    }

    /// Today's events from the engine cache.
    pub fn today_events(&self) -> Vec<AccessEvent> {
        self.engine.today_events()
    }

    /// Today's counters from the engine cache.
    pub fn day_stats(&self) -> DayStats {
        self.engine.day_stats()
    }

    /// Remove a credential; see [`AccessEngine::delete_user`].
    ///
    /// # Errors
    ///
    /// Store errors when the registry rewrite fails.
    pub fn delete_user(&self, uid: &Uid) -> EngineResult<bool> {
        self.engine.delete_user(uid)
    }

    /// Shared teardown: stop timers, drop the link, detach the engine.
    fn teardown(&self, active: ActiveSession) {
        if let Err(e) = self.engine.cancel_enrollment() {
            warn!(error = %e, "Could not cancel enrollment during teardown");
        }
        active.activation.abort();
        active.link.close();
        self.engine.detach();
    }

    /// The wake-up command, delayed past the firmware's DTR reset.
    fn schedule_activation(&self, link: &Arc<SerialLink>) -> JoinHandle<()> {
        let link = Arc::clone(link);
        self.rt.spawn(async move {
            tokio::time::sleep(Duration::from_millis(ACTIVATION_DELAY_MS)).await;
            if let Err(e) = link.send(HostCommand::AccessMode) {
                warn!(error = %e, "Activation command failed");
            } else {
                debug!("Activation command sent");
            }
        })
    }

    fn publish_status(&self, status: &SessionStatus) {
        self.bus.publish(Notice::SessionStatus {
            active: status.active,
            port: status.port.clone(),
            label: status.label.clone(),
            events_today: self.engine.day_stats().total,
        });
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Labels end up in file names, so anything outside `[A-Za-z0-9_-]`
/// becomes an underscore.
fn clean_label(raw: &str) -> EngineResult<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        return Err(EngineError::Config("session label must not be empty".into()));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("morning", "morning")]
    #[case("  shift a  ", "shift_a")]
    #[case("lab/3", "lab_3")]
    #[case("café", "café")]
    fn test_clean_label(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(clean_label(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn test_clean_label_rejects_empty(#[case] raw: &str) {
        assert!(clean_label(raw).is_err());
    }

    #[test]
    fn test_inactive_status_shape() {
        let status = SessionStatus::inactive();
        assert!(!status.active);
        assert_eq!(status.events, 0);
        assert!(status.port.is_none());
        assert!(status.log_path.is_none());
    }
}
