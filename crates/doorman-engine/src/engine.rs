//! Access decision engine.
//!
//! The engine sits between the serial link and the durable store. Every line
//! the device produces lands in [`AccessEngine::handle_line`] on the reader
//! thread; the engine decides within that call what the device hears back,
//! then hands the bookkeeping to a background worker.
//!
//! # Architecture
//!
//! ```text
//!  reader thread                      tokio worker
//!  ─────────────                      ────────────
//!  handle_line("UID: ..")
//!      │ mode dispatch
//!      ├─ Access:    send '1'/'0' ──► bounded queue ──► resolve name
//!      ├─ AwaitingAdmin: validate            │          append to log
//!      └─ Enrolling: capture                 │          today cache
//!                                            └────────► Notice::NewRecord
//! ```
//!
//! # Design Principles
//!
//! - **Reply first, record later**: the device response is written to the
//!   serial port before the event is durably appended. The station gates a
//!   physical door, so tag-to-verdict latency wins over strict
//!   record-before-reply ordering. A crash loses at most the events still
//!   sitting in the bounded queue.
//! - **One lock per concern**: the mode machine, the timer handle and the
//!   command sink each live behind their own lock, always taken in that
//!   order. Mode transitions, the matching device command and the timer
//!   swap happen under the machine lock so observers never see them
//!   interleaved.
//! - **Timers never outlive their phase**: each phase change aborts the
//!   previous countdown before spawning its own, and an expiring countdown
//!   re-checks the mode before acting, so a stale timer can never send the
//!   return-to-access command twice.

use crate::config::StationConfig;
use crate::error::{EngineError, EngineResult};
use crate::notice::{Notice, NoticeBus};
use crate::state::{ModeMachine, SystemMode};
use chrono::Local;
use doorman_core::constants::{FILE_DATE_FORMAT, TODAY_CACHE_CAPACITY};
use doorman_core::{AccessEvent, Credential, DayStats, Decision, Error as CoreError, Uid};
use doorman_protocol::{DeviceEvent, HostCommand, parse_line};
use doorman_serial::CommandSink;
use doorman_store::{AccessLogWriter, StoreError, UserRegistry};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Depth of the queue between the reader thread and the persistence worker.
const PERSIST_QUEUE_DEPTH: usize = 100;

/// Display name recorded for the administrator tag, which is never in the
/// registry.
const ADMIN_DISPLAY_NAME: &str = "Admin";

/// The decision core of one station.
///
/// Owns the [`ModeMachine`], the persistence worker and the notice bus
/// wiring. The serial link is attached after construction through
/// [`AccessEngine::attach`], because the link's line callback needs the
/// engine first.
///
/// # Example
///
/// ```no_run
/// use doorman_engine::{AccessEngine, NoticeBus, StationConfig};
/// use doorman_store::{AccessLogWriter, UserRegistry};
/// use std::sync::Arc;
///
/// # async fn example() -> doorman_engine::EngineResult<()> {
/// let config = StationConfig::default();
/// let writer = Arc::new(AccessLogWriter::open(config.log_config(), "demo")?);
/// let registry = Arc::new(UserRegistry::open(config.registry_config())?);
///
/// let engine = AccessEngine::new(&config, writer, registry, NoticeBus::new())?;
/// engine.handle_line("UID: 04-A3-1F-2C");
/// # Ok(())
/// # }
/// ```
pub struct AccessEngine {
    admin: Uid,
    station_id: u32,
    admin_wait: Duration,
    enroll_window: Duration,
    /// Mode, device command, notice and timer swap change together under
    /// this lock.
    machine: Mutex<ModeMachine>,
    timer: Mutex<Option<JoinHandle<()>>>,
    sink: RwLock<Option<Arc<dyn CommandSink>>>,
    writer: Arc<AccessLogWriter>,
    registry: Arc<UserRegistry>,
    bus: NoticeBus,
    today: Arc<Mutex<TodayWindow>>,
    persist_tx: mpsc::Sender<AccessEvent>,
    rt: Handle,
}

impl AccessEngine {
    /// Build the engine and spawn its persistence worker.
    ///
    /// Must be called from within a tokio runtime; the captured handle is
    /// what lets the serial reader thread start timers later.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when called outside a runtime or
    /// when the configured admin uid does not parse.
    pub fn new(
        config: &StationConfig,
        writer: Arc<AccessLogWriter>,
        registry: Arc<UserRegistry>,
        bus: NoticeBus,
    ) -> EngineResult<Arc<Self>> {
        let rt = Handle::try_current().map_err(|_| {
            EngineError::Config("access engine must be created inside a tokio runtime".into())
        })?;
        let admin = config.admin_uid()?;
        let today = Arc::new(Mutex::new(TodayWindow::new()));
        let (persist_tx, mut persist_rx) = mpsc::channel::<AccessEvent>(PERSIST_QUEUE_DEPTH);

        {
            let admin = admin.clone();
            let writer = Arc::clone(&writer);
            let registry = Arc::clone(&registry);
            let today = Arc::clone(&today);
            let bus = bus.clone();
            rt.spawn(async move {
                while let Some(event) = persist_rx.recv().await {
                    persist_event(&admin, &writer, &registry, &today, &bus, event);
                }
                debug!("Persistence worker stopped");
            });
        }

        Ok(Arc::new(Self {
            admin,
            station_id: config.station_id,
            admin_wait: config.admin_wait(),
            enroll_window: config.enroll_window(),
            machine: Mutex::new(ModeMachine::new()),
            timer: Mutex::new(None),
            sink: RwLock::new(None),
            writer,
            registry,
            bus,
            today,
            persist_tx,
            rt,
        }))
    }

    /// Attach the serial link commands are sent through.
    pub fn attach(&self, sink: Arc<dyn CommandSink>) {
        let mut slot = self.sink.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(sink);
        debug!("Device link attached");
    }

    /// Drop the current link. Subsequent commands are dropped with a
    /// warning until a new link is attached.
    pub fn detach(&self) {
        let mut slot = self.sink.write().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            debug!("Device link detached");
        }
    }

    /// Entry point for every line the device emits.
    ///
    /// Runs on the serial reader thread. Unrecognized chatter is dropped
    /// silently; that is the normal case for boot banners and diagnostics.
    pub fn handle_line(self: &Arc<Self>, raw: &str) {
        match parse_line(raw) {
            DeviceEvent::UidReported(uid) => self.on_uid(uid),
            DeviceEvent::Pong(firmware) => {
                debug!(%firmware, "Pong outside a probe, ignored");
            }
            DeviceEvent::Unrecognized => {
                trace!(line = raw, "Unrecognized device line dropped");
            }
        }
    }

    /// Dispatch one presented tag according to the current mode.
    ///
    /// In access mode this is the latency-critical path; in the admin and
    /// enrollment phases the tag is handed to the corresponding handler,
    /// whose rejections are already surfaced as notices.
    pub fn on_uid(self: &Arc<Self>, uid: Uid) {
        match self.mode() {
            SystemMode::AwaitingAdmin => {
                if let Err(e) = self.validate_admin_uid(&uid) {
                    debug!(error = %e, "Admin validation skipped");
                }
            }
            SystemMode::Enrolling => {
                if let Err(e) = self.capture_uid(uid) {
                    debug!(error = %e, "Enrollment capture rejected");
                }
            }
            SystemMode::Access => self.record_attempt(uid),
        }
    }

    /// Open the enrollment flow: prompt for the administrator tag.
    ///
    /// Sends the await-admin command, publishes [`Notice::AdminRequired`]
    /// and starts the admin-wait countdown.
    ///
    /// # Errors
    ///
    /// Returns the invalid-transition error when a flow is already open.
    pub fn start_enrollment(self: &Arc<Self>) -> EngineResult<()> {
        let mut machine = self.lock_machine();
        machine.transition_to(SystemMode::AwaitingAdmin)?;
        machine.open_window(self.admin_wait);
        self.send(HostCommand::AwaitAdmin);
        self.bus.publish(Notice::AdminRequired {
            remaining_secs: self.admin_wait.as_secs(),
        });
        self.restart_countdown(SystemMode::AwaitingAdmin, self.admin_wait);
        info!(
            wait_secs = self.admin_wait.as_secs(),
            "Enrollment requested, awaiting administrator tag"
        );
        Ok(())
    }

    /// Check a presented tag against the configured administrator uid.
    ///
    /// A match opens the enrollment window (`Ok(true)`); anything else
    /// sends the rejected command and reverts to access mode (`Ok(false)`).
    ///
    /// # Errors
    ///
    /// Returns a state violation when no admin validation is pending.
    pub fn validate_admin_uid(self: &Arc<Self>, uid: &Uid) -> EngineResult<bool> {
        let mut machine = self.lock_machine();
        if machine.mode() != SystemMode::AwaitingAdmin {
            return Err(CoreError::state_violation(format!(
                "admin validation outside AwaitingAdmin (currently {})",
                machine.mode()
            ))
            .into());
        }
        if *uid == self.admin {
            machine.transition_to(SystemMode::Enrolling)?;
            machine.open_window(self.enroll_window);
            self.send(HostCommand::EnterEnrollment);
            self.bus.publish(Notice::AdminApproved);
            self.restart_countdown(SystemMode::Enrolling, self.enroll_window);
            info!(
                window_secs = self.enroll_window.as_secs(),
                "Administrator approved, enrollment window open"
            );
            Ok(true)
        } else {
            self.send(HostCommand::AdminRejected);
            self.bus.publish(Notice::AdminRejected);
            self.abort_timer();
            self.finish_to_access(&mut machine);
            warn!(uid = uid.as_str(), "Admin validation rejected");
            Ok(false)
        }
    }

    /// Record a tag for enrollment without persisting anything yet.
    ///
    /// The tag stays captured until [`AccessEngine::confirm_enrollment`]
    /// names it, the window expires, or the flow is cancelled. Guard
    /// rejections (already registered, admin tag) leave the mode unchanged
    /// and are also published as [`Notice::EnrollmentError`].
    ///
    /// # Errors
    ///
    /// Returns a state violation outside the enrollment window, or the
    /// guard error for unenrollable tags.
    pub fn capture_uid(&self, uid: Uid) -> EngineResult<()> {
        let mut machine = self.lock_machine();
        if machine.mode() != SystemMode::Enrolling {
            return Err(CoreError::state_violation(format!(
                "capture outside enrollment (currently {})",
                machine.mode()
            ))
            .into());
        }
        if let Err(e) = self.enrollment_guards(&uid) {
            self.bus.publish(Notice::EnrollmentError {
                message: e.to_string(),
            });
            return Err(e.into());
        }
        machine.capture(uid.clone())?;
        self.bus.publish(Notice::UidCaptured { uid: uid.clone() });
        info!(uid = uid.as_str(), "Tag captured, awaiting display name");
        Ok(())
    }

    /// Persist the captured tag under a display name and close the flow.
    ///
    /// `uid` must match the captured tag; the guards from
    /// [`AccessEngine::capture_uid`] are re-applied so a tag that could not
    /// be captured can never be confirmed through this door either. On
    /// success the credential is saved, the device gets the confirmation
    /// (with the cleaned name when one was given) and the station returns
    /// to access mode.
    ///
    /// # Errors
    ///
    /// State violations for a missing or mismatched capture; store errors
    /// when the registry write fails, in which case the enrollment window
    /// stays open so the operator can retry.
    pub fn confirm_enrollment(&self, uid: &Uid, name: &str) -> EngineResult<Credential> {
        let mut machine = self.lock_machine();
        if machine.mode() != SystemMode::Enrolling {
            return Err(CoreError::state_violation("confirmation outside enrollment").into());
        }
        match machine.captured() {
            Some(captured) if captured == uid => {}
            Some(_) => {
                return Err(CoreError::state_violation(
                    "confirmation uid does not match the captured tag",
                )
                .into());
            }
            None => return Err(CoreError::state_violation("no tag captured yet").into()),
        }
        if let Err(e) = self.enrollment_guards(uid) {
            self.bus.publish(Notice::EnrollmentError {
                message: e.to_string(),
            });
            return Err(e.into());
        }

        let display_name = clean_display_name(name);
        let credential = Credential::new(uid.clone(), display_name.clone());
        self.registry.save(credential.clone())?;

        if display_name.is_empty() {
            self.send(HostCommand::confirm());
        } else {
            self.send(HostCommand::confirm_with_name(display_name.as_str()));
        }
        self.bus.publish(Notice::EnrollmentComplete {
            credential: credential.clone(),
        });
        self.abort_timer();
        self.finish_to_access(&mut machine);
        info!(uid = uid.as_str(), name = %display_name, "Enrollment complete");
        Ok(credential)
    }

    /// Abort any open admin or enrollment phase.
    ///
    /// A no-op in access mode, so callers may fire it unconditionally on
    /// shutdown.
    pub fn cancel_enrollment(&self) -> EngineResult<()> {
        let mut machine = self.lock_machine();
        if machine.mode() == SystemMode::Access {
            return Ok(());
        }
        let from = machine.mode();
        self.abort_timer();
        self.finish_to_access(&mut machine);
        info!(%from, "Enrollment cancelled");
        Ok(())
    }

    /// Remove a credential from the registry.
    ///
    /// Returns whether anything was removed; a removal publishes
    /// [`Notice::UserDeleted`].
    ///
    /// # Errors
    ///
    /// Store errors when the registry rewrite fails.
    pub fn delete_user(&self, uid: &Uid) -> EngineResult<bool> {
        let removed = self.registry.delete(uid)?;
        if removed {
            self.bus.publish(Notice::UserDeleted { uid: uid.clone() });
            info!(uid = uid.as_str(), "Credential deleted");
        }
        Ok(removed)
    }

    /// Current system mode.
    pub fn mode(&self) -> SystemMode {
        self.lock_machine().mode()
    }

    /// Seconds left in the current admin or enrollment window, if one is
    /// open.
    pub fn remaining(&self) -> Option<Duration> {
        self.lock_machine().remaining()
    }

    /// Today's events, oldest first, bounded by the cache capacity.
    pub fn today_events(&self) -> Vec<AccessEvent> {
        let mut window = self.today.lock().unwrap_or_else(PoisonError::into_inner);
        window.roll();
        window.events.iter().cloned().collect()
    }

    /// Counters over today's events. Unlike the bounded event list, the
    /// counters cover the whole day.
    pub fn day_stats(&self) -> DayStats {
        let mut window = self.today.lock().unwrap_or_else(PoisonError::into_inner);
        window.roll();
        window.stats
    }

    /// The bus this engine publishes on.
    pub fn notices(&self) -> &NoticeBus {
        &self.bus
    }

    /// Access-mode fast path: verdict to the device, bookkeeping to the
    /// worker.
    fn record_attempt(&self, uid: Uid) {
        let is_admin = uid == self.admin;
        let is_known = is_admin || self.registry.exists(&uid);
        let decision = if is_known {
            Decision::Granted
        } else {
            Decision::Denied
        };
        self.send(if is_known {
            HostCommand::Granted
        } else {
            HostCommand::Denied
        });
        info!(
            uid = uid.as_str(),
            decision = decision.as_str(),
            admin = is_admin,
            "Access attempt"
        );
        self.enqueue(AccessEvent::new(uid, decision, self.station_id));
    }

    /// Hand an event to the persistence worker.
    ///
    /// A full queue falls back to appending inline on the reader thread:
    /// one slow scan beats a lost record.
    fn enqueue(&self, event: AccessEvent) {
        match self.persist_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Persistence queue full, appending inline");
                persist_event(
                    &self.admin,
                    &self.writer,
                    &self.registry,
                    &self.today,
                    &self.bus,
                    event,
                );
            }
            Err(TrySendError::Closed(event)) => {
                error!("Persistence worker gone, appending inline");
                persist_event(
                    &self.admin,
                    &self.writer,
                    &self.registry,
                    &self.today,
                    &self.bus,
                    event,
                );
            }
        }
    }

    /// The two reasons a tag can never be enrolled, shared by capture and
    /// confirm.
    fn enrollment_guards(&self, uid: &Uid) -> Result<(), CoreError> {
        if *uid == self.admin {
            return Err(CoreError::IsAdminCredential);
        }
        if self.registry.exists(uid) {
            return Err(CoreError::AlreadyRegistered(uid.as_str().to_string()));
        }
        Ok(())
    }

    /// Shared tail of every path back to access mode: transition, tell the
    /// device, tell the observers. Callers hold the machine lock, which is
    /// what makes the access-mode command exactly-once per return.
    fn finish_to_access(&self, machine: &mut ModeMachine) {
        if let Err(e) = machine.transition_to(SystemMode::Access) {
            warn!(error = %e, "Mode cleanup failed");
            return;
        }
        self.send(HostCommand::AccessMode);
        self.bus.publish(Notice::EnrollmentModeChanged {
            mode: SystemMode::Access,
            remaining_secs: 0,
        });
    }

    /// Replace the phase countdown, aborting whichever one was running.
    fn restart_countdown(self: &Arc<Self>, phase: SystemMode, window: Duration) {
        let engine = Arc::clone(self);
        let handle = self.rt.spawn(engine.run_countdown(phase, window));
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn abort_timer(&self) {
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// 1 Hz countdown for one phase; expires it when the ticks run out.
    ///
    /// The tick count is the deadline here. The machine's own window backs
    /// the synchronous [`AccessEngine::remaining`] queries, but expiry is
    /// driven by this task so tests can steer it through the tokio clock.
    async fn run_countdown(self: Arc<Self>, phase: SystemMode, window: Duration) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut remaining = window.as_secs();
        while remaining > 0 {
            {
                let machine = self.lock_machine();
                if machine.mode() != phase {
                    return;
                }
            }
            self.bus.publish(Notice::EnrollmentModeChanged {
                mode: phase,
                remaining_secs: remaining,
            });
            ticker.tick().await;
            remaining -= 1;
        }

        let mut machine = self.lock_machine();
        if machine.mode() != phase {
            return;
        }
        info!(%phase, "Window expired, reverting to access mode");
        self.finish_to_access(&mut machine);
    }

    fn send(&self, command: HostCommand) {
        let sink = self.sink.read().unwrap_or_else(PoisonError::into_inner);
        match sink.as_ref() {
            Some(sink) => {
                if let Err(e) = sink.send(command.clone()) {
                    warn!(error = %e, ?command, "Device command failed");
                }
            }
            None => warn!(?command, "No device attached, command dropped"),
        }
    }

    fn lock_machine(&self) -> MutexGuard<'_, ModeMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded cache of today's events plus the full-day counters.
struct TodayWindow {
    date: String,
    events: VecDeque<AccessEvent>,
    stats: DayStats,
}

impl TodayWindow {
    fn new() -> Self {
        Self {
            date: today_stamp(),
            events: VecDeque::new(),
            stats: DayStats::default(),
        }
    }

    /// Reset everything when the calendar day changed since the last call.
    fn roll(&mut self) {
        let today = today_stamp();
        if self.date != today {
            self.date = today;
            self.events.clear();
            self.stats = DayStats::default();
        }
    }

    fn record(&mut self, event: AccessEvent) {
        self.roll();
        if self.events.len() == TODAY_CACHE_CAPACITY {
            self.events.pop_front();
        }
        self.stats.record(event.decision);
        self.events.push_back(event);
    }
}

fn today_stamp() -> String {
    Local::now().format(FILE_DATE_FORMAT).to_string()
}

/// Strip line breaks and outer whitespace from an operator-supplied name
/// so it is safe on the wire and in CSV rows.
fn clean_display_name(raw: &str) -> String {
    raw.replace(['\r', '\n'], " ").trim().to_string()
}

/// Slow half of an access attempt: name resolution, durable append, today
/// cache, new-record notice.
///
/// Append failures are logged and surfaced as a notice but never stop the
/// cache update or the fan-out; the attempt already happened at the door.
/// A closed writer (no session) is quieter still: the event is simply not
/// persisted.
fn persist_event(
    admin: &Uid,
    writer: &AccessLogWriter,
    registry: &UserRegistry,
    today: &Mutex<TodayWindow>,
    bus: &NoticeBus,
    event: AccessEvent,
) {
    let event = if event.uid == *admin {
        event.with_resolved_name(ADMIN_DISPLAY_NAME)
    } else if let Some(credential) = registry.find(&event.uid) {
        event.with_resolved_name(credential.display_name)
    } else {
        event
    };

    match writer.append(&event) {
        Ok(()) => trace!(uid = event.uid.as_str(), "Access event appended"),
        Err(StoreError::Domain(CoreError::NoActiveSession)) => {
            debug!(
                uid = event.uid.as_str(),
                "No active session, event not persisted"
            );
        }
        Err(e) => {
            error!(error = %e, uid = event.uid.as_str(), "Access log append failed");
            bus.publish(Notice::EnrollmentError {
                message: format!("access log write failed: {e}"),
            });
        }
    }

    {
        let mut window = today.lock().unwrap_or_else(PoisonError::into_inner);
        window.record(event.clone());
    }
    bus.publish(Notice::NewRecord { event });
}
