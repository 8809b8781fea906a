//! The single-threaded event loop: a FIFO action queue, a session table, and
//! the dispatch policies that route each event to the right state
//! machine(s) (spec §4.4, §5).

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::core::event_adapter::EventAdapter;
use crate::core::events::UserActivityType;
use crate::core::session::{Session, SessionId, SessionType};
use crate::core::sources::SessionTracker;
use crate::core::state_machine::{DefaultStateMachine, StateMachineConfig, StateMachineSinks};
use crate::core::timer::AlarmId;

/// A unit of work enqueued onto the daemon's loop. Each variant corresponds
/// to one of spec §4.4's dispatch policies; see [`Daemon::run_action`].
pub enum Action {
    /// Pre-enqueued once at daemon startup when `turn_on_display_at_startup`
    /// is set (spec §4.4 "Startup"). Distinct from `PowerButtonPress`: it
    /// drives `DefaultStateMachine::start()`, not a synthetic button press,
    /// so it doesn't arm a long-press alarm or mistag the reason.
    Start,
    PowerButtonPress,
    PowerButtonRelease,
    UserActivity(UserActivityType),
    ActiveCall,
    NoActiveCall,
    ProximityNear,
    ProximityFar,
    LidClosed,
    LidOpen,
    PowerSourceChange,
    PowerSourceCritical,
    SystemResume,
    Alarm(AlarmId),

    Notification { id: String, pid: i32 },
    NotificationDone { id: String, pid: i32 },
    DisableInactivityTimeout { id: String, pid: i32 },
    EnableInactivityTimeout { id: String, pid: i32 },
    SetInactivityTimeout { timeout: Duration, pid: i32 },
    EnableAutobrightness { pid: i32 },
    DisableAutobrightness { pid: i32 },
    SetNormalBrightnessValue { value: f32, pid: i32 },
    DisallowSuspend { id: String, pid: i32 },
    AllowSuspend { id: String, pid: i32 },

    SessionAdded { id: SessionId, session_type: SessionType, pid: i32 },
    SessionRemoved { id: SessionId },
    ActiveSessionChanged { id: SessionId },

    Flush(mpsc::Sender<()>),
    Stop,
}

struct SessionEntry {
    session: Session,
    state_machine: Option<Arc<DefaultStateMachine>>,
    event_adapter: Option<EventAdapter>,
}

struct SharedQueue {
    actions: Mutex<VecDeque<Action>>,
    condvar: Condvar,
}

impl SharedQueue {
    fn new() -> Self {
        SharedQueue { actions: Mutex::new(VecDeque::new()), condvar: Condvar::new() }
    }

    fn push_back(&self, action: Action) {
        self.actions.lock().push_back(action);
        self.condvar.notify_one();
    }

    fn push_front(&self, action: Action) {
        self.actions.lock().push_front(action);
        self.condvar.notify_one();
    }

    fn pop(&self) -> Action {
        let mut guard = self.actions.lock();
        loop {
            if let Some(action) = guard.pop_front() {
                return action;
            }
            self.condvar.wait(&mut guard);
        }
    }
}

/// The daemon's public handle: a queue producer plus a join handle for the
/// loop thread. Cloning shares the same queue, so external adapters can
/// each hold a cheap handle to `enqueue` from their own thread.
#[derive(Clone)]
pub struct DaemonHandle {
    queue: Arc<SharedQueue>,
}

impl DaemonHandle {
    pub fn enqueue(&self, action: Action) {
        self.queue.push_back(action);
    }

    fn enqueue_priority(&self, action: Action) {
        self.queue.push_front(action);
    }

    /// Blocks until every action enqueued before this call has run.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        self.enqueue(Action::Flush(tx));
        let _ = rx.recv();
    }

    pub fn stop(&self) {
        self.enqueue_priority(Action::Stop);
    }
}

/// Owns the session table and runs the single-threaded loop described in
/// spec §4.4. Construct with [`Daemon::new`], obtain a [`DaemonHandle`] via
/// [`Daemon::handle`] to wire up external event sources, then call
/// [`Daemon::run`] (typically on a dedicated thread, or via
/// [`Daemon::spawn`]).
pub struct Daemon {
    queue: Arc<SharedQueue>,
    sessions: HashMap<SessionId, SessionEntry>,
    active: Option<SessionId>,
    config: StateMachineConfig,
    sink_factory: Box<dyn Fn(&SessionId) -> StateMachineSinks + Send>,
    session_tracker: Arc<dyn SessionTracker>,
}

impl Daemon {
    pub fn new(
        config: StateMachineConfig,
        session_tracker: Arc<dyn SessionTracker>,
        sink_factory: impl Fn(&SessionId) -> StateMachineSinks + Send + 'static,
    ) -> Self {
        Daemon {
            queue: Arc::new(SharedQueue::new()),
            sessions: HashMap::new(),
            active: None,
            config,
            sink_factory: Box::new(sink_factory),
            session_tracker,
        }
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle { queue: self.queue.clone() }
    }

    /// A snapshot of the session table: every tracked session and whether
    /// it currently holds the active slot. Read-only — there is no way to
    /// reach a session's state machine through this accessor, only the
    /// bookkeeping a diagnostics command or test would want (SPEC_FULL §C.2).
    pub fn session_table(&self) -> Vec<(Session, bool)> {
        self.sessions
            .values()
            .map(|entry| (entry.session.clone(), self.active.as_ref() == Some(&entry.session.id)))
            .collect()
    }

    /// Runs the loop on the calling thread until `stop()` is observed.
    /// Mirrors the original's `Daemon::run`: register handlers (done by the
    /// caller before invoking this), start session-tracker processing, then
    /// loop.
    pub fn run(mut self) {
        self.session_tracker.start_processing();
        if self.config.turn_on_display_at_startup {
            // Pre-enqueued before the loop proper starts, per spec §4.4
            // "Startup".
            self.queue.push_back(Action::Start);
        }

        loop {
            let action = self.queue.pop();
            if matches!(action, Action::Stop) {
                info!("daemon loop stopping");
                break;
            }
            self.run_action(action);
        }
    }

    /// Convenience for running the loop on a dedicated OS thread.
    pub fn spawn(self) -> (DaemonHandle, JoinHandle<()>) {
        let handle = self.handle();
        let join = std::thread::Builder::new()
            .name("displaypowerd-loop".into())
            .spawn(move || self.run())
            .expect("failed to spawn daemon loop thread");
        (handle, join)
    }

    fn run_action(&mut self, action: Action) {
        match action {
            Action::Stop => unreachable!("handled in run()"),
            Action::Flush(tx) => {
                let _ = tx.send(());
            }

            // Active-session-only dispatch (spec §4.4).
            Action::Start => self.with_active(|sm| sm.start()),
            Action::PowerButtonPress => self.with_active(|sm| sm.handle_power_button_press()),
            Action::PowerButtonRelease => self.with_active(|sm| sm.handle_power_button_release()),
            Action::UserActivity(kind) => self.with_active(|sm| sm.handle_user_activity(kind)),
            Action::ActiveCall => self.with_active(|sm| sm.handle_active_call()),
            Action::NoActiveCall => self.with_active(|sm| sm.handle_no_active_call()),
            Action::ProximityNear => self.with_active(|sm| sm.handle_proximity_near()),
            Action::ProximityFar => self.with_active(|sm| sm.handle_proximity_far()),
            Action::LidClosed => self.with_active(|sm| sm.handle_lid_closed()),
            Action::LidOpen => self.with_active(|sm| sm.handle_lid_open()),
            Action::PowerSourceChange => self.with_active(|sm| sm.handle_power_source_change()),
            Action::PowerSourceCritical => self.with_active(|sm| sm.handle_power_source_critical()),

            // System-global: every compatible machine.
            Action::SystemResume => {
                for entry in self.sessions.values() {
                    if let Some(sm) = &entry.state_machine {
                        sm.handle_system_resume();
                    }
                }
            }

            // Alarm events: broadcast, each machine filters by its own ids.
            Action::Alarm(id) => {
                for entry in self.sessions.values() {
                    if let Some(sm) = &entry.state_machine {
                        sm.handle_alarm(id);
                    }
                }
            }

            // Named-session dispatch via the event adapter.
            Action::Notification { id, pid } => self.with_session_for_pid(pid, |adapter| adapter.handle_notification(id)),
            Action::NotificationDone { id, pid } => {
                self.with_session_for_pid(pid, |adapter| adapter.handle_notification_done(&id))
            }
            Action::DisableInactivityTimeout { id, pid } => {
                self.with_session_for_pid(pid, |adapter| adapter.handle_disable_inactivity_timeout(id))
            }
            Action::EnableInactivityTimeout { id, pid } => {
                self.with_session_for_pid(pid, |adapter| adapter.handle_enable_inactivity_timeout(&id))
            }
            Action::DisallowSuspend { id, pid } => {
                self.with_session_for_pid(pid, |adapter| adapter.handle_disallow_suspend(id))
            }
            Action::AllowSuspend { id, pid } => {
                self.with_session_for_pid(pid, |adapter| adapter.handle_allow_suspend(&id))
            }
            Action::SetInactivityTimeout { timeout, pid } => {
                self.with_state_machine_for_pid(pid, |sm| sm.handle_set_inactivity_timeout(timeout))
            }
            Action::EnableAutobrightness { pid } => {
                self.with_state_machine_for_pid(pid, |sm| sm.handle_enable_autobrightness())
            }
            Action::DisableAutobrightness { pid } => {
                self.with_state_machine_for_pid(pid, |sm| sm.handle_disable_autobrightness())
            }
            Action::SetNormalBrightnessValue { value, pid } => {
                self.with_state_machine_for_pid(pid, |sm| sm.handle_set_normal_brightness_value(value))
            }

            // Session lifecycle (spec §4.4 "Session lifecycle").
            Action::SessionAdded { id, session_type, pid } => self.on_session_added(id, session_type, pid),
            Action::SessionRemoved { id } => self.on_session_removed(id),
            Action::ActiveSessionChanged { id } => self.on_active_session_changed(id),
        }
    }

    fn with_active(&self, f: impl FnOnce(&DefaultStateMachine)) {
        let Some(active) = &self.active else {
            debug!("dropping active-session event: no active session");
            return;
        };
        if let Some(entry) = self.sessions.get(active)
            && let Some(sm) = &entry.state_machine
        {
            f(sm);
        }
    }

    fn with_session_for_pid(&mut self, pid: i32, f: impl FnOnce(&mut EventAdapter)) {
        let id = self.session_tracker.session_for_pid(pid);
        if !id.is_valid() {
            debug!(pid, "dropping client event: unknown pid");
            return;
        }
        if let Some(entry) = self.sessions.get_mut(&id)
            && let Some(adapter) = &mut entry.event_adapter
        {
            f(adapter);
        } else {
            debug!(pid, %id, "dropping client event: session untracked or incompatible");
        }
    }

    fn with_state_machine_for_pid(&mut self, pid: i32, f: impl FnOnce(&DefaultStateMachine)) {
        let id = self.session_tracker.session_for_pid(pid);
        if !id.is_valid() {
            debug!(pid, "dropping client event: unknown pid");
            return;
        }
        if let Some(entry) = self.sessions.get(&id)
            && let Some(sm) = &entry.state_machine
        {
            f(sm);
        }
    }

    fn on_session_added(&mut self, id: SessionId, session_type: SessionType, pid: i32) {
        let session = Session::new(id.clone(), session_type, pid);
        let (state_machine, event_adapter) = if session.is_compatible() {
            let sinks = (self.sink_factory)(&id);
            let sm = Arc::new(DefaultStateMachine::new(id.as_str(), self.config.clone(), sinks));
            sm.pause();
            let adapter = EventAdapter::new(sm.clone());
            (Some(sm), Some(adapter))
        } else {
            (None, None)
        };
        self.sessions.insert(id, SessionEntry { session, state_machine, event_adapter });
    }

    fn on_session_removed(&mut self, id: SessionId) {
        if self.active.as_ref() == Some(&id) {
            self.deactivate_active();
        }
        self.sessions.remove(&id);
    }

    fn on_active_session_changed(&mut self, id: SessionId) {
        self.deactivate_active();
        if let Some(entry) = self.sessions.get(&id)
            && entry.session.is_compatible()
        {
            self.active = Some(id);
            if let Some(sm) = self.sessions.get(self.active.as_ref().unwrap()).and_then(|e| e.state_machine.clone()) {
                sm.resume();
            }
        } else {
            self.active = None;
            if !id.is_valid() {
                debug!("active session cleared");
            } else {
                warn!(%id, "active session changed to an untracked or incompatible session");
            }
        }
    }

    fn deactivate_active(&mut self) {
        if let Some(old) = self.active.take()
            && let Some(entry) = self.sessions.get(&old)
            && let Some(sm) = &entry.state_machine
        {
            sm.pause();
        }
    }
}
