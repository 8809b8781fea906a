//! Thin binary wiring the core decision engine (`displaypowerd::core`) to a
//! runnable, if minimal, set of adapters (SPEC_FULL §A).
//!
//! This is deliberately small: the core neither talks to hardware nor
//! defines a CLI surface (spec §1 Non-goals), so this binary's only job is
//! to load configuration, construct the daemon with a `TracingSinks` bundle
//! and the one genuine event source the crate ships
//! (`adapters::idle_activity`), and run the loop until the process is
//! killed.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;

use displaypowerd::adapters::{IdleActivitySource, TracingSinks};
use displaypowerd::config;
use displaypowerd::core::daemon::Action;
use displaypowerd::core::handler::{HandlerSlot, Registration};
use displaypowerd::core::session::{SessionId, SessionType};
use displaypowerd::core::sources::{SessionTracker, UserActivity};
use displaypowerd::core::state_machine::StateMachineSinks;
use displaypowerd::core::timer::Timer;
use displaypowerd::core::{Daemon, DaemonHandle, DefaultTimer};
use displaypowerd::utils;

/// A minimal `SessionTracker` for a single-user desktop: one compatible
/// session, owned by this process, that becomes active as soon as the
/// daemon starts processing. A multi-session desktop would instead get its
/// sessions from logind over D-Bus (out of scope for this crate, spec §1).
///
/// Needs a [`DaemonHandle`] to enqueue the session-lifecycle actions, but a
/// handle only exists once the [`Daemon`] that owns this tracker has been
/// constructed — [`Self::set_handle`] fills it in right after, before
/// [`Daemon::run`] calls [`SessionTracker::start_processing`].
struct LocalSessionTracker {
    handle: OnceLock<DaemonHandle>,
    pid: i32,
    session_id: SessionId,
    active_handler: HandlerSlot<dyn Fn(SessionId) + Send + Sync>,
    removed_handler: HandlerSlot<dyn Fn(SessionId) + Send + Sync>,
}

impl LocalSessionTracker {
    fn new() -> Self {
        LocalSessionTracker {
            handle: OnceLock::new(),
            pid: std::process::id() as i32,
            session_id: SessionId::new("local"),
            active_handler: HandlerSlot::new(),
            removed_handler: HandlerSlot::new(),
        }
    }

    fn set_handle(&self, handle: DaemonHandle) {
        let _ = self.handle.set(handle);
    }
}

impl SessionTracker for LocalSessionTracker {
    fn register_active_session_changed_handler(
        &self,
        handler: Box<dyn Fn(SessionId) + Send + Sync>,
    ) -> Registration {
        self.active_handler.register(handler.into())
    }

    fn register_session_removed_handler(&self, handler: Box<dyn Fn(SessionId) + Send + Sync>) -> Registration {
        self.removed_handler.register(handler.into())
    }

    fn session_for_pid(&self, pid: i32) -> SessionId {
        if pid == self.pid { self.session_id.clone() } else { SessionId::invalid() }
    }

    /// Discovers the one local session and activates it — `Daemon::run`
    /// calls this once, before entering the loop (spec §4.4 "Startup").
    fn start_processing(&self) {
        let Some(handle) = self.handle.get() else {
            tracing::warn!("session tracker started before its daemon handle was set; dropping startup session");
            return;
        };
        handle.enqueue(Action::SessionAdded {
            id: self.session_id.clone(),
            session_type: SessionType::Compatible,
            pid: self.pid,
        });
        handle.enqueue(Action::ActiveSessionChanged { id: self.session_id.clone() });
    }
}

fn default_log_dir() -> PathBuf {
    let base = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/state")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("displaypowerd")
}

fn main() -> anyhow::Result<()> {
    let options = config::load_default_config();

    utils::init_logging(&default_log_dir(), options.log_level)
        .map_err(anyhow::Error::msg)
        .context("failed to initialize logging")?;

    tracing::info!("starting displaypowerd");

    let timer = DefaultTimer::new();
    let sinks = Arc::new(TracingSinks::new());
    let idle_activity =
        IdleActivitySource::spawn(Duration::from_secs(options.idle_activity_poll_interval_s), Duration::from_secs(60));
    let tracker = Arc::new(LocalSessionTracker::new());

    let state_machine_config = options.to_state_machine_config();

    let daemon = Daemon::new(state_machine_config, tracker.clone(), {
        let sinks = sinks.clone();
        let timer: Arc<dyn Timer> = timer.clone();
        move |_id| StateMachineSinks {
            display: sinks.clone(),
            brightness: sinks.clone(),
            display_events: sinks.clone(),
            modem: sinks.clone(),
            performance: sinks.clone(),
            power_button_events: sinks.clone(),
            proximity: sinks.clone(),
            display_info: sinks.clone(),
            system: sinks.clone(),
            timer: timer.clone(),
        }
    });

    let handle = daemon.handle();
    tracker.set_handle(handle.clone());

    let _alarm_registration = {
        let handle = handle.clone();
        timer.register_alarm_handler(Arc::new(move |id| handle.enqueue(Action::Alarm(id))))
    };
    let _activity_registration = {
        let handle = handle.clone();
        idle_activity.register_activity_handler(Box::new(move |kind| handle.enqueue(Action::UserActivity(kind))))
    };

    daemon.run();
    Ok(())
}
