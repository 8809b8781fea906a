//! A `UserActivity` source backed by `user-idle2`, ported from the
//! teacher's `scheduler::monitors::idle::IdleMonitor` polling loop onto the
//! core's synchronous `register_activity_handler` contract (SPEC_FULL §C.4).
//!
//! Where the teacher's monitor fires `Pause`/`Resume` on idle/active
//! transitions for its break scheduler, this adapter fires a single
//! `UserActivityType::ChangePowerState` event on the idle -> active edge —
//! the core's vocabulary for "the user just did something" (spec §6).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use user_idle2::UserIdle;

use crate::core::events::UserActivityType;
use crate::core::handler::{HandlerSlot, Registration};
use crate::core::sources::UserActivity;

/// Consecutive query failures after which polling logs once more and then
/// goes quiet, matching the teacher's self-disabling idle monitor — this
/// adapter keeps polling (a transient failure may recover) but stops
/// spamming the log.
const MAX_LOGGED_FAILURES: u32 = 3;

type ActivityHandler = dyn Fn(UserActivityType) + Send + Sync;

/// Polls system idle time on a dedicated thread and reports a
/// change-power-state activity event whenever the user transitions from
/// idle back to active.
pub struct IdleActivitySource {
    handler: Arc<HandlerSlot<ActivityHandler>>,
    shutdown: Arc<AtomicBool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl IdleActivitySource {
    #[must_use]
    pub fn spawn(poll_interval: Duration, idle_threshold: Duration) -> Arc<Self> {
        let handler: Arc<HandlerSlot<ActivityHandler>> = Arc::new(HandlerSlot::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_handler = handler.clone();
        let worker_shutdown = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("displaypowerd-idle".into())
            .spawn(move || Self::run(poll_interval, idle_threshold, worker_handler, worker_shutdown))
            .expect("failed to spawn idle-activity thread");

        Arc::new(IdleActivitySource { handler, shutdown, worker: std::sync::Mutex::new(Some(join)) })
    }

    fn run(poll_interval: Duration, idle_threshold: Duration, handler: Arc<HandlerSlot<ActivityHandler>>, shutdown: Arc<AtomicBool>) {
        let mut was_idle = false;
        let failures = AtomicU32::new(0);

        while !shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(poll_interval);

            let idle_duration = match UserIdle::get_time() {
                Ok(d) => {
                    failures.store(0, Ordering::Relaxed);
                    d
                }
                Err(e) => {
                    let n = failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if n <= MAX_LOGGED_FAILURES {
                        tracing::warn!("idle query failed: {e}");
                    }
                    continue;
                }
            };

            let is_idle = idle_duration.as_seconds() >= idle_threshold.as_secs();
            if was_idle && !is_idle {
                tracing::debug!("user activity detected after idle period");
                if let Some(cb) = handler.get() {
                    cb(UserActivityType::ChangePowerState);
                }
            }
            was_idle = is_idle;
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(join) = self.worker.lock().unwrap().take() {
            let _ = join.join();
        }
    }
}

impl Drop for IdleActivitySource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl UserActivity for IdleActivitySource {
    fn register_activity_handler(&self, handler: Box<dyn Fn(UserActivityType) + Send + Sync>) -> Registration {
        self.handler.register(handler.into())
    }
}
