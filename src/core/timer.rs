//! Monotonic clock and alarm scheduling (spec §4.1).
//!
//! Callbacks re-enter the daemon's action queue, so the implementation here
//! takes care never to invoke the registered handler while holding the
//! alarm table's lock (spec §5 "Suspension points").

use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub use crate::core::alarm::AlarmId;
use crate::core::alarm::AlarmIdGenerator;
use crate::core::handler::{HandlerSlot, Registration};

/// The single sink for fired alarms, matching spec §4.1's
/// `register_alarm_handler`.
pub type AlarmHandler = dyn Fn(AlarmId) + Send + Sync;

pub trait Timer: Send + Sync {
    fn register_alarm_handler(&self, handler: Arc<AlarmHandler>) -> Registration;
    fn schedule_alarm_in(&self, duration: Duration) -> AlarmId;
    fn cancel_alarm(&self, id: AlarmId);
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledAlarm {
    deadline: Instant,
    id: AlarmId,
}

// Reverse ordering: `BinaryHeap` is a max-heap, and we want the earliest
// deadline at the top.
impl Ord for ScheduledAlarm {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.deadline.cmp(&self.deadline).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScheduledAlarm {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// `AlarmId` doesn't derive `Ord` (it has no meaningful total order outside
// this heap tie-break), so give `ScheduledAlarm` one by comparing the raw
// `Display` form — good enough for a tie-break that only matters when two
// alarms share a deadline exactly.
impl std::cmp::Ord for AlarmId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}
impl std::cmp::PartialOrd for AlarmId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct SharedState {
    heap: BinaryHeap<ScheduledAlarm>,
    /// Ids cancelled but not yet popped from `heap`; lazily dropped when
    /// encountered at the top.
    cancelled: std::collections::HashSet<AlarmId>,
    shutdown: bool,
}

/// Background-thread timer backed by a min-heap of deadlines, a condvar for
/// the waiting thread, and a single registered alarm handler.
pub struct DefaultTimer {
    state: Arc<Mutex<SharedState>>,
    condvar: Arc<Condvar>,
    generator: Arc<AlarmIdGenerator>,
    handler: Arc<HandlerSlot<AlarmHandler>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DefaultTimer {
    pub fn new() -> Arc<Self> {
        let state = Arc::new(Mutex::new(SharedState {
            heap: BinaryHeap::new(),
            cancelled: std::collections::HashSet::new(),
            shutdown: false,
        }));
        let condvar = Arc::new(Condvar::new());
        let handler: Arc<HandlerSlot<AlarmHandler>> = Arc::new(HandlerSlot::new());

        let worker_state = state.clone();
        let worker_condvar = condvar.clone();
        let worker_handler = handler.clone();
        let join = std::thread::Builder::new()
            .name("displaypowerd-timer".into())
            .spawn(move || Self::run(worker_state, worker_condvar, worker_handler))
            .expect("failed to spawn timer thread");

        Arc::new(DefaultTimer {
            state,
            condvar,
            generator: Arc::new(AlarmIdGenerator::new()),
            handler,
            worker: Mutex::new(Some(join)),
        })
    }

    fn run(state: Arc<Mutex<SharedState>>, condvar: Arc<Condvar>, handler: Arc<HandlerSlot<AlarmHandler>>) {
        loop {
            let fired = {
                let mut guard = state.lock();
                loop {
                    if guard.shutdown {
                        return;
                    }
                    match guard.heap.peek().copied() {
                        None => {
                            condvar.wait(&mut guard);
                        }
                        Some(next) => {
                            let now = Instant::now();
                            if next.deadline <= now {
                                guard.heap.pop();
                                if guard.cancelled.remove(&next.id) {
                                    continue;
                                }
                                break Some(next.id);
                            } else {
                                let timeout = next.deadline - now;
                                condvar.wait_for(&mut guard, timeout);
                                continue;
                            }
                        }
                    }
                }
            };

            // Invoke the callback with no lock held: it may call back into
            // schedule_alarm_in/cancel_alarm (re-entering the daemon queue).
            if let Some(id) = fired
                && let Some(cb) = handler.get()
            {
                cb(id);
            }
        }
    }

    pub fn shutdown(&self) {
        {
            let mut guard = self.state.lock();
            guard.shutdown = true;
        }
        self.condvar.notify_all();
        if let Some(join) = self.worker.lock().take() {
            let _ = join.join();
        }
    }
}

impl Drop for DefaultTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Timer for DefaultTimer {
    fn register_alarm_handler(&self, handler: Arc<AlarmHandler>) -> Registration {
        self.handler.register(handler)
    }

    fn schedule_alarm_in(&self, duration: Duration) -> AlarmId {
        let id = self.generator.next();
        let deadline = Instant::now() + duration;
        {
            let mut guard = self.state.lock();
            guard.heap.push(ScheduledAlarm { deadline, id });
        }
        self.condvar.notify_all();
        id
    }

    fn cancel_alarm(&self, id: AlarmId) {
        let mut guard = self.state.lock();
        guard.cancelled.insert(id);
        drop(guard);
        self.condvar.notify_all();
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn fires_after_duration_with_fresh_id() {
        let timer = DefaultTimer::new();
        let (tx, rx) = mpsc::channel();
        let _reg = timer.register_alarm_handler(Arc::new(move |id| {
            let _ = tx.send(id);
        }));

        let id = timer.schedule_alarm_in(Duration::from_millis(20));
        assert!(id.is_valid());

        let fired = rx.recv_timeout(Duration::from_secs(2)).expect("alarm did not fire");
        assert_eq!(fired, id);
    }

    #[test]
    fn cancelled_alarm_never_fires() {
        let timer = DefaultTimer::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _reg = timer.register_alarm_handler(Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let id = timer.schedule_alarm_in(Duration::from_millis(50));
        timer.cancel_alarm(id);
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_duration_is_still_delivered_asynchronously() {
        let timer = DefaultTimer::new();
        let (tx, rx) = mpsc::channel();
        let _reg = timer.register_alarm_handler(Arc::new(move |id| {
            let _ = tx.send(id);
        }));
        let id = timer.schedule_alarm_in(Duration::from_millis(0));
        let fired = rx.recv_timeout(Duration::from_secs(1)).expect("alarm did not fire");
        assert_eq!(fired, id);
    }
}
