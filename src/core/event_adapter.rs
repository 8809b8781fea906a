//! De-duplicates client-scoped ids before forwarding to a [`DefaultStateMachine`]
//! (spec §4.2). Runs on the event-loop thread; holds no locks of its own.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::state_machine::DefaultStateMachine;

/// Per-session de-duplication of disable/notification/suspend requests by
/// client-supplied id. Each set behaves as a reference count by identity:
/// a transition is forwarded to the state machine only on the first add or
/// the last remove.
pub struct EventAdapter {
    state_machine: Arc<DefaultStateMachine>,
    inactivity_timeout_disallowances: HashSet<String>,
    active_notifications: HashSet<String>,
    suspend_disallowances: HashSet<String>,
}

impl EventAdapter {
    pub fn new(state_machine: Arc<DefaultStateMachine>) -> Self {
        EventAdapter {
            state_machine,
            inactivity_timeout_disallowances: HashSet::new(),
            active_notifications: HashSet::new(),
            suspend_disallowances: HashSet::new(),
        }
    }

    /// Inserts unconditionally; the state machine tolerates repeat
    /// `disable` calls, so no emptiness check is needed on this edge.
    pub fn handle_disable_inactivity_timeout(&mut self, id: String) {
        self.inactivity_timeout_disallowances.insert(id);
        self.state_machine.handle_disable_inactivity_timeout();
    }

    pub fn handle_enable_inactivity_timeout(&mut self, id: &str) {
        self.inactivity_timeout_disallowances.remove(id);
        if self.inactivity_timeout_disallowances.is_empty() {
            self.state_machine.handle_enable_inactivity_timeout();
        }
    }

    pub fn handle_notification(&mut self, id: String) {
        self.active_notifications.insert(id);
        self.state_machine.handle_notification();
    }

    /// A `done` for an id that was never (or no longer) active is dropped —
    /// only a set that actually contained `id` can trigger `no_notification`.
    pub fn handle_notification_done(&mut self, id: &str) {
        let was_present = self.active_notifications.remove(id);
        if was_present && self.active_notifications.is_empty() {
            self.state_machine.handle_no_notification();
        }
    }

    pub fn handle_disallow_suspend(&mut self, id: String) {
        let was_empty = self.suspend_disallowances.is_empty();
        self.suspend_disallowances.insert(id);
        if was_empty {
            self.state_machine.handle_disallow_suspend();
        }
    }

    pub fn handle_allow_suspend(&mut self, id: &str) {
        self.suspend_disallowances.remove(id);
        if self.suspend_disallowances.is_empty() {
            self.state_machine.handle_allow_suspend();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sinks::{
        BrightnessControl, DisplayInformation, DisplayPowerControl, DisplayPowerEventSink,
        ModemPowerControl, PerformanceBooster, PowerButtonEventSink, ProximitySensor,
        SystemPowerControl,
    };
    use crate::core::state_machine::{StateMachineConfig, StateMachineSinks};
    use crate::core::timer::{AlarmId, Timer};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct CountingSinks {
        enable_calls: AtomicUsize,
        disable_calls: AtomicUsize,
        notification_calls: AtomicUsize,
        no_notification_calls: AtomicUsize,
        disallow_suspend_calls: AtomicUsize,
        allow_suspend_calls: AtomicUsize,
        next_alarm: AtomicU32,
        proximity_state: Mutex<crate::core::events::ProximityState>,
    }

    impl Default for CountingSinks {
        fn default() -> Self {
            CountingSinks {
                enable_calls: AtomicUsize::new(0),
                disable_calls: AtomicUsize::new(0),
                notification_calls: AtomicUsize::new(0),
                no_notification_calls: AtomicUsize::new(0),
                disallow_suspend_calls: AtomicUsize::new(0),
                allow_suspend_calls: AtomicUsize::new(0),
                next_alarm: AtomicU32::new(0),
                proximity_state: Mutex::new(crate::core::events::ProximityState::Far),
            }
        }
    }

    impl DisplayPowerControl for CountingSinks {
        fn turn_on(&self, _filter: crate::core::events::DisplayFilter) {}
        fn turn_off(&self, _filter: crate::core::events::DisplayFilter) {}
    }
    impl BrightnessControl for CountingSinks {
        fn set_normal_brightness(&self) {}
        fn set_dim_brightness(&self) {}
        fn set_off_brightness(&self) {}
        fn set_normal_brightness_value(&self, _value: f32) {}
        fn enable_autobrightness(&self) {}
        fn disable_autobrightness(&self) {}
    }
    impl DisplayPowerEventSink for CountingSinks {
        fn notify_display_power_on(&self, _reason: crate::core::events::DisplayPowerChangeReason) {}
        fn notify_display_power_off(&self, _reason: crate::core::events::DisplayPowerChangeReason) {}
    }
    impl ModemPowerControl for CountingSinks {
        fn set_low_power_mode(&self) {}
        fn set_normal_power_mode(&self) {}
    }
    impl PerformanceBooster for CountingSinks {
        fn enable_interactive_mode(&self) {}
        fn disable_interactive_mode(&self) {}
    }
    impl PowerButtonEventSink for CountingSinks {
        fn notify_long_press(&self) {}
    }
    impl ProximitySensor for CountingSinks {
        fn proximity_state(&self) -> crate::core::events::ProximityState {
            *self.proximity_state.lock()
        }
        fn enable_proximity_events(&self) {}
        fn disable_proximity_events(&self) {}
    }
    impl DisplayInformation for CountingSinks {
        fn has_active_external_display(&self) -> bool {
            false
        }
    }
    impl SystemPowerControl for CountingSinks {
        fn allow_suspend(&self, _id: &str, _suspend_type: crate::core::events::SuspendType) {
            self.allow_suspend_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn disallow_suspend(&self, _id: &str, _suspend_type: crate::core::events::SuspendType) {
            self.disallow_suspend_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn suspend_when_allowed(&self, _id: &str) {}
        fn cancel_suspend_when_allowed(&self, _id: &str) {}
        fn power_off(&self) {}
        fn allow_default_system_handlers(&self) {}
        fn disallow_default_system_handlers(&self) {}
        fn register_resume_handler(&self, _handler: Box<dyn Fn() + Send + Sync>) -> crate::core::handler::Registration {
            crate::core::handler::Registration::noop()
        }
    }
    impl Timer for CountingSinks {
        fn register_alarm_handler(&self, _handler: Arc<dyn Fn(AlarmId) + Send + Sync>) -> crate::core::handler::Registration {
            crate::core::handler::Registration::noop()
        }
        fn schedule_alarm_in(&self, _duration: Duration) -> AlarmId {
            let gen = crate::core::alarm::AlarmIdGenerator::new();
            let mut id = gen.next();
            for _ in 0..self.next_alarm.fetch_add(1, Ordering::SeqCst) {
                id = gen.next();
            }
            id
        }
        fn cancel_alarm(&self, _id: AlarmId) {}
        fn now(&self) -> Instant {
            Instant::now()
        }
    }

    fn state_machine(sinks: Arc<CountingSinks>) -> DefaultStateMachine {
        let bundle = StateMachineSinks {
            display: sinks.clone(),
            brightness: sinks.clone(),
            display_events: sinks.clone(),
            modem: sinks.clone(),
            performance: sinks.clone(),
            power_button_events: sinks.clone(),
            proximity: sinks.clone(),
            display_info: sinks.clone(),
            system: sinks.clone(),
            timer: sinks,
        };
        DefaultStateMachine::new("s1", StateMachineConfig::default(), bundle)
    }

    #[test]
    fn dedups_disallow_and_allow_suspend_by_id() {
        let sinks = Arc::new(CountingSinks::default());
        let sm = Arc::new(state_machine(sinks.clone()));
        let mut adapter = EventAdapter::new(sm.clone());

        // Three distinct ids added with no removes in between: only the
        // first add (0 -> 1) is a forwarding edge.
        adapter.handle_disallow_suspend("a".into());
        adapter.handle_disallow_suspend("b".into());
        adapter.handle_disallow_suspend("c".into());
        assert_eq!(sinks.disallow_suspend_calls.load(Ordering::SeqCst), 1);

        adapter.handle_allow_suspend("a");
        adapter.handle_allow_suspend("b");
        assert_eq!(sinks.allow_suspend_calls.load(Ordering::SeqCst), 0);
        adapter.handle_allow_suspend("c");
        assert_eq!(sinks.allow_suspend_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spurious_notification_done_is_dropped() {
        let sinks = Arc::new(CountingSinks::default());
        let sm = Arc::new(state_machine(sinks.clone()));
        let mut adapter = EventAdapter::new(sm.clone());

        // "done" for an id that was never active must not reach the state
        // machine.
        adapter.handle_notification_done("never-seen");

        adapter.handle_notification("n1".into());
        adapter.handle_notification("n1".into());
        adapter.handle_notification_done("n1");
        // set is now empty, so a second done is spurious
        adapter.handle_notification_done("n1");

        assert_eq!(sm.display_power_mode(), crate::core::events::DisplayPowerMode::On);
    }
}
