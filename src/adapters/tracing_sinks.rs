//! A sink bundle that logs every decision via `tracing` instead of touching
//! real hardware (SPEC_FULL §A) — the default wiring for the binary and the
//! simplest possible conforming implementation of every sink trait in
//! `crate::core::sinks`.
//!
//! Concrete backlight/modem/suspend mechanisms are out of scope for this
//! crate (spec §1); `TracingSinks` exists so `displaypowerd` is runnable
//! standalone and so the decision engine's output is observable without a
//! real display or modem attached.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::events::{DisplayFilter, DisplayPowerChangeReason, ProximityState, SuspendType};
use crate::core::handler::Registration;
use crate::core::sinks::{
    BrightnessControl, DisplayInformation, DisplayPowerControl, DisplayPowerEventSink,
    ModemPowerControl, PerformanceBooster, PowerButtonEventSink, ProximitySensor,
    SystemPowerControl,
};

/// Logs every sink call at `info`/`debug` and reports a fixed "far, no
/// external display" environment — enough to drive the state machine through
/// its full transition set without any real sensor attached.
pub struct TracingSinks {
    proximity_near: AtomicBool,
}

impl Default for TracingSinks {
    fn default() -> Self {
        TracingSinks { proximity_near: AtomicBool::new(false) }
    }
}

impl TracingSinks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/CLI hook: flips the reported proximity state, for exercising the
    /// call/notification-near paths without real hardware.
    pub fn set_proximity_near(&self, near: bool) {
        self.proximity_near.store(near, Ordering::SeqCst);
    }
}

impl DisplayPowerControl for TracingSinks {
    fn turn_on(&self, filter: DisplayFilter) {
        tracing::info!(%filter, "display: turn on");
    }
    fn turn_off(&self, filter: DisplayFilter) {
        tracing::info!(%filter, "display: turn off");
    }
}

impl BrightnessControl for TracingSinks {
    fn set_normal_brightness(&self) {
        tracing::debug!("brightness: normal");
    }
    fn set_dim_brightness(&self) {
        tracing::debug!("brightness: dim");
    }
    fn set_off_brightness(&self) {
        tracing::debug!("brightness: off");
    }
    fn set_normal_brightness_value(&self, value: f32) {
        tracing::debug!(value, "brightness: set normal value");
    }
    fn enable_autobrightness(&self) {
        tracing::debug!("autobrightness: enabled");
    }
    fn disable_autobrightness(&self) {
        tracing::debug!("autobrightness: disabled");
    }
}

impl DisplayPowerEventSink for TracingSinks {
    fn notify_display_power_on(&self, reason: DisplayPowerChangeReason) {
        tracing::info!(%reason, "notify: display power on");
    }
    fn notify_display_power_off(&self, reason: DisplayPowerChangeReason) {
        tracing::info!(%reason, "notify: display power off");
    }
}

impl ModemPowerControl for TracingSinks {
    fn set_low_power_mode(&self) {
        tracing::debug!("modem: low power mode");
    }
    fn set_normal_power_mode(&self) {
        tracing::debug!("modem: normal power mode");
    }
}

impl PerformanceBooster for TracingSinks {
    fn enable_interactive_mode(&self) {
        tracing::debug!("performance: interactive mode on");
    }
    fn disable_interactive_mode(&self) {
        tracing::debug!("performance: interactive mode off");
    }
}

impl PowerButtonEventSink for TracingSinks {
    fn notify_long_press(&self) {
        tracing::info!("notify: power button long press");
    }
}

impl ProximitySensor for TracingSinks {
    fn proximity_state(&self) -> ProximityState {
        if self.proximity_near.load(Ordering::SeqCst) { ProximityState::Near } else { ProximityState::Far }
    }
    fn enable_proximity_events(&self) {
        tracing::debug!("proximity: sensor enabled");
    }
    fn disable_proximity_events(&self) {
        tracing::debug!("proximity: sensor disabled");
    }
}

impl DisplayInformation for TracingSinks {
    fn has_active_external_display(&self) -> bool {
        false
    }
}

impl SystemPowerControl for TracingSinks {
    fn allow_suspend(&self, id: &str, suspend_type: SuspendType) {
        tracing::debug!(id, %suspend_type, "system: allow suspend");
    }
    fn disallow_suspend(&self, id: &str, suspend_type: SuspendType) {
        tracing::debug!(id, %suspend_type, "system: disallow suspend");
    }
    fn suspend_when_allowed(&self, id: &str) {
        tracing::info!(id, "system: suspend when allowed");
    }
    fn cancel_suspend_when_allowed(&self, id: &str) {
        tracing::info!(id, "system: cancel suspend when allowed");
    }
    fn power_off(&self) {
        tracing::warn!("system: power off requested");
    }
    fn allow_default_system_handlers(&self) {
        tracing::debug!("system: default handlers allowed");
    }
    fn disallow_default_system_handlers(&self) {
        tracing::debug!("system: default handlers disallowed");
    }
    fn register_resume_handler(&self, _handler: Box<dyn Fn() + Send + Sync>) -> Registration {
        // No real suspend/resume mechanism is wired up in this sink bundle
        // (spec §1 Non-goals); nothing ever calls the handler, so there is no
        // slot for `Registration`'s drop to clear.
        Registration::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_far_with_no_external_display() {
        let sinks = TracingSinks::new();
        assert_eq!(sinks.proximity_state(), ProximityState::Far);
        assert!(!sinks.has_active_external_display());
    }

    #[test]
    fn proximity_override_is_observable() {
        let sinks = TracingSinks::new();
        sinks.set_proximity_near(true);
        assert_eq!(sinks.proximity_state(), ProximityState::Near);
    }
}
