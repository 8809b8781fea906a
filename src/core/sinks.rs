//! Outbound capabilities the state machine drives (spec §4.3).
//!
//! Every sink is declared infallible at this boundary (spec §7): a concrete
//! adapter that talks to real hardware or a bus absorbs and logs its own
//! transport errors rather than returning them here.

use crate::core::events::{DisplayFilter, DisplayPowerChangeReason, ProximityState, SuspendType};
use crate::core::handler::Registration;
use crate::core::timer::AlarmId;

pub trait DisplayPowerControl: Send + Sync {
    fn turn_on(&self, filter: DisplayFilter);
    fn turn_off(&self, filter: DisplayFilter);
}

pub trait BrightnessControl: Send + Sync {
    fn set_normal_brightness(&self);
    fn set_dim_brightness(&self);
    fn set_off_brightness(&self);
    fn set_normal_brightness_value(&self, value: f32);
    fn enable_autobrightness(&self);
    fn disable_autobrightness(&self);
}

/// Emitted only after the display-power and brightness sinks above have
/// already been driven, so observers never see a half-applied transition.
pub trait DisplayPowerEventSink: Send + Sync {
    fn notify_display_power_on(&self, reason: DisplayPowerChangeReason);
    fn notify_display_power_off(&self, reason: DisplayPowerChangeReason);
}

pub trait ModemPowerControl: Send + Sync {
    fn set_low_power_mode(&self);
    fn set_normal_power_mode(&self);
}

pub trait PerformanceBooster: Send + Sync {
    fn enable_interactive_mode(&self);
    fn disable_interactive_mode(&self);
}

pub trait PowerButtonEventSink: Send + Sync {
    fn notify_long_press(&self);
}

/// Both a sink (enable/disable the physical sensor) and, via
/// [`crate::core::sources`] registration, an event source — the proximity
/// sensor is one capability serving both roles, per spec §4.3/§6.
pub trait ProximitySensor: Send + Sync {
    fn proximity_state(&self) -> ProximityState;
    fn enable_proximity_events(&self);
    fn disable_proximity_events(&self);
}

/// Display/suspend information that is read, not driven, by the state
/// machine — used by the lid-closed handler's "no active external display"
/// check (spec §4.3).
pub trait DisplayInformation: Send + Sync {
    fn has_active_external_display(&self) -> bool;
}

pub trait SystemPowerControl: Send + Sync {
    fn allow_suspend(&self, id: &str, suspend_type: SuspendType);
    fn disallow_suspend(&self, id: &str, suspend_type: SuspendType);
    fn suspend_when_allowed(&self, id: &str);
    fn cancel_suspend_when_allowed(&self, id: &str);
    fn power_off(&self);
    fn allow_default_system_handlers(&self);
    fn disallow_default_system_handlers(&self);

    /// Registers for system-resume notifications; dispatched system-global
    /// (spec §4.4) to every compatible state machine.
    fn register_resume_handler(&self, handler: Box<dyn Fn() + Send + Sync>) -> Registration;
}

/// Re-exported so sink implementors only need one `use` for the timer's
/// alarm identifier type alongside the rest of the sink traits.
pub type SinkAlarmId = AlarmId;
