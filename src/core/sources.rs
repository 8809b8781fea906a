//! Inbound event sources the daemon registers with at startup (spec §4.4,
//! §6). Concrete adapters (D-Bus, sysfs, logind, …) are out of scope — these
//! traits are the contract a future adapter must satisfy.

use crate::core::events::LidState;
use crate::core::handler::Registration;
use crate::core::session::SessionId;

pub trait PowerButton: Send + Sync {
    fn register_press_handler(&self, handler: Box<dyn Fn() + Send + Sync>) -> Registration;
    fn register_release_handler(&self, handler: Box<dyn Fn() + Send + Sync>) -> Registration;
}

pub trait UserActivity: Send + Sync {
    fn register_activity_handler(
        &self,
        handler: Box<dyn Fn(crate::core::events::UserActivityType) + Send + Sync>,
    ) -> Registration;
}

pub trait Lid: Send + Sync {
    fn register_lid_handler(&self, handler: Box<dyn Fn(LidState) + Send + Sync>) -> Registration;
}

pub trait PowerSource: Send + Sync {
    fn register_change_handler(&self, handler: Box<dyn Fn() + Send + Sync>) -> Registration;
    fn register_critical_handler(&self, handler: Box<dyn Fn() + Send + Sync>) -> Registration;
    fn is_using_battery_power(&self) -> bool;
}

pub trait VoiceCallService: Send + Sync {
    fn register_active_call_handler(&self, handler: Box<dyn Fn() + Send + Sync>) -> Registration;
    fn register_no_active_call_handler(&self, handler: Box<dyn Fn() + Send + Sync>) -> Registration;
}

pub trait NotificationService: Send + Sync {
    fn register_notification_handler(&self, handler: Box<dyn Fn(String) + Send + Sync>) -> Registration;
    fn register_notification_done_handler(&self, handler: Box<dyn Fn(String) + Send + Sync>) -> Registration;
}

/// Per-pid client requests: inactivity-timeout control, autobrightness,
/// brightness value, and suspend disallowance. All events here are
/// "named-session" dispatch (spec §4.4) — routed via `SessionTracker`, not
/// to the active session directly.
pub trait ClientRequests: Send + Sync {
    fn register_disable_inactivity_timeout_handler(
        &self,
        handler: Box<dyn Fn(String, i32) + Send + Sync>,
    ) -> Registration;
    fn register_enable_inactivity_timeout_handler(
        &self,
        handler: Box<dyn Fn(String, i32) + Send + Sync>,
    ) -> Registration;
    fn register_set_inactivity_timeout_handler(
        &self,
        handler: Box<dyn Fn(std::time::Duration, i32) + Send + Sync>,
    ) -> Registration;
    fn register_disable_autobrightness_handler(&self, handler: Box<dyn Fn(i32) + Send + Sync>) -> Registration;
    fn register_enable_autobrightness_handler(&self, handler: Box<dyn Fn(i32) + Send + Sync>) -> Registration;
    fn register_set_normal_brightness_value_handler(
        &self,
        handler: Box<dyn Fn(f32, i32) + Send + Sync>,
    ) -> Registration;
    fn register_disallow_suspend_handler(&self, handler: Box<dyn Fn(String, i32) + Send + Sync>) -> Registration;
    fn register_allow_suspend_handler(&self, handler: Box<dyn Fn(String, i32) + Send + Sync>) -> Registration;
}

pub trait SessionTracker: Send + Sync {
    fn register_active_session_changed_handler(
        &self,
        handler: Box<dyn Fn(SessionId) + Send + Sync>,
    ) -> Registration;
    fn register_session_removed_handler(&self, handler: Box<dyn Fn(SessionId) + Send + Sync>) -> Registration;

    /// Resolves a pid to its session id, or `SessionId::invalid()` if unknown.
    fn session_for_pid(&self, pid: i32) -> SessionId;

    fn start_processing(&self);
}
