//! On-disk configuration surface for the daemon binary (SPEC_FULL §B, §C.5).
//!
//! The core engine (`crate::core::state_machine::StateMachineConfig`) takes
//! `Duration`s and has no notion of serialization; `DaemonOptions` is the
//! serializable, human-editable TOML shape the binary loads and converts
//! from, the way the teacher's `AppConfig` is the on-disk shape behind its
//! in-memory scheduler settings.

use serde::{Deserialize, Serialize};

use crate::utils::LogLevel;

/// Durations here are expressed in whole seconds: friendlier to hand-edit in
/// TOML than nanosecond-precision `Duration`s, and the core's own timeouts
/// are never sub-second (spec §6).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DaemonOptions {
    /// How long the power button must be held before a long-press fires.
    pub power_button_long_press_timeout_s: u64,
    /// Time spent dimmed before turning off, counted backward from the
    /// normal off timeout.
    pub user_inactivity_normal_display_dim_duration_s: u64,
    /// Inactivity timeout while nothing else (call, notification) is
    /// keeping the display on. `0` means "disabled" (see
    /// [`DaemonOptions::to_state_machine_config`]).
    pub user_inactivity_normal_display_off_timeout_s: u64,
    pub user_inactivity_reduced_display_off_timeout_s: u64,
    pub user_inactivity_post_notification_display_off_timeout_s: u64,
    pub notification_expiration_timeout_s: u64,
    /// Whether a power-button press/release while the display is already on
    /// counts as ordinary user activity (brighten + reschedule) instead of
    /// toggling the display off on release.
    pub treat_power_button_as_user_activity: bool,
    /// Whether the daemon should turn the display on as soon as it starts,
    /// rather than waiting for the first event.
    pub turn_on_display_at_startup: bool,
    /// How often the idle-activity adapter polls `user-idle2`
    /// (SPEC_FULL §C.4) — only meaningful when that adapter is wired in.
    pub idle_activity_poll_interval_s: u64,
    pub log_level: LogLevel,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        DaemonOptions {
            power_button_long_press_timeout_s: 2,
            user_inactivity_normal_display_dim_duration_s: 10,
            user_inactivity_normal_display_off_timeout_s: 60,
            user_inactivity_reduced_display_off_timeout_s: 15,
            user_inactivity_post_notification_display_off_timeout_s: 3,
            notification_expiration_timeout_s: 60,
            treat_power_button_as_user_activity: true,
            turn_on_display_at_startup: false,
            idle_activity_poll_interval_s: 5,
            log_level: LogLevel::default(),
        }
    }
}

impl DaemonOptions {
    /// Converts to the core's own configuration type. A zero-second normal
    /// off timeout is translated to `Duration::MAX` ("infinite", spec §4.3
    /// "Inactivity scheduling rules") rather than an instant off-alarm,
    /// matching how the core treats "no normal timeout" as a distinct state
    /// from "a very short one".
    #[must_use]
    pub fn to_state_machine_config(&self) -> crate::core::state_machine::StateMachineConfig {
        use std::time::Duration;
        crate::core::state_machine::StateMachineConfig {
            power_button_long_press_timeout: Duration::from_secs(self.power_button_long_press_timeout_s),
            user_inactivity_normal_display_dim_duration: Duration::from_secs(
                self.user_inactivity_normal_display_dim_duration_s,
            ),
            user_inactivity_normal_display_off_timeout: if self.user_inactivity_normal_display_off_timeout_s == 0 {
                Duration::MAX
            } else {
                Duration::from_secs(self.user_inactivity_normal_display_off_timeout_s)
            },
            user_inactivity_reduced_display_off_timeout: Duration::from_secs(
                self.user_inactivity_reduced_display_off_timeout_s,
            ),
            user_inactivity_post_notification_display_off_timeout: Duration::from_secs(
                self.user_inactivity_post_notification_display_off_timeout_s,
            ),
            notification_expiration_timeout: Duration::from_secs(self.notification_expiration_timeout_s),
            treat_power_button_as_user_activity: self.treat_power_button_as_user_activity,
            turn_on_display_at_startup: self.turn_on_display_at_startup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_normal_timeout_becomes_infinite() {
        let opts = DaemonOptions { user_inactivity_normal_display_off_timeout_s: 0, ..Default::default() };
        assert_eq!(opts.to_state_machine_config().user_inactivity_normal_display_off_timeout, std::time::Duration::MAX);
    }

    #[test]
    fn nonzero_normal_timeout_is_preserved_in_seconds() {
        let opts = DaemonOptions::default();
        assert_eq!(
            opts.to_state_machine_config().user_inactivity_normal_display_off_timeout,
            std::time::Duration::from_secs(60)
        );
    }
}
