//! Enumerations and bitmaps shared by the state machine, sinks and sources.

use bitflags::bitflags;
use strum_macros::{Display, EnumIter, EnumString};

/// Power state of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DisplayPowerMode {
    On,
    Off,
    Unknown,
}

/// Why a display power transition happened, carried through to
/// [`crate::core::sinks::DisplayPowerEventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum DisplayPowerChangeReason {
    PowerButton,
    Activity,
    Proximity,
    Notification,
    Call,
    CallDone,
    Unknown,
}

/// Which displays a [`crate::core::sinks::DisplayPowerControl`] call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DisplayFilter {
    All,
    Internal,
    External,
}

/// Strength of a suspend disallowance, mirroring the distinction between a
/// disallowance that only blocks automatic (idle-driven) suspend and one that
/// blocks suspend outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SuspendType {
    Automatic,
    Any,
}

/// How a [`crate::core::sources::UserActivity`] event should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UserActivityType {
    /// Always brightens / turns on the display.
    ChangePowerState,
    /// Only acts while the display is already on.
    ExtendPowerState,
}

/// Physical state reported by [`crate::core::sources::Lid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LidState {
    Open,
    Closed,
}

/// Physical state reported by [`crate::core::sinks::ProximitySensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProximityState {
    Near,
    Far,
}

/// Which inactivity schedule (if any) is currently pending for a session.
///
/// Kept distinct from `DisplayPowerChangeReason`: this tracks the *alarm*
/// that is armed, not the reason display power last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default)]
pub enum ScheduledTimeoutType {
    #[default]
    None,
    Normal,
    PostNotification,
    Reduced,
}

bitflags! {
    /// Reasons the inactivity timeout (dim/off alarms) may be held back.
    /// Timers apply only when every bit is set — see spec §3, §4.3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InactivityTimeoutAllowances: u8 {
        /// Cleared by `disable_inactivity_timeout`, set by `enable_inactivity_timeout`.
        const CLIENT = 1 << 0;
        /// Cleared while a notification is active.
        const NOTIFICATION = 1 << 1;
    }
}

impl Default for InactivityTimeoutAllowances {
    fn default() -> Self {
        InactivityTimeoutAllowances::all()
    }
}

bitflags! {
    /// Reasons the proximity sensor is kept enabled. The sensor is
    /// physically enabled iff this is non-empty (spec §3, §4.3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProximityEnablements: u8 {
        const UNTIL_FAR_EVENT = 1 << 0;
        const UNTIL_DISABLED = 1 << 1;
        const UNTIL_FAR_EVENT_OR_TIMEOUT = 1 << 2;
        const UNTIL_FAR_EVENT_OR_NOTIFICATION_EXPIRATION = 1 << 3;
    }
}

impl Default for ProximityEnablements {
    fn default() -> Self {
        ProximityEnablements::empty()
    }
}

impl ProximityEnablements {
    /// True iff exactly the notification-expiration bit is set — the state
    /// machine uses this to decide whether a Far event should prefer the
    /// reduced inactivity timeout.
    pub fn is_only_until_far_event_or_notification_expiration(self) -> bool {
        self == ProximityEnablements::UNTIL_FAR_EVENT_OR_NOTIFICATION_EXPIRATION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactivity_allowances_default_to_all_set() {
        assert_eq!(InactivityTimeoutAllowances::default(), InactivityTimeoutAllowances::all());
    }

    #[test]
    fn proximity_enablements_default_to_empty() {
        assert_eq!(ProximityEnablements::default(), ProximityEnablements::empty());
    }

    #[test]
    fn only_until_notification_expiration_is_precise() {
        let only = ProximityEnablements::UNTIL_FAR_EVENT_OR_NOTIFICATION_EXPIRATION;
        assert!(only.is_only_until_far_event_or_notification_expiration());

        let both = only | ProximityEnablements::UNTIL_DISABLED;
        assert!(!both.is_only_until_far_event_or_notification_expiration());
    }
}
