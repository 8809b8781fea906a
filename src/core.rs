//! The event-driven decision engine (spec §1–§5): a single-threaded event
//! loop (`daemon`) that owns per-session state machines (`state_machine`)
//! and routes typed events (`events`) to them via event adapters
//! (`event_adapter`), together with the timer/alarm substrate
//! (`timer`, `alarm`) and handler-registration discipline (`handler`) that
//! wire external adapters (`sources`, `sinks`) in and out.

pub mod alarm;
pub mod daemon;
pub mod event_adapter;
pub mod events;
pub mod handler;
pub mod session;
pub mod sinks;
pub mod sources;
pub mod state_machine;
pub mod timer;

pub use alarm::AlarmId;
pub use daemon::{Action, Daemon, DaemonHandle};
pub use event_adapter::EventAdapter;
pub use handler::{HandlerSlot, Registration};
pub use session::{Session, SessionId, SessionType};
pub use state_machine::{DefaultStateMachine, StateMachineConfig, StateMachineSinks};
pub use timer::{DefaultTimer, Timer};
