//! `displaypowerd` — an event-driven display/suspend power-management
//! daemon core for mobile and convertible Linux sessions.
//!
//! The crate is organized as the decision engine's own layers:
//!
//! - [`core`] — the single-threaded event loop, per-session state machines,
//!   the timer/alarm substrate, and the handler-registration discipline that
//!   wires external adapters in and out. This is the part the rest of the
//!   crate exists to run.
//! - [`config`] — TOML configuration loading for the binary.
//! - [`utils`] — error types and `tracing`-based logging setup.
//! - [`adapters`] — a small number of concrete, non-core adapters that round
//!   out a runnable binary; the core itself never talks to hardware or
//!   parses a wire format.

pub mod adapters;
pub mod config;
pub mod core;
pub mod utils;
