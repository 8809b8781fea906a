//! Concrete adapters that round out a runnable binary (SPEC_FULL §A, §C.4).
//!
//! The core (`crate::core`) defines the event-source and sink contracts but
//! never implements them — that's explicitly out of scope (spec §1). This
//! module supplies the minimum needed to run `displaypowerd` standalone: one
//! real event source (idle-based user activity) and a sink bundle that logs
//! every decision via `tracing` instead of touching real hardware.

pub mod idle_activity;
pub mod tracing_sinks;

pub use idle_activity::IdleActivitySource;
pub use tracing_sinks::TracingSinks;
