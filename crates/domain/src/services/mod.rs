//! Shared service helpers: process-wide telemetry wiring.

pub mod telemetry;

pub use telemetry::*;
