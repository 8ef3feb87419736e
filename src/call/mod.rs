//! Call-state handling.

pub mod monitor;
pub mod signal;

pub use monitor::{CallStateMonitor, MonitorOutcome};
pub use signal::{CallEvent, CallSignal, CallState};
