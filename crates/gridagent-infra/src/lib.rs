//! Process-level infrastructure: telemetry setup and the metrics trackers.

pub mod perf;
pub mod telemetry;

pub use perf::{performance_tracker_initializer, PerformanceTracker};
pub use telemetry::init_telemetry;
