// Ambient infrastructure: logging, metrics, structured concurrency
pub mod logging;
pub mod metrics;
pub mod structured;

pub use logging::*;
pub use metrics::{GcMetrics, MetricsSummary, Timer, TimingStats};
pub use structured::{CancellationToken, TaskScope};
