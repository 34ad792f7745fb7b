//! Output sinks for a finished batch.
//!
//! Each sink is enabled independently in the configuration and is driven by
//! the [`DispatchCoordinator`](crate::dispatch::DispatchCoordinator) in a
//! fixed order: indicator, telemetry, log file.

pub mod indicator;
pub mod log_file;
pub mod telemetry;
pub mod traits;

// Re-export core types for convenience
pub use indicator::{IndicatorContext, IndicatorDriver, IndicatorSink, LoggingIndicator};
pub use log_file::LogFileSink;
pub use telemetry::TelemetrySink;
pub use traits::Sink;
