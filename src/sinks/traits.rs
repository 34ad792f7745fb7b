use crate::{error::SinkError, sensors::Batch, threshold::IndicatorState};

/// Destination for one cycle's results.
///
/// Implementations acquire whatever resource they need inside [`Sink::publish`]
/// and release it before returning.
///
/// # Example
///
/// ```no_run
/// use sht21pid::error::SinkError;
/// use sht21pid::sensors::Batch;
/// use sht21pid::sinks::Sink;
/// use sht21pid::threshold::IndicatorState;
///
/// struct CountingSink(usize);
///
/// impl Sink for CountingSink {
///     fn name(&self) -> &'static str { "counting" }
///
///     fn publish(&mut self, batch: &Batch, _state: &IndicatorState) -> Result<(), SinkError> {
///         self.0 += batch.len();
///         Ok(())
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Sink: Send {
    /// Returns sink name for logging and error reports.
    fn name(&self) -> &'static str;

    /// Delivers the batch and its indicator state.
    fn publish(&mut self, batch: &Batch, indicator: &IndicatorState) -> Result<(), SinkError>;
}
