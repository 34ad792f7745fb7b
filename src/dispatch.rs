//! Fan-out of a finished batch to the enabled sinks.

use log::{error, info, warn};

use crate::{
    config::Config,
    error::{DispatchError, SinkError},
    sensors::Batch,
    sinks::{IndicatorSink, LogFileSink, Sink, TelemetrySink},
    threshold::IndicatorState,
};

/// Outcome of one dispatch: which sinks delivered and which failed.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<(&'static str, SinkError)>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives the indicator, telemetry and log sinks in that order.
///
/// A failing sink never stops the ones after it. Only a fatal error (the
/// sink could not acquire its resource at all) leaves this boundary, and only
/// after every remaining sink has run; the first one is returned with the
/// report of everything else.
#[derive(Default)]
pub struct DispatchCoordinator {
    indicator: Option<Box<dyn Sink>>,
    telemetry: Option<Box<dyn Sink>>,
    log: Option<Box<dyn Sink>>,
}

impl DispatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the sinks whose enable flag is set.
    pub fn from_config(config: &Config) -> Result<Self, SinkError> {
        let mut coordinator = Self::new();

        if config.leds.enabled {
            coordinator = coordinator.with_indicator(Box::new(IndicatorSink::from_config(
                &config.leds,
            )));
        }
        if config.influx.enabled {
            coordinator = coordinator.with_telemetry(Box::new(TelemetrySink::new(&config.influx)?));
        }
        if config.configuration.log_enabled {
            coordinator = coordinator.with_log(Box::new(LogFileSink::new(config.data_log_path())));
        }

        info!(
            "Enabled sinks: {}",
            coordinator.enabled_sinks().join(", ")
        );
        Ok(coordinator)
    }

    pub fn with_indicator(mut self, sink: Box<dyn Sink>) -> Self {
        self.indicator = Some(sink);
        self
    }

    pub fn with_telemetry(mut self, sink: Box<dyn Sink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn with_log(mut self, sink: Box<dyn Sink>) -> Self {
        self.log = Some(sink);
        self
    }

    pub fn enabled_sinks(&self) -> Vec<&'static str> {
        [&self.indicator, &self.telemetry, &self.log]
            .into_iter()
            .flatten()
            .map(|sink| sink.name())
            .collect()
    }

    pub fn dispatch(
        &mut self,
        batch: &Batch,
        indicator: &IndicatorState,
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();
        let mut fatal = None;

        for sink in [&mut self.indicator, &mut self.telemetry, &mut self.log]
            .into_iter()
            .flatten()
        {
            let name = sink.name();
            match sink.publish(batch, indicator) {
                Ok(()) => report.delivered.push(name),
                Err(e) if e.is_fatal() && fatal.is_none() => {
                    error!("Sink '{name}' cannot acquire its resource: {e}");
                    fatal = Some((name, e));
                }
                Err(e) => {
                    warn!("Sink '{name}' failed: {e}");
                    report.failed.push((name, e));
                }
            }
        }

        match fatal {
            Some((sink, source)) => Err(DispatchError::Fatal {
                sink,
                source,
                report,
            }),
            None => Ok(report),
        }
    }
}
