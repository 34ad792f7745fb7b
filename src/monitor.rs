//! The poll cycle: read every installed sensor, evaluate, dispatch.

use std::time::{SystemTime, UNIX_EPOCH};

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::{
    config::Config,
    dispatch::{DispatchCoordinator, DispatchReport},
    drivers::{BusIo, MuxController, SensorReader},
    error::{BusError, DispatchError},
    sensors::{Batch, Reading, SensorAddress, SensorRegistry},
    threshold::{IndicatorState, ThresholdEvaluator},
};

/// Owns the bus handle and walks the registry one sensor at a time.
///
/// The bus is released when the aggregator is dropped.
pub struct BatchAggregator<B, D> {
    bus: B,
    mux: MuxController,
    reader: SensorReader<D>,
}

impl<B: BusIo, D: DelayNs> BatchAggregator<B, D> {
    pub fn new(bus: B, mux: MuxController, delay: D) -> Self {
        Self {
            bus,
            mux,
            reader: SensorReader::new(delay),
        }
    }

    /// Startup soft reset; failures are logged and swallowed.
    pub fn soft_reset(&mut self) {
        if let Err(e) = self.reader.soft_reset(&mut self.bus) {
            error!("Error during initialization: {e}");
        }
    }

    /// Reads every registered sensor in ascending order.
    ///
    /// A sensor that fails on the bus is skipped; the rest of the cycle continues.
    pub fn poll_all(&mut self, registry: &SensorRegistry) -> Batch {
        let mut batch = Batch::new();
        for &address in registry {
            match self.read_sensor(address) {
                Ok(reading) => {
                    info!(
                        "Read sensor\t\t\t'{}': {} {}",
                        reading.address, reading.temperature, reading.humidity
                    );
                    batch.push(reading);
                }
                Err(e) => warn!("Skipping sensor {address}: {e}"),
            }
        }
        batch
    }

    fn read_sensor(&mut self, address: SensorAddress) -> Result<Reading, BusError> {
        self.mux.select(&mut self.bus, address)?;
        let temperature = self.reader.measure_temperature(&mut self.bus)?;
        let humidity = self.reader.measure_humidity(&mut self.bus)?;

        Ok(Reading {
            timestamp: unix_timestamp(),
            address,
            temperature,
            humidity,
        })
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Everything one poll cycle needs, assembled once from the configuration.
pub struct StorageMonitor<B, D> {
    registry: SensorRegistry,
    aggregator: BatchAggregator<B, D>,
    evaluator: ThresholdEvaluator,
    dispatcher: DispatchCoordinator,
}

/// What a finished cycle produced.
#[derive(Debug)]
pub struct CycleSummary {
    pub batch: Batch,
    pub indicator: IndicatorState,
    pub report: DispatchReport,
}

impl<B: BusIo, D: DelayNs> StorageMonitor<B, D> {
    pub fn new(
        registry: SensorRegistry,
        aggregator: BatchAggregator<B, D>,
        evaluator: ThresholdEvaluator,
        dispatcher: DispatchCoordinator,
    ) -> Self {
        Self {
            registry,
            aggregator,
            evaluator,
            dispatcher,
        }
    }

    /// Wires the pipeline from `config` around an already opened bus and resets the sensors.
    pub fn from_config(config: &Config, bus: B, delay: D) -> anyhow::Result<Self> {
        let mux = MuxController::new(config.sensors.mux1_addr, config.sensors.mux2_addr);
        let mut aggregator = BatchAggregator::new(bus, mux, delay);
        aggregator.soft_reset();

        let registry = config.registry();
        info!(
            "Monitoring {} sensors: {:?}",
            registry.len(),
            registry.iter().map(|a| a.get()).collect::<Vec<_>>()
        );

        Ok(Self::new(
            registry,
            aggregator,
            ThresholdEvaluator::new(config.leds.humidity_threshold, config.leds.count),
            DispatchCoordinator::from_config(config)?,
        ))
    }

    /// One complete cycle. Only a fatal sink error is returned.
    pub fn run_cycle(&mut self) -> Result<CycleSummary, DispatchError> {
        let batch = self.aggregator.poll_all(&self.registry);
        if batch.len() < self.registry.len() {
            warn!(
                "Collected {} of {} sensors this cycle",
                batch.len(),
                self.registry.len()
            );
        }

        let indicator = self.evaluator.evaluate(&batch);
        let report = self.dispatcher.dispatch(&batch, &indicator)?;

        Ok(CycleSummary {
            batch,
            indicator,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        drivers::bus_io::fake::{FakeBus, FakeDelay, Op},
        error::SinkError,
        sinks::traits::MockSink,
    };
    use pretty_assertions::assert_eq;

    const MUX1: u8 = 0x70;
    const MUX2: u8 = 0x71;

    fn aggregator(bus: FakeBus, delay: FakeDelay) -> BatchAggregator<FakeBus, FakeDelay> {
        BatchAggregator::new(bus, MuxController::new(MUX1, MUX2), delay)
    }

    #[test]
    fn polls_in_ascending_order_through_both_muxes() {
        let bus = FakeBus::new();
        // sensor 2: temperature, humidity; sensor 9: temperature, humidity
        bus.respond([0x66, 0x54])
            .respond([0x7C, 0x80])
            .respond([0x00, 0x00])
            .respond([0x00, 0x00]);
        let mut aggregator = aggregator(bus.clone(), FakeDelay::default());

        let batch = aggregator.poll_all(&SensorRegistry::from_mask(0x0102));

        let order: Vec<u8> = batch.iter().map(|r| r.address.get()).collect();
        assert_eq!(order, vec![2, 9]);
        assert!((batch.as_slice()[0].temperature - 23.389).abs() < 1e-3);
        assert!((batch.as_slice()[0].humidity - 54.791).abs() < 1e-3);
        assert_eq!(batch.as_slice()[1].temperature, -46.85);
        assert!(batch.iter().all(|r| r.timestamp > 0));

        assert_eq!(
            bus.ops(),
            vec![
                Op::Write(MUX1, vec![0x02]),
                Op::Write(0x40, vec![0xF3]),
                Op::Read(0x40, 2),
                Op::Write(0x40, vec![0xF5]),
                Op::Read(0x40, 2),
                Op::Write(MUX2, vec![0x01]),
                Op::Write(0x40, vec![0xF3]),
                Op::Read(0x40, 2),
                Op::Write(0x40, vec![0xF5]),
                Op::Read(0x40, 2),
            ]
        );
    }

    #[test]
    fn failed_sensor_is_skipped_and_cycle_continues() {
        let bus = FakeBus::new();
        for _ in 0..8 {
            bus.respond([0x66, 0x54]);
        }
        // third sensor's mux channel does not acknowledge
        bus.fail_write(MUX1, 0x04, 1);
        let mut aggregator = aggregator(bus.clone(), FakeDelay::default());

        let batch = aggregator.poll_all(&SensorRegistry::from_mask(0x001F));

        let order: Vec<u8> = batch.iter().map(|r| r.address.get()).collect();
        assert_eq!(order, vec![1, 2, 4, 5]);
    }

    #[test]
    fn total_settle_time_is_bounded_by_registry_size() {
        let bus = FakeBus::new();
        for _ in 0..6 {
            bus.respond([0x40, 0x00]);
        }
        let delay = FakeDelay::default();
        let mut aggregator = aggregator(bus, delay.clone());

        aggregator.poll_all(&SensorRegistry::from_mask(0x0007));

        assert_eq!(delay.waits_ms(), vec![86, 30, 86, 30, 86, 30]);
        assert!(delay.waits_ms().iter().sum::<u64>() <= (86 + 30) * 3);
    }

    #[test]
    fn soft_reset_failure_is_swallowed() {
        let bus = FakeBus::new();
        bus.fail_write(0x40, 0xFE, 1);
        let mut aggregator = aggregator(bus.clone(), FakeDelay::default());

        aggregator.soft_reset();
        assert_eq!(bus.ops(), vec![Op::Write(0x40, vec![0xFE])]);
    }

    fn counting_sink(name: &'static str, calls: usize) -> Box<MockSink> {
        let mut sink = MockSink::new();
        sink.expect_name().return_const(name);
        sink.expect_publish().times(calls).returning(|_, _| Ok(()));
        Box::new(sink)
    }

    #[test]
    fn cycle_with_one_broken_sensor_still_dispatches() {
        let bus = FakeBus::new();
        // slots 1, 2, 5, 6, 10; slot 5 never reaches the read phase
        for humidity_msb in [0x20, 0x20, 0xA0, 0xA0] {
            bus.respond([0x66, 0x54]).respond([humidity_msb, 0x00]);
        }
        bus.fail_write(MUX1, 0x10, 1);

        let mut telemetry = MockSink::new();
        telemetry.expect_name().return_const("telemetry");
        telemetry
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(SinkError::Status(503)));

        let dispatcher = DispatchCoordinator::new()
            .with_indicator(counting_sink("indicator", 1))
            .with_telemetry(Box::new(telemetry))
            .with_log(counting_sink("log", 1));

        let mut monitor = StorageMonitor::new(
            SensorRegistry::from_mask(0b10_0011_0011),
            aggregator(bus, FakeDelay::default()),
            ThresholdEvaluator::new(60.0, 4),
            dispatcher,
        );

        let summary = monitor.run_cycle().unwrap();

        let order: Vec<u8> = summary.batch.iter().map(|r| r.address.get()).collect();
        assert_eq!(order, vec![1, 2, 6, 10]);
        assert_eq!(summary.report.delivered, vec!["indicator", "log"]);
        assert_eq!(summary.report.failed.len(), 1);
        // humidity 0xA000 ~ 72 %RH on sensors 6 and 10 -> channel 2 twice
        assert_eq!(summary.indicator.as_slice(), &[0, 0, 2, 0]);
    }

    #[test]
    fn fatal_sink_error_fails_only_this_cycle() {
        let bus = FakeBus::new();
        for _ in 0..2 {
            bus.respond([0x66, 0x54]).respond([0x20, 0x00]);
        }

        let mut indicator = MockSink::new();
        indicator.expect_name().return_const("indicator");
        let mut calls = 0;
        indicator.expect_publish().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(SinkError::ResourceUnavailable("no dma".into()))
            } else {
                Ok(())
            }
        });

        let mut monitor = StorageMonitor::new(
            SensorRegistry::from_mask(0x0001),
            aggregator(bus, FakeDelay::default()),
            ThresholdEvaluator::new(60.0, 4),
            DispatchCoordinator::new().with_indicator(Box::new(indicator)),
        );

        assert!(monitor.run_cycle().is_err());
        assert!(monitor.run_cycle().is_ok());
    }
}
