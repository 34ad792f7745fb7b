//! Application entry point: the poll scheduler and its blocking worker.

use anyhow::{Context, Result, anyhow};
use embedded_hal::delay::DelayNs;
use linux_embedded_hal::Delay;
use log::{error, info, warn};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc::{self, Receiver, Sender, error::TrySendError},
    task,
    time::{MissedTickBehavior, interval},
};

use crate::{
    config::Config,
    dispatch::DispatchReport,
    drivers::{BusIo, open_bus},
    error::DispatchError,
    monitor::StorageMonitor,
    sinks::IndicatorSink,
    threshold::IndicatorState,
};

/// What the process does once it is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Poll every `poll_interval` seconds until SIGINT or SIGTERM.
    Daemon,
    /// One poll cycle, then exit.
    Once,
    /// Show every palette colour on the indicator, then exit.
    LedTest,
}

/// Owns the configuration and drives the poll loop.
///
/// All hardware and HTTP work happens on a single blocking worker thread;
/// the async side only schedules ticks and waits for shutdown.
///
/// # Example
///
/// ```no_run
/// use sht21pid::{application::{Application, RunMode}, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load(None)?;
/// Application::builder()
///     .with_config(config)
///     .with_mode(RunMode::Once)
///     .build()?
///     .run()
///     .await
/// # }
/// ```
pub struct Application {
    config: Config,
    mode: RunMode,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub async fn run(self) -> Result<()> {
        match self.mode {
            RunMode::LedTest => self.led_test().await,
            RunMode::Once | RunMode::Daemon => self.poll().await,
        }
    }

    async fn poll(self) -> Result<()> {
        // capacity 1: a tick that arrives while a cycle is still running is dropped
        let (tx, rx) = mpsc::channel::<()>(1);
        let config = self.config.clone();
        let worker = task::spawn_blocking(move || run_worker(&config, rx));

        let scheduled = match self.mode {
            RunMode::Once => {
                let sent = tx.send(()).await;
                drop(tx);
                sent.map_err(|_| anyhow!("Poll worker exited before the first cycle"))
            }
            _ => schedule(&self.config, tx).await,
        };

        // the worker's own error says more than a closed channel
        let worker_result = worker.await.context("Poll worker panicked")?;
        worker_result.and(scheduled)
    }

    async fn led_test(self) -> Result<()> {
        let leds = self.config.leds.clone();
        task::spawn_blocking(move || {
            let state = IndicatorState::from((0..leds.count).map(|i| i % 4).collect::<Vec<_>>());
            info!("LED test: {:?}", state.as_slice());
            IndicatorSink::from_config(&leds)
                .show(&state)
                .context("LED test failed")
        })
        .await
        .context("LED test worker panicked")?
    }
}

/// Sends a tick every poll interval until a shutdown signal arrives.
///
/// Dropping `tx` on return lets the worker finish its current cycle and exit.
async fn schedule(config: &Config, tx: Sender<()>) -> Result<()> {
    let mut ticker = interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

    info!("Polling every {:?}", config.poll_interval());
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for shutdown signal")?;
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            _instant = ticker.tick() => match tx.try_send(()) {
                Ok(()) => {}
                Err(TrySendError::Full(())) => {
                    warn!("Previous cycle still running, skipping this tick");
                }
                Err(TrySendError::Closed(())) => {
                    error!("Poll worker stopped unexpectedly");
                    break;
                }
            },
        }
    }
    Ok(())
}

/// Opens the bus, assembles the pipeline and runs one cycle per tick.
///
/// The monitor (bus handle and HTTP client included) lives and dies on this thread.
fn run_worker(config: &Config, rx: Receiver<()>) -> Result<()> {
    let bus = open_bus(config.sensors.bus).context("Failed to open sensor bus")?;
    let mut monitor = StorageMonitor::from_config(config, bus, Delay)
        .context("Failed to assemble monitor")?;

    let cycles = drive(&mut monitor, rx);
    info!("Poll worker stopped after {cycles} cycles, releasing bus");
    Ok(())
}

/// Runs a cycle for every tick until the sender goes away. Returns the cycle count.
fn drive<B: BusIo, D: DelayNs>(
    monitor: &mut StorageMonitor<B, D>,
    mut rx: Receiver<()>,
) -> usize {
    let mut cycles = 0;
    while rx.blocking_recv().is_some() {
        cycles += 1;
        match monitor.run_cycle() {
            Ok(summary) if summary.report.is_clean() => {
                info!("Cycle {cycles}: {} readings", summary.batch.len());
            }
            Ok(summary) => warn!(
                "Cycle {cycles}: {} readings, failed sinks: {:?}",
                summary.batch.len(),
                failed_sinks(&summary.report)
            ),
            Err(DispatchError::Fatal {
                sink,
                source,
                report,
            }) => error!(
                "Cycle {cycles} aborted by '{sink}': {source}; also failed: {:?}",
                failed_sinks(&report)
            ),
        }
    }
    cycles
}

fn failed_sinks(report: &DispatchReport) -> Vec<&'static str> {
    report.failed.iter().map(|(name, _)| *name).collect()
}

pub struct ApplicationBuilder {
    config: Option<Config>,
    mode: RunMode,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config: None,
            mode: RunMode::Daemon,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<Application> {
        let config = self
            .config
            .ok_or_else(|| anyhow!("Configuration is required"))?;

        Ok(Application {
            config,
            mode: self.mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::DispatchCoordinator,
        drivers::{
            MuxController,
            bus_io::fake::{FakeBus, FakeDelay},
        },
        monitor::BatchAggregator,
        sensors::SensorRegistry,
        sinks::traits::MockSink,
        threshold::ThresholdEvaluator,
    };

    #[test]
    fn builder_requires_config() {
        assert!(Application::builder().build().is_err());

        let app = Application::builder()
            .with_config(crate::config::tests::sample())
            .with_mode(RunMode::Once)
            .build()
            .unwrap();
        assert_eq!(app.mode(), RunMode::Once);
    }

    #[test]
    fn worker_runs_one_cycle_per_tick_and_stops_when_sender_drops() {
        let bus = FakeBus::new();
        for _ in 0..2 {
            bus.respond([0x66, 0x54]).respond([0x7C, 0x80]);
        }

        let mut log = MockSink::new();
        log.expect_name().return_const("log");
        log.expect_publish().times(2).returning(|_, _| Ok(()));

        let mut monitor = StorageMonitor::new(
            SensorRegistry::from_mask(0x0001),
            BatchAggregator::new(bus, MuxController::new(0x70, 0x71), FakeDelay::default()),
            ThresholdEvaluator::new(60.0, 4),
            DispatchCoordinator::new().with_log(Box::new(log)),
        );

        let (tx, rx) = mpsc::channel(1);
        let ticker = std::thread::spawn(move || {
            for _ in 0..2 {
                tx.blocking_send(()).unwrap();
            }
        });

        assert_eq!(drive(&mut monitor, rx), 2);
        ticker.join().unwrap();
    }

    #[test]
    fn fatal_cycle_does_not_stop_the_worker() {
        let bus = FakeBus::new();
        for _ in 0..2 {
            bus.respond([0x66, 0x54]).respond([0x7C, 0x80]);
        }

        let mut indicator = MockSink::new();
        indicator.expect_name().return_const("indicator");
        indicator
            .expect_publish()
            .times(2)
            .returning(|_, _| Err(crate::error::SinkError::ResourceUnavailable("busy".into())));

        let mut monitor = StorageMonitor::new(
            SensorRegistry::from_mask(0x0001),
            BatchAggregator::new(bus, MuxController::new(0x70, 0x71), FakeDelay::default()),
            ThresholdEvaluator::new(60.0, 4),
            DispatchCoordinator::new().with_indicator(Box::new(indicator)),
        );

        let (tx, rx) = mpsc::channel(2);
        tx.try_send(()).unwrap();
        tx.try_send(()).unwrap();
        drop(tx);

        assert_eq!(drive(&mut monitor, rx), 2);
    }

    #[cfg(not(feature = "ws281x"))]
    #[tokio::test]
    async fn led_test_renders_with_logging_driver() {
        let app = Application::builder()
            .with_config(crate::config::tests::sample())
            .with_mode(RunMode::LedTest)
            .build()
            .unwrap();
        app.run().await.unwrap();
    }
}
