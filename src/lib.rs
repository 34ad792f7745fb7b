//! # sht21pid
//!
//! A Linux daemon that watches storage humidity through up to sixteen SHT21
//! sensors sitting behind two bus multiplexers.
//!
//! ## Features
//!
//! - **Sequential polling**: one sensor at a time, ascending address order
//! - **Fault tolerance**: a sensor that fails is skipped for the cycle
//! - **Humidity indicator**: per-channel counts shown through a four-colour palette
//! - **Telemetry**: InfluxDB line protocol over HTTP
//! - **Data log**: append-only text file, one line per reading
//!
//! ## Architecture
//!
//! - [`StorageMonitor`](monitor::StorageMonitor) - one poll cycle end to end
//! - [`BatchAggregator`](monitor::BatchAggregator) - bus, multiplexers and sensor reads
//! - [`ThresholdEvaluator`](threshold::ThresholdEvaluator) - batch to indicator state
//! - [`DispatchCoordinator`](dispatch::DispatchCoordinator) - ordered fan-out to sinks
//! - [`Application`](application::Application) - scheduling and shutdown
//!
//! ## Example
//!
//! ```no_run
//! use sht21pid::{application::Application, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     Application::builder()
//!         .with_config(config)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

pub mod application;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod sensors;
pub mod sinks;
pub mod threshold;
