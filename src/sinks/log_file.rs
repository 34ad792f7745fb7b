use std::{
    fs::OpenOptions,
    io::{BufWriter, Write},
    path::PathBuf,
};

use log::info;

use super::traits::Sink;
use crate::{
    error::SinkError,
    sensors::{Batch, Reading},
    threshold::IndicatorState,
};

/// Appends one CSV-like line per reading to the data log.
///
/// The file is opened and closed on every publish.
#[derive(Debug, Clone)]
pub struct LogFileSink {
    path: PathBuf,
}

impl LogFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, batch: &Batch) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);
        for reading in batch {
            out.write_all(format_line(reading).as_bytes())?;
        }
        out.flush()
    }
}

/// `<timestamp>, <address>, <temperature>, <humidity>\n`
///
/// Values keep their decimal point even when integral (`20.0`, not `20`).
pub fn format_line(reading: &Reading) -> String {
    format!(
        "{}, {}, {:?}, {:?}\n",
        reading.timestamp, reading.address, reading.temperature, reading.humidity
    )
}

impl Sink for LogFileSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish(&mut self, batch: &Batch, _indicator: &IndicatorState) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }

        self.append(batch).map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!("Wrote {} readings to {}", batch.len(), self.path.display());
        Ok(())
    }
}
