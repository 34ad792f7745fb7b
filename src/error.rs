//! Error taxonomy shared by the acquisition pipeline and its sinks.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::dispatch::DispatchReport;

/// Failure on the shared two-wire bus.
///
/// Every hardware operation is attempted exactly once; the caller decides
/// whether to skip the sensor or abort.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("cannot open bus {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("write to 0x{addr:02X} failed: {reason}")]
    Write { addr: u8, reason: String },

    #[error("read from 0x{addr:02X} failed: {reason}")]
    Read { addr: u8, reason: String },

    #[error("multiplexer channel {0} is outside 0..=16")]
    InvalidChannel(u8),
}

/// Missing or invalid configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found in any standard location")]
    NotFound,

    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse YAML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("unsupported config version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of a single output sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("telemetry request failed: {0}")]
    Http(String),

    #[error("telemetry endpoint answered with status {0}")]
    Status(u16),

    #[error("indicator render failed: {0}")]
    Render(String),

    /// The sink's hardware context could not be acquired at all.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
}

impl SinkError {
    /// Whether this error should end the current cycle's dispatch with a failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::ResourceUnavailable(_))
    }
}

/// Escapes the dispatch boundary only for unrecoverable resource errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// `report` holds what every other sink did in the same dispatch,
    /// further fatal errors included.
    #[error("sink '{sink}' failed fatally: {source}")]
    Fatal {
        sink: &'static str,
        #[source]
        source: SinkError,
        report: DispatchReport,
    },
}
