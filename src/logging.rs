//! Process log bootstrap.

use std::fs::{self, OpenOptions};

use anyhow::{Context, Result, anyhow};
use log::LevelFilter;
use syslog::{BasicLogger, Facility, Formatter3164};

use crate::{cli::LogTarget, config::Config};

/// Installs the global logger for `target` at the configured level.
pub fn init_log(target: LogTarget, config: &Config) -> Result<()> {
    let level = config.level_filter()?;
    match target {
        LogTarget::Syslog => init_syslog(level),
        LogTarget::Stderr => env_logger::Builder::new()
            .filter_level(level)
            .format_timestamp_secs()
            .try_init()
            .map_err(|e| anyhow!("{e}")),
        LogTarget::File => {
            fs::create_dir_all(&config.configuration.log_directory).with_context(|| {
                format!(
                    "Failed to create log directory {}",
                    config.configuration.log_directory.display()
                )
            })?;
            let path = config.application_log_path();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;

            env_logger::Builder::new()
                .filter_level(level)
                .format_timestamp_secs()
                .target(env_logger::Target::Pipe(Box::new(file)))
                .try_init()
                .map_err(|e| anyhow!("{e}"))
        }
    }
}

fn init_syslog(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: "sht21pid".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}
