use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::application::RunMode;

/// sht21pid: storage humidity monitor for SHT21 sensors behind two bus multiplexers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: standard locations)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Run a single poll cycle and exit
    #[arg(long = "once", conflicts_with = "led_test")]
    pub once: bool,

    /// Show every palette colour on the indicator and exit
    #[arg(long = "led-test")]
    pub led_test: bool,

    /// Where process logs go
    #[arg(long = "log-target", value_enum, default_value_t = LogTarget::File)]
    pub log_target: LogTarget,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.led_test {
            RunMode::LedTest
        } else if self.once {
            RunMode::Once
        } else {
            RunMode::Daemon
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    /// `<log_directory>/sht21-application.log`
    File,
    Stderr,
    Syslog,
}
