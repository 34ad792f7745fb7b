use std::fs::File;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::info;

use sht21pid::{application::Application, cli::Cli, config::Config, logging::init_log};

const DAEMON_OUTPUT: &str = "/var/tmp/sht21pid.log";

fn into_daemon() -> Result<()> {
    File::create(DAEMON_OUTPUT)
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // a bad config stops us before any bus or LED access
    let config = Config::load(cli.config.clone()).context("Failed to load configuration")?;

    // fork before the runtime spawns its threads
    if cli.daemonize {
        into_daemon()?;
    }

    init_log(cli.log_target, &config)?;
    info!("sht21pid {} starting", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let app = Application::builder()
        .with_config(config)
        .with_mode(cli.mode())
        .build()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(app.run())
}
