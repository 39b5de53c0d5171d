//! A forgiving SMTP sink for exercising outbound mail code in integration tests.
//!
//! Every command gets `250 Ok`, `DATA` blocks are swallowed and acknowledged as
//! queued, and nothing is stored or delivered.

pub mod config;
pub mod smtp;
pub mod stats;

use acton_reactive::prelude::*;
use anyhow::Result;
use log::{error, info};

pub async fn run() -> Result<()> {
    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = match config::Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    info!("Starting mail-sink on {}", config.listen_address());

    let counter = stats::ConnectionCounter::new();
    let mut runtime = ActonApp::launch_async().await;

    let _smtp_listener =
        match smtp::SmtpListenerState::create(&mut runtime, &config, counter.clone()).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Could not start server: {:#}", e);
                runtime.shutdown_all().await.ok();
                return Err(e);
            }
        };
    let _stats_handle =
        match stats::StatsReporterState::create(&mut runtime, &config, counter).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("Could not start stats reporter: {:#}", e);
                runtime.shutdown_all().await.ok();
                return Err(e);
            }
        };

    // Wait for shutdown signal (SIGTERM/SIGINT)
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping listener...");

    runtime.shutdown_all().await?;
    info!("Shutdown complete");

    Ok(())
}
