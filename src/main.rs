//! DNS Switcheroo
//!
//! Command line entry point: parses the configuration, then answers DNS
//! queries over UDP until interrupted.

use clap::Parser;
use log::info;
use tokio::signal;

use dns_switcheroo::{
    config::{Cli, ServerConfig},
    errors::DnsError,
    handlers::run_udp_server,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DnsError> {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let config = ServerConfig::from_cli(Cli::parse())?;

    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = shutdown_signal => Ok(()),
        res = run_udp_server(config) => res,
    }
}
