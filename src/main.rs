mod bluetooth;
mod config;
mod decoder;
mod error;
mod models;
mod nmea;
mod sink;
mod supervisor;
mod utils;

use log::{error, info};
use tokio::time::sleep;

use bluetooth::bluez::BluerCentral;
use config::BridgeConfig;
use supervisor::{Shutdown, Supervisor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match BridgeConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (stop, mut shutdown) = Shutdown::new();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Program terminated by user. Exiting gracefully.");
                stop.send_replace(true);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                // Keep the trigger alive so shutdown is simply never requested
                std::future::pending::<()>().await;
            }
        }
    });

    // The adapter may not be up yet when the service starts
    let central = loop {
        let attempt = tokio::select! {
            _ = shutdown.triggered() => return Ok(()),
            central = BluerCentral::new(config.services_timeout) => central,
        };
        match attempt {
            Ok(central) => break central,
            Err(e) => {
                error!("Bluetooth unavailable, retrying: {}", e);
                tokio::select! {
                    _ = shutdown.triggered() => return Ok(()),
                    _ = sleep(config.error_backoff) => {}
                }
            }
        }
    };

    Supervisor::new(central, config, shutdown).run().await;

    Ok(())
}
