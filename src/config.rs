use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use log::info;

use crate::error::BridgeError;

pub const DEFAULT_DEVICE_NAME: &str = "OpenWind";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub device_name: String,
    pub udp_target: SocketAddr,
    pub scan_window: Duration,
    pub retry_interval: Duration,
    pub error_backoff: Duration,
    pub settle_delay: Duration,
    pub liveness_interval: Duration,
    pub services_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            udp_target: SocketAddr::from(([127, 0, 0, 1], 2000)),
            scan_window: Duration::from_secs(5),
            retry_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
            liveness_interval: Duration::from_secs(1),
            services_timeout: Duration::from_secs(10),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Result<Self, BridgeError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Apply `OPENWIND_DEVICE_NAME` / `NMEA_UDP_TARGET` overrides on top of the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BridgeConfig::default();

        if let Some(name) = lookup("OPENWIND_DEVICE_NAME") {
            let name = name.trim();
            if name.is_empty() {
                return Err(BridgeError::Config(
                    "OPENWIND_DEVICE_NAME is set but empty".into(),
                ));
            }
            config.device_name = name.to_string();
        }

        if let Some(target) = lookup("NMEA_UDP_TARGET") {
            config.udp_target = target.trim().parse().map_err(|e| {
                BridgeError::Config(format!("Invalid NMEA_UDP_TARGET '{}': {}", target, e))
            })?;
        }

        info!(
            "Looking for '{}', forwarding NMEA to {}",
            config.device_name, config.udp_target
        );

        Ok(config)
    }
}
