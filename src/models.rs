use std::fmt;

use log::{info, warn};
use tokio::sync::watch;

use crate::utils::to_hex;

/// Lowest firmware that reports heading, pitch, roll and calibration.
pub const ATTITUDE_MIN_FIRMWARE: f64 = 1.25;
/// Lowest firmware whose serial number characteristic is binary.
pub const HEX_SERIAL_MIN_FIRMWARE: f64 = 1.27;

/// Attitude fields, only reported by firmware >= 1.25
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    /// Degrees in [0, 360)
    pub heading: f64,
    pub pitch: f64,
    /// Degrees in (-180, 180]
    pub roll: f64,
    /// Percent
    pub calibration: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Degrees relative to the bow
    pub apparent_wind_angle: f64,
    /// Knots
    pub apparent_wind_speed: f64,
    pub attitude: Option<Attitude>,
}

/// What the connected firmware can do, derived once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub attitude: bool,
    pub hex_serial: bool,
}

impl Capabilities {
    pub fn for_firmware(version: f64) -> Self {
        Capabilities {
            attitude: version >= ATTITUDE_MIN_FIRMWARE,
            hex_serial: version >= HEX_SERIAL_MIN_FIRMWARE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub firmware_version: f64,
    pub serial_number: String,
    pub capabilities: Capabilities,
}

impl DeviceIdentity {
    /// Build the identity from the raw firmware and serial characteristic values
    ///
    /// The firmware value is ASCII text such as `1.27`, possibly NUL padded.
    /// Returns None when it does not parse as a number.
    pub fn from_raw(firmware: &[u8], serial: &[u8]) -> Option<Self> {
        let firmware_version = parse_firmware_version(firmware)?;
        let capabilities = Capabilities::for_firmware(firmware_version);

        let serial_number = if capabilities.hex_serial {
            to_hex(serial)
        } else {
            serial.iter().map(|&b| b as char).collect()
        };

        Some(DeviceIdentity {
            firmware_version,
            serial_number,
            capabilities,
        })
    }
}

fn parse_firmware_version(raw: &[u8]) -> Option<f64> {
    let text: String = raw.iter().map(|&b| b as char).collect();
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Connection lifecycle. Only moves forward, any failure resets to Disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Subscribing,
    Streaming,
}

impl ConnectionState {
    pub fn successor(self) -> Option<ConnectionState> {
        match self {
            ConnectionState::Disconnected => Some(ConnectionState::Scanning),
            ConnectionState::Scanning => Some(ConnectionState::Connecting),
            ConnectionState::Connecting => Some(ConnectionState::Subscribing),
            ConnectionState::Subscribing => Some(ConnectionState::Streaming),
            ConnectionState::Streaming => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Scanning => "Scanning",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Subscribing => "Subscribing",
            ConnectionState::Streaming => "Streaming",
        };
        f.write_str(name)
    }
}

/// Single writer for the current ConnectionState.
///
/// The only mutations are `advance` (one step forward) and `reset`, so the
/// state can never skip a stage or move backwards except to Disconnected.
#[derive(Debug)]
pub struct ConnectionTracker {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        ConnectionTracker { tx }
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to the next lifecycle stage and return it
    pub fn advance(&self) -> ConnectionState {
        let current = self.current();
        match current.successor() {
            Some(next) => {
                info!("state: {} -> {}", current, next);
                self.tx.send_replace(next);
                next
            }
            None => {
                warn!("state: already {}, ignoring advance", current);
                current
            }
        }
    }

    /// Unconditionally return to Disconnected. Idempotent.
    pub fn reset(&self) {
        let previous = self.tx.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            info!("state: {} -> {}", previous, ConnectionState::Disconnected);
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
