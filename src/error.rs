use std::net::SocketAddr;

use bluer::Uuid;
use thiserror::Error;

/// Errors raised anywhere below the supervisor.
///
/// None of these terminate the process: per-sample errors are swallowed by
/// the session, setup errors end the session and the supervisor retries.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed payload: expected at least {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },

    #[error("Invalid NMEA sentence (no '$' or '!' delimiter): {0:?}")]
    InvalidSentence(String),

    #[error("Failed to read identity characteristic {uuid}: {reason}")]
    IdentityRead { uuid: Uuid, reason: String },

    #[error("Failed to arm wind notifications: {0}")]
    Subscription(String),

    #[error("Failed to send datagram to {target}: {source}")]
    Transport {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
