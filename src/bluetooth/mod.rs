pub mod bluez;
pub mod scanner;
pub mod session;
#[cfg(test)]
pub mod testing;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bluer::{Address, Uuid};
use futures_util::Stream;

use crate::error::BridgeError;

// OpenWind GATT characteristics
pub const WIND_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000cc91_0000_1000_8000_00805f9b34fb);
pub const MOTION_ENABLE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000aa82_0000_1000_8000_00805f9b34fb);
pub const FIRMWARE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb); // Firmware Revision String
pub const SERIAL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a25_0000_1000_8000_00805f9b34fb); // Serial Number String

/// Value written to the motion enable characteristic to start attitude output
pub const MOTION_ENABLE_VALUE: u8 = 0x2C;

pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Scanning and connecting side of the BLE stack
#[async_trait]
pub trait Central: Send + Sync {
    /// Scan for one window; return the first device advertising `name`
    async fn discover(&self, name: &str, window: Duration) -> Result<Option<Address>, BridgeError>;

    async fn connect(&self, address: Address) -> Result<Box<dyn SensorLink>, BridgeError>;
}

/// An open GATT connection to the sensor
#[async_trait]
pub trait SensorLink: Send + Sync {
    fn address(&self) -> Address;

    /// UUIDs of the services the peripheral exposes, for diagnostics
    async fn services(&self) -> Result<Vec<Uuid>, BridgeError>;

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, BridgeError>;

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), BridgeError>;

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, BridgeError>;

    async fn is_connected(&self) -> bool;

    async fn disconnect(&self);
}
