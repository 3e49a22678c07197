//! In-memory stand-ins for the BLE stack, shared by session and supervisor tests
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bluer::{Address, Uuid};
use futures_util::stream::{self, StreamExt};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration, Instant};

use super::{
    NotificationStream, SensorLink, FIRMWARE_CHARACTERISTIC, SERIAL_CHARACTERISTIC,
};
use crate::error::BridgeError;

pub const FAKE_ADDRESS: Address = Address([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]);

/// Observations a test can make after the link has been moved into a session
#[derive(Debug)]
pub struct LinkRecord {
    pub writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    pub disconnects: AtomicUsize,
    pub connected: AtomicBool,
    pub disconnected_at: Mutex<Option<Instant>>,
}

pub type RecordHandle = Arc<LinkRecord>;

pub struct FakeLink {
    pub firmware: Option<Vec<u8>>,
    pub serial: Option<Vec<u8>>,
    pub fail_subscribe: bool,
    notifications: Mutex<Option<NotificationStream>>,
    record: RecordHandle,
}

impl FakeLink {
    fn with_stream(firmware: &str, notifications: NotificationStream) -> (Self, RecordHandle) {
        let record = Arc::new(LinkRecord {
            writes: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
            disconnected_at: Mutex::new(None),
        });
        let link = FakeLink {
            firmware: Some(firmware.as_bytes().to_vec()),
            serial: Some(b"OW-0001".to_vec()),
            fail_subscribe: false,
            notifications: Mutex::new(Some(notifications)),
            record: record.clone(),
        };
        (link, record)
    }

    /// Notification stream ends after `payloads`, as when the peer goes away
    pub fn finite(firmware: &str, payloads: Vec<Vec<u8>>) -> (Self, RecordHandle) {
        Self::with_stream(firmware, Box::pin(stream::iter(payloads)))
    }

    /// Notification stream stays open after `payloads`
    pub fn open_ended(firmware: &str, payloads: Vec<Vec<u8>>) -> (Self, RecordHandle) {
        Self::with_stream(
            firmware,
            Box::pin(stream::iter(payloads).chain(stream::pending())),
        )
    }
}

#[async_trait]
impl SensorLink for FakeLink {
    fn address(&self) -> Address {
        FAKE_ADDRESS
    }

    async fn services(&self) -> Result<Vec<Uuid>, BridgeError> {
        Ok(vec![Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb)])
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, BridgeError> {
        let value = if characteristic == FIRMWARE_CHARACTERISTIC {
            self.firmware.clone()
        } else if characteristic == SERIAL_CHARACTERISTIC {
            self.serial.clone()
        } else {
            None
        };
        value.ok_or(BridgeError::CharacteristicNotFound(characteristic))
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), BridgeError> {
        self.record
            .writes
            .lock()
            .unwrap()
            .push((characteristic, value.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, BridgeError> {
        if self.fail_subscribe {
            return Err(BridgeError::CharacteristicNotFound(characteristic));
        }
        self.notifications
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BridgeError::Subscription("already subscribed".into()))
    }

    async fn is_connected(&self) -> bool {
        self.record.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.record.connected.store(false, Ordering::SeqCst);
        self.record.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.record.disconnected_at.lock().unwrap() = Some(Instant::now());
    }
}

/// Collect every datagram already queued on `socket`
pub async fn datagrams(socket: &UdpSocket) -> Vec<String> {
    let mut received = Vec::new();
    let mut buf = [0u8; 512];
    while let Ok(Ok(n)) = timeout(Duration::from_millis(100), socket.recv(&mut buf)).await {
        received.push(String::from_utf8_lossy(&buf[..n]).into_owned());
    }
    received
}
