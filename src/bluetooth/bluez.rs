/// BlueZ backend for the Central / SensorLink seams
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Uuid};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::time::{sleep, Duration, Instant};

use super::{Central, NotificationStream, SensorLink};
use crate::error::BridgeError;

const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Disconnect failures are logged and otherwise ignored; returns whether it went through
fn note_disconnect(address: Address, result: bluer::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("Disconnect from {} failed: {}", address, e);
            false
        }
    }
}

pub struct BluerCentral {
    // Keeps the D-Bus connection alive for the adapter
    _session: bluer::Session,
    adapter: Adapter,
    services_timeout: Duration,
}

impl BluerCentral {
    /// Open a Bluetooth session on the default adapter and power it on
    pub async fn new(services_timeout: Duration) -> Result<Self, BridgeError> {
        // Initialize Bluetooth session
        let session = match bluer::Session::new().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create Bluetooth session: {}", e);
                return Err(e.into());
            }
        };

        // Get the default Bluetooth adapter
        let adapter = match session.default_adapter().await {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Failed to get default Bluetooth adapter: {}", e);
                return Err(e.into());
            }
        };

        // Ensure Bluetooth adapter is powered on
        if let Err(e) = adapter.set_powered(true).await {
            error!("Failed to power on adapter: {}", e);
            return Err(e.into());
        }

        info!("Using Bluetooth adapter {}", adapter.name());

        Ok(BluerCentral {
            _session: session,
            adapter,
            services_timeout,
        })
    }

    /// Log a device event and report whether it is a live advertisement of the target
    async fn advertises_name(&self, address: Address, name: &str) -> bool {
        let device = match self.adapter.device(address) {
            Ok(device) => device,
            Err(_) => return false,
        };

        let advertised = device.name().await.ok().flatten();
        let rssi = device.rssi().await.ok().flatten();
        debug!(
            "{} RSSI: {:?} name: {:?}",
            address,
            rssi,
            advertised.as_deref()
        );

        super::scanner::is_live_match(advertised.as_deref(), rssi, name)
    }
}

#[async_trait]
impl Central for BluerCentral {
    async fn discover(&self, name: &str, window: Duration) -> Result<Option<Address>, BridgeError> {
        // Configure discovery filter for Low Energy devices only
        let filter = bluer::DiscoveryFilter {
            transport: bluer::DiscoveryTransport::Le, // Bluetooth Low Energy only
            duplicate_data: false,                    // Filter out duplicate advertisements
            ..Default::default()
        };

        // Apply the discovery filter (warn if it fails, but continue)
        if let Err(e) = self.adapter.set_discovery_filter(filter).await {
            warn!("Failed to set discovery filter: {}", e);
        }

        // Discovery stops when the stream is dropped. Property changes are
        // re-emitted as DeviceAdded so a name or RSSI that arrives late is seen.
        let events = self.adapter.discover_devices_with_changes().await?;
        tokio::pin!(events);

        let deadline = sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return Ok(None),
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        if self.advertises_name(address, name).await {
                            info!("Found {} at {}", name, address);
                            return Ok(Some(address));
                        }
                    }
                    Some(_) => {}
                    None => {
                        warn!("Discovery stream ended early");
                        return Ok(None);
                    }
                },
            }
        }
    }

    async fn connect(&self, address: Address) -> Result<Box<dyn SensorLink>, BridgeError> {
        let device = self.adapter.device(address)?;

        if !device.is_connected().await? {
            device
                .connect()
                .await
                .map_err(|e| BridgeError::Connect(format!("{}: {}", address, e)))?;
        }
        info!("Connected to {}", address);

        // GATT services are resolved asynchronously after the link comes up
        let deadline = Instant::now() + self.services_timeout;
        while !device.is_services_resolved().await? {
            if Instant::now() >= deadline {
                note_disconnect(address, device.disconnect().await);
                return Err(BridgeError::Connect(format!(
                    "{}: services not resolved within {:?}",
                    address, self.services_timeout
                )));
            }
            sleep(SERVICES_POLL_INTERVAL).await;
        }

        Ok(Box::new(BluerLink { device }))
    }
}

pub struct BluerLink {
    device: Device,
}

impl BluerLink {
    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, BridgeError> {
        for service in self.device.services().await? {
            for characteristic in service.characteristics().await? {
                if characteristic.uuid().await? == uuid {
                    return Ok(characteristic);
                }
            }
        }
        Err(BridgeError::CharacteristicNotFound(uuid))
    }
}

#[async_trait]
impl SensorLink for BluerLink {
    fn address(&self) -> Address {
        self.device.address()
    }

    async fn services(&self) -> Result<Vec<Uuid>, BridgeError> {
        let mut uuids = Vec::new();
        for service in self.device.services().await? {
            uuids.push(service.uuid().await?);
        }
        Ok(uuids)
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, BridgeError> {
        Ok(self.characteristic(characteristic).await?.read().await?)
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), BridgeError> {
        Ok(self.characteristic(characteristic).await?.write(value).await?)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, BridgeError> {
        let notifications = self.characteristic(characteristic).await?.notify().await?;
        Ok(Box::pin(notifications))
    }

    async fn is_connected(&self) -> bool {
        self.device.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) {
        note_disconnect(self.device.address(), self.device.disconnect().await);
    }
}
