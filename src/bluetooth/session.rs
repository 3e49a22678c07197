/// One connection to the sensor: identify, arm, stream
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::time::{interval, sleep, MissedTickBehavior};

use super::{
    NotificationStream, SensorLink, FIRMWARE_CHARACTERISTIC, MOTION_ENABLE_CHARACTERISTIC,
    MOTION_ENABLE_VALUE, SERIAL_CHARACTERISTIC, WIND_CHARACTERISTIC,
};
use crate::config::BridgeConfig;
use crate::decoder::decode_wind_data;
use crate::error::BridgeError;
use crate::models::{ConnectionState, ConnectionTracker, DeviceIdentity, SensorReading};
use crate::nmea::encode_reading;
use crate::sink::UdpSink;
use crate::supervisor::Shutdown;
use crate::utils::{format_datetime, format_elapsed};

/// How a session that got as far as streaming came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Link lost; a new discovery cycle is needed
    Disconnected,
    /// User requested termination
    Shutdown,
}

/// Owns one peripheral connection for its whole lifetime.
///
/// The session expects the tracker to be in `Connecting` when it is created
/// and advances it through `Subscribing` to `Streaming` itself.
pub struct DeviceSession<'a> {
    link: Box<dyn SensorLink>,
    tracker: &'a ConnectionTracker,
    sink: &'a mut UdpSink,
    config: &'a BridgeConfig,
    identity: Option<DeviceIdentity>,
    started_at: OffsetDateTime,
    samples: u64,
    skipped: u64,
    disconnected: bool,
}

impl<'a> DeviceSession<'a> {
    pub fn new(
        link: Box<dyn SensorLink>,
        tracker: &'a ConnectionTracker,
        sink: &'a mut UdpSink,
        config: &'a BridgeConfig,
    ) -> Self {
        DeviceSession {
            link,
            tracker,
            sink,
            config,
            identity: None,
            started_at: OffsetDateTime::now_utc(),
            samples: 0,
            skipped: 0,
            disconnected: false,
        }
    }

    /// Drive the session until the link drops, setup fails or shutdown is requested
    ///
    /// The link is always disconnected and the tracker reset before returning.
    pub async fn run(mut self, shutdown: &mut Shutdown) -> Result<SessionEnd, BridgeError> {
        info!(
            "Session with {} started at {}",
            self.link.address(),
            format_datetime(&self.started_at)
        );

        let result = self.drive(shutdown).await;
        self.close().await;
        result
    }

    async fn drive(&mut self, shutdown: &mut Shutdown) -> Result<SessionEnd, BridgeError> {
        let notifications = tokio::select! {
            _ = shutdown.triggered() => return Ok(SessionEnd::Shutdown),
            armed = self.setup() => armed?,
        };

        Ok(self.stream(notifications, shutdown).await)
    }

    async fn setup(&mut self) -> Result<NotificationStream, BridgeError> {
        match self.link.services().await {
            Ok(services) => {
                info!("Services:");
                for uuid in services {
                    info!("  {}", uuid);
                }
            }
            Err(e) => debug!("Could not list services: {}", e),
        }

        self.identify().await?;
        self.arm().await
    }

    /// Read firmware version and serial number
    ///
    /// # Returns
    /// The identity, or IdentityRead if either read fails or the firmware
    /// version is not a number
    pub async fn identify(&mut self) -> Result<DeviceIdentity, BridgeError> {
        let firmware = self.read_identity(FIRMWARE_CHARACTERISTIC).await?;
        let serial = self.read_identity(SERIAL_CHARACTERISTIC).await?;

        let identity =
            DeviceIdentity::from_raw(&firmware, &serial).ok_or_else(|| BridgeError::IdentityRead {
                uuid: FIRMWARE_CHARACTERISTIC,
                reason: format!(
                    "unparsable firmware version {:?}",
                    String::from_utf8_lossy(&firmware)
                ),
            })?;

        info!("Firmware Version: {}", identity.firmware_version);
        if identity.capabilities.hex_serial {
            info!("Serial number (hex): {}", identity.serial_number);
        } else {
            info!("Serial number: {}", identity.serial_number);
        }
        if !identity.capabilities.attitude {
            info!("Firmware reports wind only, heading output disabled");
        }

        self.identity = Some(identity.clone());
        Ok(identity)
    }

    async fn read_identity(&self, uuid: bluer::Uuid) -> Result<Vec<u8>, BridgeError> {
        self.link
            .read(uuid)
            .await
            .map_err(|e| BridgeError::IdentityRead {
                uuid,
                reason: e.to_string(),
            })
    }

    /// Enable motion output, let the sensor settle, then subscribe to wind data
    pub async fn arm(&mut self) -> Result<NotificationStream, BridgeError> {
        self.tracker.advance();

        self.link
            .write(MOTION_ENABLE_CHARACTERISTIC, &[MOTION_ENABLE_VALUE])
            .await
            .map_err(|e| BridgeError::Subscription(format!("motion enable write: {}", e)))?;

        sleep(self.config.settle_delay).await;

        let notifications = self
            .link
            .subscribe(WIND_CHARACTERISTIC)
            .await
            .map_err(|e| BridgeError::Subscription(format!("wind notify: {}", e)))?;

        self.tracker.advance();
        Ok(notifications)
    }

    /// Decode, encode and forward one payload
    ///
    /// A bad payload is logged and skipped, the connection stays up.
    pub async fn on_notification(&mut self, payload: &[u8]) {
        let state = self.tracker.current();
        if state != ConnectionState::Streaming {
            debug!("Dropping notification received while {}", state);
            return;
        }

        debug!("{}: {:02x?}", WIND_CHARACTERISTIC, payload);

        let capabilities = self
            .identity
            .as_ref()
            .map(|identity| identity.capabilities)
            .unwrap_or_default();

        let reading = match decode_wind_data(payload, capabilities) {
            Ok(reading) => reading,
            Err(e) => {
                self.skipped += 1;
                warn!("Skipping sample: {}", e);
                return;
            }
        };
        log_reading(&reading);

        let sentences = match encode_reading(&reading) {
            Ok(sentences) => sentences,
            Err(e) => {
                self.skipped += 1;
                error!("Failed to encode reading: {}", e);
                return;
            }
        };

        for sentence in &sentences {
            debug!("{}", sentence.trim_end());
            self.sink.send(sentence).await;
        }
        self.samples += 1;
    }

    /// Mark the link as lost. Returns false if it already was.
    pub fn on_disconnect(&mut self) -> bool {
        if self.disconnected {
            return false;
        }
        self.disconnected = true;
        info!(
            "OpenWind with address {} got disconnected!",
            self.link.address()
        );
        self.tracker.reset();
        true
    }

    async fn stream(
        &mut self,
        mut notifications: NotificationStream,
        shutdown: &mut Shutdown,
    ) -> SessionEnd {
        let mut liveness = interval(self.config.liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        liveness.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.triggered() => return SessionEnd::Shutdown,
                payload = notifications.next() => match payload {
                    Some(payload) => self.on_notification(&payload).await,
                    None => {
                        debug!("Notification stream closed");
                        self.on_disconnect();
                        return SessionEnd::Disconnected;
                    }
                },
                _ = liveness.tick() => {
                    if !self.link.is_connected().await {
                        self.on_disconnect();
                        return SessionEnd::Disconnected;
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        self.link.disconnect().await;
        self.tracker.reset();

        let elapsed = OffsetDateTime::now_utc() - self.started_at;
        info!(
            "Session with {} closed after {}: {} samples forwarded, {} skipped",
            self.link.address(),
            format_elapsed(elapsed),
            self.samples,
            self.skipped
        );
    }
}

fn log_reading(reading: &SensorReading) {
    debug!(
        "AWA: {:.1} AWS: {:.1}",
        reading.apparent_wind_angle, reading.apparent_wind_speed
    );
    if let Some(attitude) = &reading.attitude {
        debug!(
            "YAW: {:.1} PITCH: {:.1} ROLL: {:.1} CALIBRATION: {}",
            attitude.heading, attitude.pitch, attitude.roll, attitude.calibration
        );
    }
}
