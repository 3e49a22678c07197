/// Top-level discovery -> session -> retry loop
use log::{error, info};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::bluetooth::scanner::find_device;
use crate::bluetooth::session::{DeviceSession, SessionEnd};
use crate::bluetooth::Central;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::models::ConnectionTracker;
use crate::sink::UdpSink;

/// Receiving half of the user stop request
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns the trigger (send `true` to stop) and the handle
    pub fn new() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Trigger dropped: the final value is all there will ever be
                if *self.rx.borrow() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

pub struct Supervisor<C> {
    central: C,
    config: BridgeConfig,
    sink: UdpSink,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl<C: Central> Supervisor<C> {
    pub fn new(central: C, config: BridgeConfig, shutdown: Shutdown) -> Self {
        let sink = UdpSink::new(config.udp_target);
        Supervisor {
            central,
            config,
            sink,
            tracker: ConnectionTracker::new(),
            shutdown,
        }
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Run discovery and sessions until a stop is requested
    ///
    /// Only one session is ever live. After a disconnect the next discovery
    /// starts one retry interval later; after any error, one error backoff later.
    pub async fn run(mut self) {
        info!(
            "Starting OpenWind bridge, NMEA output to {}",
            self.sink.target()
        );

        let mut cycle: u64 = 0;
        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            cycle += 1;

            let backoff = match self.run_cycle().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Disconnected) => {
                    info!(
                        "Cycle {} ended with disconnect, rediscovering in {:?}",
                        cycle, self.config.retry_interval
                    );
                    self.config.retry_interval
                }
                Err(e) => {
                    error!("Something went wrong, retrying: {}", e);
                    self.config.error_backoff
                }
            };
            self.tracker.reset();

            tokio::select! {
                _ = self.shutdown.triggered() => break,
                _ = sleep(backoff) => {}
            }
        }

        self.tracker.reset();
        info!("Stopping...");
    }

    async fn run_cycle(&mut self) -> Result<SessionEnd, BridgeError> {
        self.tracker.advance();
        let address = tokio::select! {
            _ = self.shutdown.triggered() => return Ok(SessionEnd::Shutdown),
            found = find_device(&self.central, &self.config.device_name, self.config.scan_window) => found?,
        };

        self.tracker.advance();
        let link = tokio::select! {
            _ = self.shutdown.triggered() => return Ok(SessionEnd::Shutdown),
            link = self.central.connect(address) => link?,
        };

        let session = DeviceSession::new(link, &self.tracker, &mut self.sink, &self.config);
        session.run(&mut self.shutdown).await
    }
}
