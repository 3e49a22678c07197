/// Discovery loop for the OpenWind sensor
use bluer::Address;
use log::{debug, info};
use tokio::time::Duration;

use super::Central;
use crate::error::BridgeError;

/// Advertised name must equal the target exactly
pub fn matches_target(advertised: Option<&str>, target: &str) -> bool {
    advertised == Some(target)
}

/// A name match only counts while the device is actually advertising
///
/// BlueZ keeps previously seen devices around with their last known name, but
/// only reports an RSSI for devices heard during the current discovery.
pub fn is_live_match(advertised: Option<&str>, rssi: Option<i16>, target: &str) -> bool {
    rssi.is_some() && matches_target(advertised, target)
}

/// Scan in fixed windows until a device advertising `name` shows up
///
/// There is no attempt limit: the sensor is expected to be powered on and in
/// range eventually. Callers cancel by dropping the future.
///
/// # Arguments
/// * `central` - BLE backend to scan with
/// * `name` - Advertised device name to look for
/// * `window` - Duration of each scan
///
/// # Returns
/// The address of the matching device, or the backend error that stopped scanning
pub async fn find_device<C>(central: &C, name: &str, window: Duration) -> Result<Address, BridgeError>
where
    C: Central + ?Sized,
{
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        debug!("Scan {} for '{}' ({:?} window)", attempt, name, window);

        if let Some(address) = central.discover(name, window).await? {
            info!("Discovered {} at {} after {} scan(s)", name, address, attempt);
            return Ok(address);
        }

        info!("{} not found, scanning again", name);
    }
}
