/// OpenWind wind/attitude notification decoding
use crate::error::BridgeError;
use crate::models::{Attitude, Capabilities, SensorReading};

/// Minimum length of a wind characteristic notification
pub const PAYLOAD_LEN: usize = 12;

const WIND_ANGLE_SCALE: f64 = 0.1; // degrees per LSB
const WIND_SPEED_SCALE: f64 = 0.01; // knots per LSB
const ATTITUDE_SCALE: f64 = 1.0 / 16.0; // degrees per LSB
const HEADING_OFFSET: f64 = -90.0;

/// Decode an OpenWind wind characteristic notification
///
/// Payload layout (little-endian):
/// - Byte 0: Reserved
/// - Bytes 1-2: Apparent wind angle (unsigned, 0.1° resolution)
/// - Bytes 3-4: Apparent wind speed (unsigned, 0.01 kts resolution)
/// - Bytes 5-6: Heading (unsigned, 1/16° resolution, -90° offset)
/// - Bytes 7-8: Roll (signed, 1/16° resolution, sign inverted)
/// - Bytes 9-10: Pitch (signed, 1/16° resolution)
/// - Byte 11: Calibration status (%)
///
/// Bytes 5-11 are only decoded when the firmware reports attitude, otherwise
/// the reading carries no attitude at all.
///
/// # Arguments
/// * `data` - Raw notification bytes
/// * `capabilities` - Capabilities of the connected firmware
///
/// # Returns
/// The decoded reading, or MalformedPayload if fewer than 12 bytes arrived
pub fn decode_wind_data(
    data: &[u8],
    capabilities: Capabilities,
) -> Result<SensorReading, BridgeError> {
    if data.len() < PAYLOAD_LEN {
        return Err(BridgeError::MalformedPayload {
            expected: PAYLOAD_LEN,
            actual: data.len(),
        });
    }

    let apparent_wind_angle = u16::from_le_bytes([data[1], data[2]]) as f64 * WIND_ANGLE_SCALE;
    let apparent_wind_speed = u16::from_le_bytes([data[3], data[4]]) as f64 * WIND_SPEED_SCALE;

    let attitude = capabilities.attitude.then(|| decode_attitude(data));

    Ok(SensorReading {
        apparent_wind_angle,
        apparent_wind_speed,
        attitude,
    })
}

fn decode_attitude(data: &[u8]) -> Attitude {
    let heading = u16::from_le_bytes([data[5], data[6]]) as f64 * ATTITUDE_SCALE + HEADING_OFFSET;

    // Negate as integer so a zero roll stays +0.0
    let roll_raw = -(i16::from_le_bytes([data[7], data[8]]) as i32);
    let mut roll = roll_raw as f64 * ATTITUDE_SCALE;
    if roll >= 180.0 {
        roll -= 360.0;
    }

    let pitch = i16::from_le_bytes([data[9], data[10]]) as f64 * ATTITUDE_SCALE;

    Attitude {
        heading: heading.rem_euclid(360.0),
        pitch,
        roll,
        calibration: data[11],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: Capabilities = Capabilities {
        attitude: false,
        hex_serial: false,
    };
    const CURRENT: Capabilities = Capabilities {
        attitude: true,
        hex_serial: true,
    };

    fn payload(heading: u16, roll: i16, pitch: i16, calibration: u8) -> [u8; 12] {
        let mut data = [0u8; 12];
        data[1..3].copy_from_slice(&450u16.to_le_bytes());
        data[3..5].copy_from_slice(&1230u16.to_le_bytes());
        data[5..7].copy_from_slice(&heading.to_le_bytes());
        data[7..9].copy_from_slice(&roll.to_le_bytes());
        data[9..11].copy_from_slice(&pitch.to_le_bytes());
        data[11] = calibration;
        data
    }

    #[test]
    fn test_wind_only_on_legacy_firmware() {
        let data = [0x00, 0x64, 0x00, 0x05, 0x00, 0, 0, 0, 0, 0, 0, 0];
        let reading = decode_wind_data(&data, LEGACY).unwrap();
        assert!((reading.apparent_wind_angle - 10.0).abs() < 1e-9);
        assert!((reading.apparent_wind_speed - 0.05).abs() < 1e-9);
        assert!(reading.attitude.is_none());
    }

    #[test]
    fn test_attitude_present_on_current_firmware() {
        // heading 1440/16 - 90 = 0, roll -(-32)/16 = 2, pitch 48/16 = 3
        let data = payload(1440, -32, 48, 87);
        let reading = decode_wind_data(&data, CURRENT).unwrap();
        assert!((reading.apparent_wind_angle - 45.0).abs() < 1e-9);
        assert!((reading.apparent_wind_speed - 12.3).abs() < 1e-9);

        let attitude = reading.attitude.expect("attitude decoded");
        assert_eq!(attitude.heading, 0.0);
        assert_eq!(attitude.roll, 2.0);
        assert_eq!(attitude.pitch, 3.0);
        assert_eq!(attitude.calibration, 87);
    }

    #[test]
    fn test_heading_wraps_negative_values() {
        let data = payload(0, 0, 0, 0);
        let attitude = decode_wind_data(&data, CURRENT).unwrap().attitude.unwrap();
        assert_eq!(attitude.heading, 270.0);
        assert_eq!(attitude.roll, 0.0);
        assert!(attitude.roll.is_sign_positive());
    }

    #[test]
    fn test_heading_stays_below_360() {
        // 7200/16 - 90 = 360
        let data = payload(7200, 0, 0, 0);
        let attitude = decode_wind_data(&data, CURRENT).unwrap().attitude.unwrap();
        assert_eq!(attitude.heading, 0.0);
    }

    #[test]
    fn test_roll_wraparound() {
        // raw -3200 -> inverted 200° -> -160°
        let data = payload(1440, -3200, 0, 0);
        let attitude = decode_wind_data(&data, CURRENT).unwrap().attitude.unwrap();
        assert_eq!(attitude.roll, -160.0);

        // 180° exactly maps to -180°, 179.9375° stays
        let data = payload(1440, -2880, 0, 0);
        let attitude = decode_wind_data(&data, CURRENT).unwrap().attitude.unwrap();
        assert_eq!(attitude.roll, -180.0);
        let data = payload(1440, -2879, 0, 0);
        let attitude = decode_wind_data(&data, CURRENT).unwrap().attitude.unwrap();
        assert_eq!(attitude.roll, 179.9375);
    }

    #[test]
    fn test_signed_pitch() {
        // 0xFFF0 is -16 in two's complement
        let mut data = payload(1440, 0, 0, 0);
        data[9] = 0xF0;
        data[10] = 0xFF;
        let attitude = decode_wind_data(&data, CURRENT).unwrap().attitude.unwrap();
        assert_eq!(attitude.pitch, -1.0);
    }

    #[test]
    fn test_payload_length_boundary() {
        let short = [0u8; 11];
        match decode_wind_data(&short, CURRENT) {
            Err(BridgeError::MalformedPayload { expected, actual }) => {
                assert_eq!(expected, 12);
                assert_eq!(actual, 11);
            }
            other => panic!("expected MalformedPayload, got {:?}", other),
        }
        assert!(decode_wind_data(&[], LEGACY).is_err());
        assert!(decode_wind_data(&[0u8; 12], CURRENT).is_ok());
        assert!(decode_wind_data(&[0u8; 20], CURRENT).is_ok());
    }
}
