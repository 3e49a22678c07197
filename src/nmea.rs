/// NMEA-0183 sentence generation for wind and heading data
use crate::error::BridgeError;
use crate::models::SensorReading;

/// Compute the NMEA-0183 checksum of a sentence
///
/// XORs every character after the first `$` or `!` up to, but excluding,
/// the first `*` (or the end of the string).
///
/// # Returns
/// The 8-bit checksum, or InvalidSentence if there is no start delimiter
pub fn checksum(sentence: &str) -> Result<u8, BridgeError> {
    let start = sentence
        .find(&['$', '!'][..])
        .ok_or_else(|| BridgeError::InvalidSentence(sentence.to_string()))?;

    Ok(sentence[start + 1..]
        .bytes()
        .take_while(|&b| b != b'*')
        .fold(0u8, |acc, b| acc ^ b))
}

/// Terminate a sentence body with `*<checksum>` and a newline
fn finish(body: String) -> Result<String, BridgeError> {
    let cs = checksum(&body)?;
    Ok(format!("{}*{:02x}\n", body, cs))
}

/// `$WIMWV,<angle>,R,<speed>,N,A*cc` - relative wind in knots
pub fn wind_sentence(angle: f64, speed: f64) -> Result<String, BridgeError> {
    finish(format!("$WIMWV,{:.1},R,{:.1},N,A", angle, speed))
}

/// `$WIHDM,<heading>,M*cc` - magnetic heading
pub fn heading_sentence(heading: f64) -> Result<String, BridgeError> {
    finish(format!("$WIHDM,{:.1},M", heading))
}

/// Encode a reading into the sentences it supports, wind first
pub fn encode_reading(reading: &SensorReading) -> Result<Vec<String>, BridgeError> {
    let mut sentences = vec![wind_sentence(
        reading.apparent_wind_angle,
        reading.apparent_wind_speed,
    )?];

    if let Some(attitude) = &reading.attitude {
        sentences.push(heading_sentence(attitude.heading)?);
    }

    Ok(sentences)
}
