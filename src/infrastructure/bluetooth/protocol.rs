//! UART Tester Protocol
//!
//! Command strings written to the request characteristic and decoding of
//! the replies received on the response characteristic.

use crate::infrastructure::bluetooth::error::DispatchError;
#[cfg(windows)]
use anyhow::Result;
#[cfg(windows)]
use windows::core::GUID;

/// Nordic UART Service UUID
pub const SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Request (RX) Characteristic UUID - commands are written here
pub const REQUEST_CHAR_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// Response (TX) Characteristic UUID - replies arrive here as notifications
pub const RESPONSE_CHAR_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Asks the device for its hardware version block
pub const SERIAL_COMMAND: &str = "serial";

/// Prefix of the unlock command, followed by the PIN itself
pub const PIN_PREFIX: &str = "pin.";

/// Reply marker: the device accepted the last command and is powering off
pub const BLE_OK: &str = "ble.ok";

/// Reply marker: the PIN was accepted
pub const PIN_OK: &str = "pin.ok";

/// Byte range of the serial number inside a hardware version reply
///
/// ```text
/// [0-3]   : Header (ignored)
/// [4-19]  : Serial number, ASCII, padded with NUL / control bytes
/// [20-..] : Trailing data (ignored)
/// ```
pub const SERIAL_START: usize = 4;
pub const SERIAL_END: usize = 20;

/// Payload for an unlock command
pub fn pin_payload(pin: &str) -> String {
    format!("{}{}", PIN_PREFIX, pin)
}

/// Extract the serial number from a hardware version reply.
///
/// Bytes `[4, 20)` are read as ASCII (non-ASCII bytes become U+FFFD), the
/// result is trimmed of anything at or below space at both ends, then every
/// remaining `0x00..=0x1F` character is removed.
pub fn decode_hardware_version(payload: &[u8]) -> Result<String, DispatchError> {
    let field = payload
        .get(SERIAL_START..SERIAL_END)
        .ok_or(DispatchError::ShortPayload {
            len: payload.len(),
            expected: SERIAL_END,
        })?;

    let text: String = field
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect();

    Ok(text
        .trim_matches(|c: char| c <= ' ')
        .chars()
        .filter(|c| !('\u{0}'..='\u{1f}').contains(c))
        .collect())
}

/// Whether a free-form reply contains `marker`
pub fn reply_contains(payload: &[u8], marker: &str) -> bool {
    String::from_utf8_lossy(payload).contains(marker)
}

/// Canonical form used to compare UUID strings
pub fn normalize_uuid(uuid_str: &str) -> String {
    uuid_str.trim().replace('-', "").to_ascii_lowercase()
}

/// Parse a UUID string into a Windows GUID
#[cfg(windows)]
pub fn parse_uuid(uuid_str: &str) -> Result<GUID> {
    let uuid_str = normalize_uuid(uuid_str);

    if uuid_str.len() != 32 || !uuid_str.is_ascii() {
        return Err(anyhow::anyhow!("Invalid UUID format"));
    }

    let d1 = u32::from_str_radix(&uuid_str[0..8], 16)?;
    let d2 = u16::from_str_radix(&uuid_str[8..12], 16)?;
    let d3 = u16::from_str_radix(&uuid_str[12..16], 16)?;

    let mut d4 = [0u8; 8];
    for (i, byte) in d4.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&uuid_str[16 + i * 2..18 + i * 2], 16)?;
    }

    Ok(GUID {
        data1: d1,
        data2: d2,
        data3: d3,
        data4: d4,
    })
}
