use serde::{Deserialize, Serialize};

/// Kind of response expected for the next notification.
///
/// One tag is queued per command written; one is popped per notification
/// received. There is no correlation id, pairing is purely positional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingRequestTag {
    /// Reply to `serial`: fixed-layout blob carrying the serial number
    HardwareVersion,
    /// Free-form reply, `ble.ok` marks the device shutting down
    DefaultCommand,
    /// Reply to `pin.<code>`, `pin.ok` marks a successful unlock
    PinCode,
}

/// Events raised by a session towards the layer driving it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A hardware-version reply was decoded into a serial number
    VersionChecked(String),
    /// The peripheral's services went away and the session was torn down
    HandleCheck,
    ConnectionStatus(ConnectionStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

/// A device seen while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub name: String,
    pub address: u64,
    pub signal_strength: i16,
}

/// Device family under test. Selects the letter the serial number must
/// start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Online,
    Voice,
    ADevice,
}

impl DeviceType {
    /// Leading letter of a serial number belonging to this family
    pub fn serial_letter(&self) -> char {
        match self {
            Self::Online => 'D',
            Self::Voice => 'E',
            Self::ADevice => 'F',
        }
    }

    /// Label used in reports for devices that were never seen
    pub fn report_label(&self) -> &'static str {
        match self {
            Self::Online => "SatelliteOnline",
            Self::Voice => "VoiceOnline",
            Self::ADevice => "F",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_letters() {
        assert_eq!(DeviceType::Online.serial_letter(), 'D');
        assert_eq!(DeviceType::Voice.serial_letter(), 'E');
        assert_eq!(DeviceType::ADevice.serial_letter(), 'F');
    }

    #[test]
    fn test_device_type_json() {
        let json = serde_json::to_string(&DeviceType::Voice).unwrap();
        assert_eq!(json, "\"Voice\"");
    }
}
