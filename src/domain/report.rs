//! Test report: which devices of a range passed, failed or never showed up.

use crate::domain::models::{DeviceType, ScannedDevice};
use crate::domain::serial::{last_digits, SerialRange};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const NOT_SEEN: &str = "Not seen on air";

/// Link failure classes written into report interpretations as `Error <code>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    /// Generic connection or GATT operation failure
    Operation,
    /// Our own connection timeout expired
    Timeout,
    /// Peer timed out and dropped the link
    PeerTimeout,
    /// Peer terminated the connection
    PoweredOff,
    /// Link dropped below GATT
    LowLevel,
}

impl FailureCode {
    const ALL: [FailureCode; 5] = [
        Self::Operation,
        Self::Timeout,
        Self::PeerTimeout,
        Self::PoweredOff,
        Self::LowLevel,
    ];

    pub fn code(&self) -> u16 {
        match self {
            Self::Operation => 1,
            Self::Timeout => 5,
            Self::PeerTimeout => 8,
            Self::PoweredOff => 19,
            Self::LowLevel => 133,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Operation => "Error during connection or operation",
            Self::Timeout => "The connection timeout expired",
            Self::PeerTimeout => "The connection timeout expired and the device disconnected itself",
            Self::PoweredOff => "The device turned off intentionally",
            Self::LowLevel => "A low-level connection error that led to disconnection",
        }
    }

    /// Reason string carrying this code, e.g. `Error 133`
    pub fn reason(&self) -> String {
        format!("Error {}", self.code())
    }

    /// Same as [`reason`](Self::reason) with a detail appended after a colon
    pub fn reason_with(&self, detail: impl std::fmt::Display) -> String {
        format!("Error {}: {}", self.code(), detail)
    }

    fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// Human-readable interpretation of a failure reason.
///
/// Reasons of the form `Error <code>` or `Error <code>: <detail>` with a
/// known code become `Failed: <description>`, keeping the detail in
/// parentheses. An unknown code reads as a generic operation failure.
/// Anything else is returned unchanged.
pub fn interpret_failure(reason: &str) -> String {
    let Some(rest) = reason.trim().strip_prefix("Error ") else {
        return reason.to_string();
    };
    let (code, detail) = match rest.split_once(':') {
        Some((code, detail)) => (code, detail.trim()),
        None => (rest, ""),
    };
    let Ok(code) = code.trim().parse::<u16>() else {
        return reason.to_string();
    };

    let failure = FailureCode::from_code(code).unwrap_or(FailureCode::Operation);
    if detail.is_empty() {
        format!("Failed: {}", failure.description())
    } else {
        format!("Failed: {} ({})", failure.description(), detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Checked,
    Unchecked,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub device: String,
    pub device_address: String,
    pub status: ReportStatus,
    pub interpretation: String,
}

/// A device that was found but failed the check, with the reason
#[derive(Debug, Clone)]
pub struct FailedDevice {
    pub device: ScannedDevice,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub checked: Vec<ReportItem>,
    pub unchecked: Vec<ReportItem>,
    pub not_found: Vec<ReportItem>,
}

impl Report {
    pub fn total(&self) -> usize {
        self.checked.len() + self.unchecked.len() + self.not_found.len()
    }
}

/// Build the report for one pass over `range`.
///
/// Every address of the range whose last four digits do not match the tail
/// of a discovered device name is listed as not found. A non-blank
/// `last_error` replaces the default "not seen" interpretation of those
/// items.
pub fn build_report(
    range: &SerialRange,
    device_type: DeviceType,
    checked: &[ScannedDevice],
    failed: &[FailedDevice],
    last_error: Option<&str>,
) -> Report {
    let missing_interpretation = last_error
        .filter(|e| !e.trim().is_empty())
        .map(interpret_failure)
        .unwrap_or_else(|| NOT_SEEN.to_string());

    let discovered: HashSet<u64> = checked
        .iter()
        .chain(failed.iter().map(|f| &f.device))
        .filter_map(|d| last_digits(&d.name))
        .collect();

    let not_found = range
        .addresses()
        .into_iter()
        .filter(|address| match last_digits(address) {
            Some(tail) => !discovered.contains(&tail),
            None => true,
        })
        .map(|address| {
            let tail_start = address.len().saturating_sub(4);
            ReportItem {
                device: format!("{}{}", device_type.report_label(), &address[tail_start..]),
                device_address: address,
                status: ReportStatus::NotFound,
                interpretation: missing_interpretation.clone(),
            }
        })
        .collect();

    let mut seen = HashSet::new();
    let checked = checked
        .iter()
        .filter(|d| seen.insert(d.address))
        .map(|d| ReportItem {
            device: d.name.clone(),
            device_address: format_address(d.address),
            status: ReportStatus::Checked,
            interpretation: "Serial number in range".to_string(),
        })
        .collect();

    let unchecked = failed
        .iter()
        .map(|f| ReportItem {
            device: f.device.name.clone(),
            device_address: format_address(f.device.address),
            status: ReportStatus::Unchecked,
            interpretation: interpret_failure(&f.reason),
        })
        .collect();

    Report {
        checked,
        unchecked,
        not_found,
    }
}

/// Write the report as pretty JSON into `dir`, returning the file path
pub fn write_report(dir: &Path, report: &Report) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let path = dir.join(format!("report_{}.json", stamp));
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Colon-separated form of a 48-bit Bluetooth address
pub fn format_address(address: u64) -> String {
    let bytes = address.to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, address: u64) -> ScannedDevice {
        ScannedDevice {
            name: name.to_string(),
            address,
            signal_strength: -60,
        }
    }

    #[test]
    fn test_format_address() {
        assert_eq!(format_address(0x0011_2233_4455), "00:11:22:33:44:55");
    }

    #[test]
    fn test_build_report() {
        let range = SerialRange::parse("24010100", "24010103").unwrap();
        let checked = vec![device("Satellite0100", 1), device("Satellite0100", 1)];
        let failed = vec![FailedDevice {
            device: device("Satellite0102", 2),
            reason: "Pin rejected".to_string(),
        }];

        let report = build_report(&range, DeviceType::Online, &checked, &failed, None);

        assert_eq!(report.checked.len(), 1);
        assert_eq!(report.unchecked.len(), 1);
        assert_eq!(report.unchecked[0].interpretation, "Pin rejected");

        let missing: Vec<_> = report
            .not_found
            .iter()
            .map(|i| i.device_address.as_str())
            .collect();
        assert_eq!(missing, vec!["24010101", "24010103"]);
        assert_eq!(report.not_found[0].device, "SatelliteOnline0101");
        assert_eq!(report.not_found[0].interpretation, "Not seen on air");
        assert_eq!(report.total(), 4);
    }

    #[test]
    fn test_last_error_replaces_not_seen() {
        let range = SerialRange::parse("24010100", "24010101").unwrap();
        let checked = vec![device("Satellite0100", 1)];

        let report = build_report(&range, DeviceType::Voice, &checked, &[], Some("Error 133"));
        assert_eq!(report.not_found.len(), 1);
        assert_eq!(report.not_found[0].device, "VoiceOnline0101");
        assert_eq!(
            report.not_found[0].interpretation,
            "Failed: A low-level connection error that led to disconnection"
        );

        let report = build_report(&range, DeviceType::Voice, &checked, &[], Some("  "));
        assert_eq!(report.not_found[0].interpretation, "Not seen on air");
    }

    #[test]
    fn test_interpret_failure() {
        assert_eq!(
            interpret_failure("Error 19"),
            "Failed: The device turned off intentionally"
        );
        assert_eq!(
            interpret_failure(&FailureCode::Timeout.reason()),
            "Failed: The connection timeout expired"
        );
        assert_eq!(
            interpret_failure("Error 1: device unreachable"),
            "Failed: Error during connection or operation (device unreachable)"
        );
        // unknown code falls back to the generic description
        assert_eq!(
            interpret_failure("Error 42"),
            "Failed: Error during connection or operation"
        );
        assert_eq!(interpret_failure("PIN rejected"), "PIN rejected");
        assert_eq!(interpret_failure("Error x"), "Error x");
    }

    #[test]
    fn test_failed_device_reason_is_interpreted() {
        let range = SerialRange::parse("24010100", "24010100").unwrap();
        let failed = vec![FailedDevice {
            device: device("Satellite0100", 7),
            reason: FailureCode::PeerTimeout.reason(),
        }];

        let report = build_report(&range, DeviceType::Online, &[], &failed, None);
        assert!(report.not_found.is_empty());
        assert_eq!(
            report.unchecked[0].interpretation,
            "Failed: The connection timeout expired and the device disconnected itself"
        );
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report::default();
        let path = write_report(dir.path(), &report).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        let parsed: Report = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.total(), 0);
    }
}
