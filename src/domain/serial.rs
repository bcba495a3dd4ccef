//! Serial number ranges and verification of decoded serials against them.

use crate::domain::models::DeviceType;
use anyhow::Result;

/// Number of trailing characters of an advertised name that carry the
/// device number.
const NAME_SUFFIX_LEN: usize = 4;

/// Largest number of devices a single range may cover
pub const MAX_RANGE_DEVICES: u64 = 100_000;

/// Inclusive range of device numbers under test.
///
/// Bounds are given as decimal strings; the width of the start string is the
/// zero-padding width used when the range is enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialRange {
    start: u64,
    end: u64,
    width: usize,
}

/// Result of checking one decoded serial number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialVerdict {
    InRange,
    OutOfRange,
    /// Empty serial, or the part after the letter is not a number
    Invalid,
}

impl SerialRange {
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start_number: u64 = start
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid range start {:?}: {}", start, e))?;
        let end_number: u64 = end
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid range end {:?}: {}", end, e))?;

        if start_number > end_number {
            anyhow::bail!("Range start {} is after range end {}", start, end);
        }

        let span = (end_number - start_number)
            .checked_add(1)
            .filter(|count| *count <= MAX_RANGE_DEVICES)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Range {}..={} covers more than {} devices",
                    start,
                    end,
                    MAX_RANGE_DEVICES
                )
            })?;
        tracing::debug!("Serial range covers {} devices", span);

        Ok(Self {
            start: start_number,
            end: end_number,
            width: start.trim().len(),
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of devices the range covers, at most [`MAX_RANGE_DEVICES`]
    pub fn device_count(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Whether an advertised device name belongs to this range.
    ///
    /// The name must contain `name_prefix` and end in four digits lying
    /// between the last four digits of the range bounds.
    pub fn accepts_advertised_name(&self, name: &str, name_prefix: &str) -> bool {
        if !name.contains(name_prefix) {
            return false;
        }

        let Some(number) = last_digits(name) else {
            return false;
        };

        let low = self.start % 10_000;
        let high = self.end % 10_000;
        (low..=high).contains(&number)
    }

    /// Check a serial number decoded from a device against the range
    pub fn verify(&self, serial: &str, device_type: DeviceType) -> SerialVerdict {
        let mut chars = serial.chars();
        let Some(letter) = chars.next() else {
            return SerialVerdict::Invalid;
        };
        let Ok(number) = chars.as_str().parse::<u64>() else {
            return SerialVerdict::Invalid;
        };

        if (self.start..=self.end).contains(&number) && letter == device_type.serial_letter() {
            SerialVerdict::InRange
        } else {
            SerialVerdict::OutOfRange
        }
    }

    /// Every number in the range, zero-padded to the width of the start bound
    pub fn addresses(&self) -> Vec<String> {
        (self.start..=self.end)
            .map(|n| format!("{:0width$}", n, width = self.width))
            .collect()
    }
}

/// Last four characters of `text` parsed as a number
pub(crate) fn last_digits(text: &str) -> Option<u64> {
    let chars: Vec<char> = text.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(NAME_SUFFIX_LEN)..]
        .iter()
        .collect();
    tail.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_reversed_range() {
        assert!(SerialRange::parse("20", "10").is_err());
        assert!(SerialRange::parse("abc", "10").is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_range() {
        assert!(SerialRange::parse("0", "18446744073709551615").is_err());
        assert!(SerialRange::parse("0", "100000").is_err());

        let widest = SerialRange::parse("0", "99999").unwrap();
        assert_eq!(widest.device_count(), MAX_RANGE_DEVICES);
        assert_eq!(widest.addresses().len() as u64, MAX_RANGE_DEVICES);
    }

    #[test]
    fn test_addresses_keep_padding() {
        let range = SerialRange::parse("000998", "001001").unwrap();
        assert_eq!(range.device_count(), 4);
        assert_eq!(
            range.addresses(),
            vec!["000998", "000999", "001000", "001001"]
        );
    }

    #[test]
    fn test_advertised_name_filter() {
        let range = SerialRange::parse("24010100", "24010120").unwrap();
        assert!(range.accepts_advertised_name("Satellite0105", "Satellite"));
        assert!(range.accepts_advertised_name("Satellite0120", "Satellite"));
        assert!(!range.accepts_advertised_name("Satellite0121", "Satellite"));
        assert!(!range.accepts_advertised_name("Speaker0105", "Satellite"));
        assert!(!range.accepts_advertised_name("SatelliteX1y2", "Satellite"));
    }

    #[test]
    fn test_verify_serial() {
        let range = SerialRange::parse("24010100", "24010120").unwrap();
        assert_eq!(
            range.verify("D24010110", DeviceType::Online),
            SerialVerdict::InRange
        );
        // wrong family letter
        assert_eq!(
            range.verify("E24010110", DeviceType::Online),
            SerialVerdict::OutOfRange
        );
        assert_eq!(
            range.verify("D24010200", DeviceType::Online),
            SerialVerdict::OutOfRange
        );
        assert_eq!(range.verify("", DeviceType::Online), SerialVerdict::Invalid);
        assert_eq!(
            range.verify("DABC", DeviceType::Online),
            SerialVerdict::Invalid
        );
    }

    #[test]
    fn test_last_digits_short_text() {
        assert_eq!(last_digits("12"), Some(12));
        assert_eq!(last_digits(""), None);
    }
}
