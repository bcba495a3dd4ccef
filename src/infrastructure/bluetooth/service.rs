//! Batch Tester Service
//!
//! Scans for devices of a serial range, checks each one in turn and writes
//! the report.

use crate::domain::models::{DeviceType, ScannedDevice};
use crate::domain::report::FailureCode;
use crate::domain::serial::{SerialRange, SerialVerdict};
use crate::infrastructure::bluetooth::session::SessionOutcome;
use tracing::{debug, info};

#[cfg(windows)]
pub use self::winrt::BatchTester;

/// Devices found while scanning, in discovery order, without duplicates
#[derive(Debug, Default)]
pub struct CandidateQueue {
    devices: Vec<ScannedDevice>,
}

impl CandidateQueue {
    /// Add `device` if its name belongs to `range` and it has not been seen
    pub fn offer(&mut self, device: ScannedDevice, range: &SerialRange, name_prefix: &str) -> bool {
        if !range.accepts_advertised_name(&device.name, name_prefix) {
            return false;
        }
        if self.devices.iter().any(|d| d.address == device.address) {
            return false;
        }

        debug!("Candidate {} ({} dBm)", device.name, device.signal_strength);
        self.devices.push(device);
        true
    }

    /// Every device the range can hold has been seen
    pub fn is_complete(&self, range: &SerialRange) -> bool {
        self.devices.len() as u64 >= range.device_count()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn into_devices(self) -> Vec<ScannedDevice> {
        self.devices
    }
}

/// Turn a finished session into a pass/fail with a reason for the report
pub fn evaluate_outcome(
    outcome: &SessionOutcome,
    range: &SerialRange,
    device_type: DeviceType,
) -> Result<String, String> {
    match outcome {
        SessionOutcome::Serial(serial) => match range.verify(serial, device_type) {
            SerialVerdict::InRange => {
                info!("Device serial number {} in range", serial);
                Ok(serial.clone())
            }
            SerialVerdict::OutOfRange => Err(format!("Serial number {} out of range", serial)),
            SerialVerdict::Invalid => Err(format!("Invalid serial number {:?}", serial)),
        },
        SessionOutcome::NotReady(reason) => Err(format!("UART service unusable: {}", reason)),
        SessionOutcome::PinRejected => Err("PIN rejected".to_string()),
        SessionOutcome::Malformed(reason) => Err(format!("Bad version reply: {}", reason)),
        SessionOutcome::Invalidated => Err(FailureCode::PoweredOff.reason()),
        SessionOutcome::LinkClosed => Err(FailureCode::LowLevel.reason()),
    }
}

#[cfg(windows)]
mod winrt {
    use super::{evaluate_outcome, CandidateQueue};
    use crate::domain::models::ScannedDevice;
    use crate::domain::report::{build_report, write_report, FailedDevice, FailureCode, Report};
    use crate::domain::serial::SerialRange;
    use crate::domain::settings::Settings;
    use crate::infrastructure::bluetooth::connection::WinRtLink;
    use crate::infrastructure::bluetooth::dispatcher::{CommandDispatcher, UartLayout};
    use crate::infrastructure::bluetooth::link::GattLink;
    use crate::infrastructure::bluetooth::scanner::BleScanner;
    use crate::infrastructure::bluetooth::session::drive_session;
    use anyhow::Result;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tracing::{error, info, warn};

    /// Why a device check failed, as a report reason
    enum CheckFailure {
        /// No link could be established
        Connect(String),
        /// The link came up but the session did not produce a valid serial
        Session(String),
    }

    pub struct BatchTester {
        settings: Settings,
    }

    impl BatchTester {
        pub fn new(settings: Settings) -> Self {
            Self { settings }
        }

        fn layout(&self) -> UartLayout {
            UartLayout {
                service_uuid: self.settings.ble_service_uuid.clone(),
                request_char_uuid: self.settings.ble_request_char_uuid.clone(),
                response_char_uuid: self.settings.ble_response_char_uuid.clone(),
            }
        }

        /// Scan, check every candidate, then build and store the report
        pub async fn run(&self) -> Result<Report> {
            let range = SerialRange::parse(
                &self.settings.serial_range_start,
                &self.settings.serial_range_end,
            )?;
            info!(
                "Checking {} devices, range {}..={}",
                range.device_count(),
                range.start(),
                range.end()
            );

            let candidates = self.scan(&range).await?;
            info!("Scan finished, {} candidates", candidates.len());

            let mut checked = Vec::new();
            let mut failed = Vec::new();
            let mut last_error = None;
            for device in candidates {
                match self.check_device(&device, &range).await {
                    Ok(serial) => {
                        info!("{} passed ({})", device.name, serial);
                        checked.push(device);
                    }
                    Err(CheckFailure::Connect(reason)) => {
                        warn!("{} failed: {}", device.name, reason);
                        last_error = Some(reason.clone());
                        failed.push(FailedDevice { device, reason });
                    }
                    Err(CheckFailure::Session(reason)) => {
                        warn!("{} failed: {}", device.name, reason);
                        failed.push(FailedDevice { device, reason });
                    }
                }
            }

            let report = build_report(
                &range,
                self.settings.device_type,
                &checked,
                &failed,
                last_error.as_deref(),
            );
            let path = write_report(Path::new(&self.settings.report_dir), &report)?;
            info!(
                "Report written to {} ({} checked, {} unchecked, {} not found)",
                path.display(),
                report.checked.len(),
                report.unchecked.len(),
                report.not_found.len()
            );

            Ok(report)
        }

        async fn scan(&self, range: &SerialRange) -> Result<Vec<ScannedDevice>> {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut scanner = BleScanner::new(tx);
            scanner.start()?;

            let mut queue = CandidateQueue::default();
            let deadline = tokio::time::sleep(Duration::from_millis(self.settings.scan_period_ms));
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    Some(device) = rx.recv() => {
                        queue.offer(device, range, &self.settings.advertised_name_prefix);
                        if queue.is_complete(range) {
                            info!("Every device of the range was seen, stopping scan early");
                            break;
                        }
                    }
                }
            }

            scanner.stop()?;
            if queue.is_empty() {
                warn!("No device of the range was seen while scanning");
            }
            Ok(queue.into_devices())
        }

        async fn check_device(
            &self,
            device: &ScannedDevice,
            range: &SerialRange,
        ) -> std::result::Result<String, CheckFailure> {
            let (link_tx, mut link_rx) = mpsc::unbounded_channel();
            let (session_tx, mut session_rx) = mpsc::unbounded_channel();

            let link = WinRtLink::connect(device.address, &self.layout(), link_tx)
                .await
                .map_err(|e| {
                    error!("Failed to connect to device {}: {}", device.name, e);
                    CheckFailure::Connect(FailureCode::Operation.reason_with(e))
                })?;

            let mut dispatcher = CommandDispatcher::new(link, self.layout(), session_tx);
            let outcome = tokio::time::timeout(
                Duration::from_millis(self.settings.session_timeout_ms),
                drive_session(
                    &mut dispatcher,
                    &mut link_rx,
                    &mut session_rx,
                    &self.settings.pin_code,
                ),
            )
            .await;
            dispatcher.link_mut().disconnect();

            match outcome {
                Ok(outcome) => evaluate_outcome(&outcome, range, self.settings.device_type)
                    .map_err(CheckFailure::Session),
                Err(_) => Err(CheckFailure::Session(FailureCode::Timeout.reason())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, address: u64) -> ScannedDevice {
        ScannedDevice {
            name: name.to_string(),
            address,
            signal_strength: -50,
        }
    }

    #[test]
    fn test_candidate_queue() {
        let range = SerialRange::parse("24010100", "24010101").unwrap();
        let mut queue = CandidateQueue::default();

        assert!(queue.is_empty());
        assert!(queue.offer(device("Satellite0100", 1), &range, "Satellite"));
        assert!(!queue.offer(device("Satellite0100", 1), &range, "Satellite"));
        assert!(!queue.offer(device("Satellite0150", 2), &range, "Satellite"));
        assert!(!queue.offer(device("Headset", 3), &range, "Satellite"));
        assert!(!queue.is_complete(&range));

        assert!(queue.offer(device("Satellite0101", 4), &range, "Satellite"));
        assert!(queue.is_complete(&range));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_evaluate_outcome() {
        let range = SerialRange::parse("24010100", "24010120").unwrap();

        assert_eq!(
            evaluate_outcome(
                &SessionOutcome::Serial("D24010105".to_string()),
                &range,
                DeviceType::Online
            ),
            Ok("D24010105".to_string())
        );
        assert!(evaluate_outcome(
            &SessionOutcome::Serial("D99999999".to_string()),
            &range,
            DeviceType::Online
        )
        .unwrap_err()
        .contains("out of range"));
        assert_eq!(
            evaluate_outcome(&SessionOutcome::Invalidated, &range, DeviceType::Online),
            Err("Error 19".to_string())
        );
        assert_eq!(
            evaluate_outcome(&SessionOutcome::LinkClosed, &range, DeviceType::Online),
            Err("Error 133".to_string())
        );
        assert_eq!(
            evaluate_outcome(&SessionOutcome::PinRejected, &range, DeviceType::Online),
            Err("PIN rejected".to_string())
        );
    }
}
