//! Command Dispatcher
//!
//! Writes ASCII commands to the UART request characteristic and pairs each
//! notification on the response characteristic with the oldest pending
//! request tag.
//!
//! All entry points take `&mut self` and are expected to be called from a
//! single task that drains the platform's event channel, so callbacks never
//! overlap and no locking is needed. If a backend ever delivers events
//! concurrently the dispatcher must sit behind a mutex or a single-consumer
//! channel.

use crate::domain::models::{ConnectionStatus, PendingRequestTag, SessionEvent};
use crate::infrastructure::bluetooth::error::{DispatchError, LinkError};
use crate::infrastructure::bluetooth::link::GattLink;
use crate::infrastructure::bluetooth::protocol;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// UUIDs of the UART service and its two characteristics
#[derive(Debug, Clone)]
pub struct UartLayout {
    pub service_uuid: String,
    pub request_char_uuid: String,
    pub response_char_uuid: String,
}

impl Default for UartLayout {
    fn default() -> Self {
        Self {
            service_uuid: protocol::SERVICE_UUID.to_string(),
            request_char_uuid: protocol::REQUEST_CHAR_UUID.to_string(),
            response_char_uuid: protocol::RESPONSE_CHAR_UUID.to_string(),
        }
    }
}

/// What a notification turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Nothing was pending, the payload was dropped
    Unexpected,
    /// Hardware version decoded into this serial number
    Serial(String),
    /// `ble.ok` seen, the device is powering off
    ShuttingDown,
    /// `pin.ok` seen and the serial query was sent
    Unlocked,
    /// Pin reply without `pin.ok`, nothing further was sent
    PinRejected,
    /// Reply carried no marker the handler reacts to
    Ignored,
}

pub struct CommandDispatcher<L: GattLink> {
    link: L,
    layout: UartLayout,
    request: Option<L::Characteristic>,
    response: Option<L::Characteristic>,
    pending: VecDeque<PendingRequestTag>,
    serial_number: Option<String>,
    event_sender: mpsc::UnboundedSender<SessionEvent>,
}

impl<L: GattLink> CommandDispatcher<L> {
    pub fn new(
        link: L,
        layout: UartLayout,
        event_sender: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            link,
            layout,
            request: None,
            response: None,
            pending: VecDeque::new(),
            serial_number: None,
            event_sender,
        }
    }

    /// Resolve the request/response characteristics and subscribe to
    /// notifications on the response one.
    ///
    /// Must succeed before any command is sent; both characteristics have to
    /// be present for the connection to count as usable.
    pub fn on_device_ready(&mut self) -> Result<(), DispatchError> {
        self.request = self
            .link
            .find_characteristic(&self.layout.service_uuid, &self.layout.request_char_uuid);
        self.response = self
            .link
            .find_characteristic(&self.layout.service_uuid, &self.layout.response_char_uuid);

        let missing = match (&self.request, &self.response) {
            (None, _) => Some("Request"),
            (_, None) => Some("Response"),
            _ => None,
        };
        if let Some(which) = missing {
            error!("{} characteristic not found, connection unusable", which);
            self.request = None;
            self.response = None;
            return Err(DispatchError::MissingCharacteristic(which));
        }

        if let Some(response) = &self.response {
            if let Err(e) = self.link.enable_notifications(response) {
                error!("Failed to enable notifications: {}", e);
                self.request = None;
                self.response = None;
                return Err(DispatchError::Subscribe(e));
            }
        }

        info!("UART service ready, notifications enabled");
        let _ = self
            .event_sender
            .send(SessionEvent::ConnectionStatus(ConnectionStatus::Connected));
        Ok(())
    }

    /// Write `command` and expect a reply of kind `tag`.
    ///
    /// Dropped with a log line when the link is down or the request
    /// characteristic is not resolved.
    pub fn send_command(&mut self, command: &str, tag: PendingRequestTag) {
        debug!("Sending command {:?} ({:?})", command, tag);
        self.write_tagged(command.as_bytes(), tag);
    }

    /// Write `pin.<pin>` and expect a reply of kind `tag`
    pub fn send_pin_command(&mut self, pin: &str, tag: PendingRequestTag) {
        debug!("Sending PIN command ({:?})", tag);
        let payload = protocol::pin_payload(pin);
        self.write_tagged(payload.as_bytes(), tag);
    }

    fn write_tagged(&mut self, payload: &[u8], tag: PendingRequestTag) {
        let request = match &self.request {
            Some(request) if self.link.is_connected() => request.clone(),
            _ => {
                error!("Device is not connected");
                return;
            }
        };

        // The tag is queued before the write and stays queued if the write
        // later fails.
        self.pending.push_back(tag);
        if self.pending.len() > 1 {
            warn!(
                "{} requests in flight, replies may pair with the wrong request",
                self.pending.len()
            );
        }

        if let Err(e) = self.link.write_without_response(&request, payload) {
            error!("Failed to send command: {}", e);
        }
    }

    /// Log the outcome of a write reported by the platform
    pub fn on_write_complete(&self, payload: &[u8], result: &Result<(), LinkError>) {
        let command = String::from_utf8_lossy(payload);
        match result {
            Ok(()) if command.starts_with(protocol::PIN_PREFIX) => info!("PIN command sent"),
            Ok(()) => debug!("Command sent: {}", command),
            Err(e) => error!("Failed to send command: {}", e),
        }
    }

    /// Pair a notification with the oldest pending tag and run its handler
    pub fn on_notification(&mut self, payload: &[u8]) -> Result<NotificationOutcome, DispatchError> {
        let Some(tag) = self.pending.pop_front() else {
            debug!("No pending request, dropping {} byte notification", payload.len());
            return Ok(NotificationOutcome::Unexpected);
        };

        trace!("Reply for {:?}: {:02X?}", tag, payload);

        match tag {
            PendingRequestTag::HardwareVersion => self.handle_hardware_version(payload),
            PendingRequestTag::DefaultCommand => Ok(self.handle_default_command(payload)),
            PendingRequestTag::PinCode => Ok(self.handle_pin_result(payload)),
        }
    }

    fn handle_hardware_version(
        &mut self,
        payload: &[u8],
    ) -> Result<NotificationOutcome, DispatchError> {
        let serial = protocol::decode_hardware_version(payload).map_err(|e| {
            error!("Received invalid HW version data: {}", e);
            e
        })?;

        debug!("VERSION: {}", serial);
        self.serial_number = Some(serial.clone());
        let _ = self
            .event_sender
            .send(SessionEvent::VersionChecked(serial.clone()));
        Ok(NotificationOutcome::Serial(serial))
    }

    fn handle_default_command(&self, payload: &[u8]) -> NotificationOutcome {
        debug!("Default reply: {}", String::from_utf8_lossy(payload));
        if protocol::reply_contains(payload, protocol::BLE_OK) {
            info!("Devices starting to off");
            NotificationOutcome::ShuttingDown
        } else {
            NotificationOutcome::Ignored
        }
    }

    fn handle_pin_result(&mut self, payload: &[u8]) -> NotificationOutcome {
        if protocol::reply_contains(payload, protocol::PIN_OK) {
            debug!("Pin code is correct");
            self.send_command(
                protocol::SERIAL_COMMAND,
                PendingRequestTag::HardwareVersion,
            );
            NotificationOutcome::Unlocked
        } else {
            debug!("Pin code rejected: {}", String::from_utf8_lossy(payload));
            NotificationOutcome::PinRejected
        }
    }

    /// Tear the session down after the peripheral's services went away.
    ///
    /// Clears both characteristics, drops every pending tag, disconnects the
    /// link and reports [`SessionEvent::HandleCheck`].
    pub fn on_services_invalidated(&mut self) {
        self.request = None;
        self.response = None;

        if !self.pending.is_empty() {
            warn!(
                "Services invalidated with {} unanswered requests",
                self.pending.len()
            );
            self.pending.clear();
        }

        self.link.disconnect();
        info!("Services invalidated, disconnected");

        let _ = self
            .event_sender
            .send(SessionEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        let _ = self.event_sender.send(SessionEvent::HandleCheck);
    }

    /// Last serial number decoded in this session
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_ready(&self) -> bool {
        self.request.is_some() && self.response.is_some()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}
