//! Device Session
//!
//! Drives one connected peripheral through the unlock and version check:
//! `pin.<code>` → `pin.ok` → `serial` → hardware version reply.

use crate::domain::models::{PendingRequestTag, SessionEvent};
use crate::infrastructure::bluetooth::dispatcher::{CommandDispatcher, NotificationOutcome};
use crate::infrastructure::bluetooth::link::{GattLink, LinkEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Serial number read from the device
    Serial(String),
    /// The UART service could not be set up
    NotReady(String),
    /// The device answered the pin command without `pin.ok`
    PinRejected,
    /// The hardware version reply could not be decoded
    Malformed(String),
    /// Services went away before the serial arrived
    Invalidated,
    /// The platform closed its event channel
    LinkClosed,
}

/// Feed platform events into `dispatcher` until the session produces a
/// serial number or ends.
///
/// Events from both channels are handled one at a time on the calling task;
/// this is what keeps dispatcher callbacks from overlapping.
pub async fn drive_session<L: GattLink>(
    dispatcher: &mut CommandDispatcher<L>,
    link_events: &mut mpsc::UnboundedReceiver<LinkEvent>,
    session_events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    pin_code: &str,
) -> SessionOutcome {
    loop {
        tokio::select! {
            biased;

            Some(event) = session_events.recv() => match event {
                SessionEvent::VersionChecked(serial) => {
                    info!("Serial number: {}", serial);
                    return SessionOutcome::Serial(serial);
                }
                SessionEvent::HandleCheck => return SessionOutcome::Invalidated,
                SessionEvent::ConnectionStatus(status) => {
                    debug!("Connection status: {:?}", status);
                }
            },

            event = link_events.recv() => match event {
                None => {
                    warn!("Link event channel closed");
                    return SessionOutcome::LinkClosed;
                }
                Some(LinkEvent::Ready) => {
                    if let Err(e) = dispatcher.on_device_ready() {
                        return SessionOutcome::NotReady(e.to_string());
                    }
                    dispatcher.send_pin_command(pin_code, PendingRequestTag::PinCode);
                }
                Some(LinkEvent::Notification(payload)) => match dispatcher.on_notification(&payload) {
                    Ok(NotificationOutcome::PinRejected) => {
                        warn!("Device rejected pin code");
                        return SessionOutcome::PinRejected;
                    }
                    Ok(_) => {}
                    Err(e) => return SessionOutcome::Malformed(e.to_string()),
                },
                Some(LinkEvent::WriteCompleted { payload, result }) => {
                    dispatcher.on_write_complete(&payload, &result);
                }
                Some(LinkEvent::ServicesInvalidated) => {
                    dispatcher.on_services_invalidated();
                }
            },
        }
    }
}
