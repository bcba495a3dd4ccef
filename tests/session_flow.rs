//! End-to-end session flow against a scripted link.

use ble_uart_tester::domain::models::{DeviceType, SessionEvent};
use ble_uart_tester::domain::serial::SerialRange;
use ble_uart_tester::infrastructure::bluetooth::service::evaluate_outcome;
use ble_uart_tester::infrastructure::bluetooth::session::{drive_session, SessionOutcome};
use ble_uart_tester::infrastructure::bluetooth::{
    CommandDispatcher, GattLink, LinkError, LinkEvent, UartLayout,
};
use tokio::sync::mpsc;

#[derive(Default)]
struct ScriptedLink {
    connected: bool,
    has_uart: bool,
    writes: Vec<Vec<u8>>,
    disconnected: bool,
}

impl GattLink for ScriptedLink {
    type Characteristic = &'static str;

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn find_characteristic(&self, _service: &str, characteristic: &str) -> Option<&'static str> {
        if !self.has_uart {
            return None;
        }
        if characteristic.ends_with("0002-b5a3-f393-e0a9-e50e24dcca9e") {
            Some("request")
        } else {
            Some("response")
        }
    }

    fn enable_notifications(&mut self, characteristic: &&'static str) -> Result<(), LinkError> {
        assert_eq!(*characteristic, "response");
        Ok(())
    }

    fn write_without_response(
        &mut self,
        characteristic: &&'static str,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        assert_eq!(*characteristic, "request");
        self.writes.push(payload.to_vec());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.disconnected = true;
    }
}

struct Harness {
    dispatcher: CommandDispatcher<ScriptedLink>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

fn harness(link: ScriptedLink) -> Harness {
    let (link_tx, link_rx) = mpsc::unbounded_channel();
    let (session_tx, session_rx) = mpsc::unbounded_channel();
    Harness {
        dispatcher: CommandDispatcher::new(link, UartLayout::default(), session_tx),
        link_tx,
        link_rx,
        session_rx,
    }
}

fn uart_link() -> ScriptedLink {
    ScriptedLink {
        connected: true,
        has_uart: true,
        ..Default::default()
    }
}

fn version_reply(serial: &str) -> Vec<u8> {
    let mut payload = vec![0x10, 0x00, 0x4C, 0x10];
    let mut field = serial.as_bytes().to_vec();
    field.resize(16, 0);
    payload.extend(field);
    payload
}

#[tokio::test]
async fn test_unlock_then_serial() {
    let mut h = harness(uart_link());

    h.link_tx.send(LinkEvent::Ready).unwrap();
    h.link_tx
        .send(LinkEvent::WriteCompleted {
            payload: b"pin.master".to_vec(),
            result: Ok(()),
        })
        .unwrap();
    h.link_tx
        .send(LinkEvent::Notification(b"pin.ok".to_vec()))
        .unwrap();
    h.link_tx
        .send(LinkEvent::Notification(version_reply("D24010105")))
        .unwrap();

    let outcome = drive_session(
        &mut h.dispatcher,
        &mut h.link_rx,
        &mut h.session_rx,
        "master",
    )
    .await;

    assert_eq!(outcome, SessionOutcome::Serial("D24010105".to_string()));
    assert_eq!(
        h.dispatcher.link().writes,
        vec![b"pin.master".to_vec(), b"serial".to_vec()]
    );
    assert_eq!(h.dispatcher.serial_number(), Some("D24010105"));
    assert_eq!(h.dispatcher.pending_len(), 0);

    let range = SerialRange::parse("24010100", "24010120").unwrap();
    assert!(evaluate_outcome(&outcome, &range, DeviceType::Online).is_ok());
    assert!(evaluate_outcome(&outcome, &range, DeviceType::Voice).is_err());
}

#[tokio::test]
async fn test_missing_uart_service() {
    let mut h = harness(ScriptedLink {
        connected: true,
        ..Default::default()
    });
    h.link_tx.send(LinkEvent::Ready).unwrap();

    let outcome = drive_session(
        &mut h.dispatcher,
        &mut h.link_rx,
        &mut h.session_rx,
        "master",
    )
    .await;

    assert!(matches!(outcome, SessionOutcome::NotReady(_)));
    assert!(h.dispatcher.link().writes.is_empty());
}

#[tokio::test]
async fn test_invalidated_mid_session() {
    let mut h = harness(uart_link());
    h.link_tx.send(LinkEvent::Ready).unwrap();
    h.link_tx.send(LinkEvent::ServicesInvalidated).unwrap();

    let outcome = drive_session(
        &mut h.dispatcher,
        &mut h.link_rx,
        &mut h.session_rx,
        "master",
    )
    .await;

    assert_eq!(outcome, SessionOutcome::Invalidated);
    assert!(h.dispatcher.link().disconnected);
    assert_eq!(h.dispatcher.pending_len(), 0);
}

#[tokio::test]
async fn test_short_version_reply() {
    let mut h = harness(uart_link());
    h.link_tx.send(LinkEvent::Ready).unwrap();
    h.link_tx
        .send(LinkEvent::Notification(b"pin.ok".to_vec()))
        .unwrap();
    h.link_tx
        .send(LinkEvent::Notification(b"\x10\x00D24".to_vec()))
        .unwrap();

    let outcome = drive_session(
        &mut h.dispatcher,
        &mut h.link_rx,
        &mut h.session_rx,
        "master",
    )
    .await;

    assert!(matches!(outcome, SessionOutcome::Malformed(_)));
}

#[tokio::test]
async fn test_rejected_pin_ends_session() {
    let mut h = harness(uart_link());
    h.link_tx.send(LinkEvent::Ready).unwrap();
    h.link_tx
        .send(LinkEvent::Notification(b"pin.bad".to_vec()))
        .unwrap();

    // link_tx stays open: the session must end on the reply alone
    let outcome = drive_session(
        &mut h.dispatcher,
        &mut h.link_rx,
        &mut h.session_rx,
        "0000",
    )
    .await;

    assert_eq!(outcome, SessionOutcome::PinRejected);
    assert_eq!(h.dispatcher.link().writes, vec![b"pin.0000".to_vec()]);
    assert_eq!(h.dispatcher.serial_number(), None);

    let range = SerialRange::parse("24010100", "24010120").unwrap();
    assert_eq!(
        evaluate_outcome(&outcome, &range, DeviceType::Online),
        Err("PIN rejected".to_string())
    );
    drop(h.link_tx);
}

#[tokio::test]
async fn test_stray_notification_then_link_closes() {
    let mut h = harness(uart_link());
    // Nothing pending yet, dropped
    h.link_tx
        .send(LinkEvent::Notification(version_reply("D24010105")))
        .unwrap();
    drop(h.link_tx);

    let outcome = drive_session(
        &mut h.dispatcher,
        &mut h.link_rx,
        &mut h.session_rx,
        "master",
    )
    .await;

    assert_eq!(outcome, SessionOutcome::LinkClosed);
    assert!(h.dispatcher.link().writes.is_empty());
    assert_eq!(h.dispatcher.serial_number(), None);
}
