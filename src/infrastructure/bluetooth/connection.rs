//! BLE Connection Module
//!
//! WinRT implementation of [`GattLink`]: connects by Bluetooth address,
//! caches the UART service's characteristics and forwards notifications,
//! write completions and disconnects as [`LinkEvent`]s.
//!
//! Everything that has to be awaited (GATT session, service access, the
//! Notify descriptor write) happens in [`WinRtLink::connect`]. The
//! [`GattLink`] methods the dispatcher calls never block.

use crate::infrastructure::bluetooth::dispatcher::UartLayout;
use crate::infrastructure::bluetooth::error::LinkError;
use crate::infrastructure::bluetooth::link::{GattLink, LinkEvent};
use crate::infrastructure::bluetooth::protocol;
use anyhow::Result;
use tokio::sync::mpsc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattClientCharacteristicConfigurationDescriptorValue,
    GattCommunicationStatus, GattSession, GattValueChangedEventArgs, GattWriteOption,
};
use windows::Devices::Bluetooth::{BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};
use windows_future::AsyncOperationCompletedHandler;

const SUBSCRIBE_ATTEMPTS: u32 = 3;

/// Connected peripheral exposing the UART service
pub struct WinRtLink {
    device: BluetoothLEDevice,
    session: Option<GattSession>,
    service_uuid: GUID,
    characteristics: Vec<GattCharacteristic>,
    /// Characteristic whose Notify descriptor was written during connect
    notify_armed: Option<GUID>,
    event_sender: mpsc::UnboundedSender<LinkEvent>,
    notify_token: Option<(GattCharacteristic, i64)>,
    status_token: Option<i64>,
    closed: bool,
}

impl WinRtLink {
    /// Connect to a device, discover the UART service, write the response
    /// characteristic's Notify descriptor and report [`LinkEvent::Ready`].
    ///
    /// A missing response characteristic or a failed subscription does not
    /// fail the connect; readiness fails later in the dispatcher instead.
    pub async fn connect(
        address: u64,
        layout: &UartLayout,
        event_sender: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Self> {
        info!("Connecting to Bluetooth device: {:#X}", address);

        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)?.await?;
        info!("Device connected: {:?}", device.Name()?);

        // Keep the link up between our writes
        let session = match create_gatt_session(&device).await {
            Ok(session) => {
                info!("GattSession created, MaintainConnection set to true");
                Some(session)
            }
            Err(e) => {
                warn!("Failed to create GattSession, continuing anyway: {}", e);
                None
            }
        };

        let service_uuid = protocol::parse_uuid(&layout.service_uuid)?;
        let services_result = device.GetGattServicesForUuidAsync(service_uuid)?.await?;

        if services_result.Status()? != GattCommunicationStatus::Success {
            anyhow::bail!(
                "Failed to get GATT services: {:?}",
                services_result.Status()?
            );
        }

        let services = services_result.Services()?;
        if services.Size()? == 0 {
            anyhow::bail!("UART service not found");
        }
        let service = services.GetAt(0)?;

        info!("Requesting service access...");
        let access_status = service.RequestAccessAsync()?.await?;
        info!("Service access status: {:?}", access_status);

        let chars_result = service.GetCharacteristicsAsync()?.await?;
        if chars_result.Status()? != GattCommunicationStatus::Success {
            anyhow::bail!("Failed to get characteristics");
        }

        let found = chars_result.Characteristics()?;
        let mut characteristics = Vec::with_capacity(found.Size()? as usize);
        for i in 0..found.Size()? {
            characteristics.push(found.GetAt(i)?);
        }
        info!("Found {} characteristics", characteristics.len());

        let response_uuid = protocol::parse_uuid(&layout.response_char_uuid)?;
        let mut notify_armed = None;
        match characteristics
            .iter()
            .find(|c| c.Uuid().map(|u| u == response_uuid).unwrap_or(false))
        {
            Some(response) => match subscribe_notify(response).await {
                Ok(()) => notify_armed = Some(response_uuid),
                Err(e) => error!("Failed to enable notifications: {}", e),
            },
            None => warn!("Response characteristic not found"),
        }

        // Disconnects surface as invalidated services
        let sender = event_sender.clone();
        let status_handler =
            TypedEventHandler::new(move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
                if let Some(dev) = dev.as_ref() {
                    if dev.ConnectionStatus()? == BluetoothConnectionStatus::Disconnected {
                        let _ = sender.send(LinkEvent::ServicesInvalidated);
                    }
                }
                Ok(())
            });
        let status_token = device.ConnectionStatusChanged(&status_handler)?;

        let _ = event_sender.send(LinkEvent::Ready);

        Ok(Self {
            device,
            session,
            service_uuid,
            characteristics,
            notify_armed,
            event_sender,
            notify_token: None,
            status_token: Some(status_token),
            closed: false,
        })
    }
}

impl GattLink for WinRtLink {
    type Characteristic = GattCharacteristic;

    fn is_connected(&self) -> bool {
        !self.closed
            && self
                .device
                .ConnectionStatus()
                .map(|s| s == BluetoothConnectionStatus::Connected)
                .unwrap_or(false)
    }

    fn find_characteristic(
        &self,
        service_uuid: &str,
        characteristic_uuid: &str,
    ) -> Option<GattCharacteristic> {
        let service = protocol::parse_uuid(service_uuid).ok()?;
        if service != self.service_uuid {
            return None;
        }

        let wanted = protocol::parse_uuid(characteristic_uuid).ok()?;
        self.characteristics
            .iter()
            .find(|c| c.Uuid().map(|u| u == wanted).unwrap_or(false))
            .cloned()
    }

    fn enable_notifications(&mut self, characteristic: &GattCharacteristic) -> Result<(), LinkError> {
        let uuid = characteristic.Uuid().map_err(platform)?;
        if self.notify_armed != Some(uuid) {
            return Err(LinkError::Status(
                "Notify descriptor was not written".to_string(),
            ));
        }

        let sender = self.event_sender.clone();
        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<GattCharacteristic>,
                  args: windows::core::Ref<GattValueChangedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let bytes = read_buffer(&args.CharacteristicValue()?)?;
                    let _ = sender.send(LinkEvent::Notification(bytes));
                }
                Ok(())
            },
        );
        let token = characteristic.ValueChanged(&handler).map_err(platform)?;
        if let Some((previous, old_token)) = self.notify_token.replace((characteristic.clone(), token)) {
            let _ = previous.RemoveValueChanged(old_token);
        }

        debug!("Notification handler registered");
        Ok(())
    }

    fn write_without_response(
        &mut self,
        characteristic: &GattCharacteristic,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let writer = DataWriter::new().map_err(platform)?;
        writer.WriteBytes(payload).map_err(platform)?;
        let buffer = writer.DetachBuffer().map_err(platform)?;

        let operation = characteristic
            .WriteValueWithOptionAsync(&buffer, GattWriteOption::WriteWithoutResponse)
            .map_err(platform)?;

        let sender = self.event_sender.clone();
        let payload = payload.to_vec();
        operation
            .SetCompleted(&AsyncOperationCompletedHandler::new(move |op, _| {
                let result = match op.as_ref().map(|op| op.GetResults()) {
                    Some(Ok(GattCommunicationStatus::Success)) => Ok(()),
                    Some(Ok(status)) => Err(LinkError::Status(format!("{:?}", status))),
                    Some(Err(e)) => Err(platform(e)),
                    None => Err(LinkError::Platform("write operation dropped".to_string())),
                };
                let _ = sender.send(LinkEvent::WriteCompleted {
                    payload: payload.clone(),
                    result,
                });
                Ok(())
            }))
            .map_err(platform)?;

        Ok(())
    }

    fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some((characteristic, token)) = self.notify_token.take() {
            let _ = characteristic.RemoveValueChanged(token);
        }
        if let Some(token) = self.status_token.take() {
            let _ = self.device.RemoveConnectionStatusChanged(token);
        }
        self.characteristics.clear();
        self.notify_armed = None;
        if let Some(session) = self.session.take() {
            let _ = session.Close();
        }
        let _ = self.device.Close();

        debug!("Device handle closed");
    }
}

impl Drop for WinRtLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn create_gatt_session(device: &BluetoothLEDevice) -> windows::core::Result<GattSession> {
    let device_id = device.BluetoothDeviceId()?;
    let session = GattSession::FromDeviceIdAsync(&device_id)?.await?;
    session.SetMaintainConnection(true)?;
    Ok(session)
}

/// Write the Notify value to the characteristic's CCCD, retrying on failure
async fn subscribe_notify(characteristic: &GattCharacteristic) -> Result<()> {
    info!("Enabling notifications...");

    for attempt in 1..=SUBSCRIBE_ATTEMPTS {
        match characteristic
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::Notify,
            )?
            .await
        {
            Ok(GattCommunicationStatus::Success) => {
                info!("Notifications enabled successfully");
                return Ok(());
            }
            Ok(status) => {
                warn!("Notification subscription returned status: {:?}", status);
                if attempt < SUBSCRIBE_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
            Err(e) => {
                warn!("Notification subscription attempt {} failed: {}", attempt, e);
                if attempt < SUBSCRIBE_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                }
            }
        }
    }

    anyhow::bail!(
        "Notification subscription failed after {} attempts",
        SUBSCRIBE_ATTEMPTS
    )
}

fn read_buffer(buffer: &IBuffer) -> windows::core::Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let length = reader.UnconsumedBufferLength()? as usize;
    let mut bytes = vec![0u8; length];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}

fn platform(e: windows::core::Error) -> LinkError {
    LinkError::Platform(e.to_string())
}
