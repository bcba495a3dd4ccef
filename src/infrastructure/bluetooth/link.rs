//! Platform link abstraction
//!
//! The dispatcher never talks to a Bluetooth stack directly. It holds a
//! [`GattLink`] that exposes the few capabilities it needs, and receives the
//! stack's asynchronous callbacks as [`LinkEvent`]s over a channel.

use crate::infrastructure::bluetooth::error::LinkError;

/// Connect/write/subscribe capabilities of one connected peripheral
pub trait GattLink {
    /// Handle to a discovered characteristic
    type Characteristic: Clone;

    fn is_connected(&self) -> bool;

    /// Look up a characteristic inside a service, both by UUID string
    fn find_characteristic(
        &self,
        service_uuid: &str,
        characteristic_uuid: &str,
    ) -> Option<Self::Characteristic>;

    /// Subscribe to notifications. Incoming values are delivered as
    /// [`LinkEvent::Notification`].
    fn enable_notifications(&mut self, characteristic: &Self::Characteristic)
        -> Result<(), LinkError>;

    /// Queue a write without response. An `Ok` only means the write was
    /// handed to the stack; the outcome arrives later as
    /// [`LinkEvent::WriteCompleted`].
    fn write_without_response(
        &mut self,
        characteristic: &Self::Characteristic,
        payload: &[u8],
    ) -> Result<(), LinkError>;

    fn disconnect(&mut self);
}

/// Callbacks from the platform stack, in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Connection is up and service discovery has finished
    Ready,
    Notification(Vec<u8>),
    WriteCompleted {
        payload: Vec<u8>,
        result: Result<(), LinkError>,
    },
    /// Peripheral disconnected or its services changed
    ServicesInvalidated,
}
