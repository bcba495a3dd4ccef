//! BLE UART tester
//!
//! Unlocks devices exposing a Nordic-UART-style GATT service with a PIN,
//! reads their serial number and checks it against a configured range.

pub mod domain;
pub mod infrastructure;
