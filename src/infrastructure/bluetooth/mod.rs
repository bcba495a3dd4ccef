//! Bluetooth Module
//!
//! BLE communication with peripherals exposing a Nordic-UART-style service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      BatchTester                         │
//! │        (scan a serial range, check each device)          │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌────────────┐
//! │  Scanner  │  │  Session   │  │ Dispatcher │
//! │           │  │            │  │            │
//! │ - BLE     │  │ - event    │  │ - pending  │
//! │  discovery│  │   loop     │  │   tags     │
//! │           │  │ - unlock   │  │ - handlers │
//! └───────────┘  └─────┬──────┘  └─────┬──────┘
//!                      │  LinkEvent    │ GattLink
//!                      └──────┬────────┘
//!                             ▼
//!                     ┌──────────────┐
//!                     │  WinRtLink   │
//!                     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUIDs, command strings and reply decoding
//! - [`link`] - Platform capability trait and its events
//! - [`dispatcher`] - Pending request queue and reply handlers
//! - [`session`] - Per-device event loop
//! - [`service`] - Batch tester
//! - `scanner`, `connection` - WinRT backend (Windows only)

#[cfg(windows)]
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod link;
pub mod protocol;
#[cfg(windows)]
pub mod scanner;
pub mod service;
pub mod session;

pub use dispatcher::{CommandDispatcher, NotificationOutcome, UartLayout};
pub use error::{DispatchError, LinkError};
pub use link::{GattLink, LinkEvent};
