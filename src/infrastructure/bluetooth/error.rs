use thiserror::Error;

/// Failures reported by the platform link
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("device is not connected")]
    NotConnected,
    #[error("GATT operation failed with status {0}")]
    Status(String),
    #[error("platform error: {0}")]
    Platform(String),
}

/// Failures surfaced by the command dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{0} characteristic not found in UART service")]
    MissingCharacteristic(&'static str),
    #[error("failed to enable notifications: {0}")]
    Subscribe(#[source] LinkError),
    #[error("hardware version payload is {len} bytes, expected at least {expected}")]
    ShortPayload { len: usize, expected: usize },
}
