use thiserror::Error;

/// Errors surfaced by the shared buffer registry and its subscriptions.
///
/// The core never retries or logs these; they go straight back to the caller
/// of the public operation that failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The device key did not resolve to a live device when a new capture
    /// resource had to be created.
    #[error("device not found: {device_key}")]
    DeviceNotFound { device_key: String },

    /// The device resolved but its capture resource could not be opened.
    #[error("capture resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The capture resource failed to persist its trailing window.
    #[error("save failed: {0}")]
    ResourceSaveFailed(String),

    /// The caller cancelled a save while it was in flight.
    #[error("save cancelled")]
    Cancelled,

    /// The subscription (or the registry behind it) has already been disposed.
    #[error("subscription already disposed")]
    InvalidOperationOnDisposed,

    #[error("invalid save settings: {0}")]
    InvalidSaveSettings(String),
}

impl CaptureError {
    pub fn device_not_found(device_key: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device_key: device_key.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
