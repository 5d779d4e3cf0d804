use std::path::PathBuf;
use std::time::Duration;

use crate::models::cancel::CancelFlag;
use crate::models::config::SaveRequest;
use crate::models::error::CaptureError;

/// A continuously-running rolling capture bound to one device.
///
/// Implemented by the platform capture engine. The registry creates at most
/// one per device key, shares it between every subscription on that key, and
/// is the only caller of [`dispose`](Self::dispose).
pub trait CaptureResource: Send + Sync + 'static {
    /// Handle produced by a [`DeviceResolver`](super::device_resolver::DeviceResolver).
    type Device: Send;

    /// Start capturing from `device`, retaining at least `required_duration`.
    ///
    /// Runs under the registry-wide lock, so it must return quickly. Defer
    /// slow device start-up to a worker owned by the resource.
    fn open(device: Self::Device, required_duration: Duration) -> Result<Self, CaptureError>
    where
        Self: Sized;

    /// Live device identifier. Must not be cached by callers; a default
    /// device remap shows up here.
    fn device_id(&self) -> String;

    fn required_duration(&self) -> Duration;

    /// Change the retained window. Must be cheap and must not block on I/O;
    /// any resize work is deferred inside the resource.
    fn set_required_duration(&self, duration: Duration);

    /// Persist the trailing `request.duration` to `request.output_path`.
    ///
    /// May block on file I/O and may be called concurrently from several
    /// subscriptions. Returns [`CaptureError::Cancelled`] when `cancel` fires.
    fn save(&self, request: &SaveRequest, cancel: &CancelFlag) -> Result<PathBuf, CaptureError>;

    /// Stop capturing and release the device.
    ///
    /// Runs under the registry-wide lock, like [`open`](Self::open). Signal
    /// capture threads to stop rather than joining them here.
    fn dispose(&self);
}
