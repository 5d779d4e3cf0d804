use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::cancel::CancelFlag;
use crate::models::config::SaveRequest;
use crate::models::error::CaptureError;
use crate::models::subscription_id::SubscriptionId;
use crate::sharing::subscriber_set::DeviceSubscriberSet;
use crate::traits::capture_resource::CaptureResource;

struct SubscriptionState {
    required_duration: Duration,
    disposed: bool,
}

/// One caller's view of a shared capture resource.
///
/// Holds the trailing-window duration this caller needs. Disposing the
/// subscription (explicitly or by dropping it) detaches it from its device;
/// the shared resource is only torn down once every subscription for the
/// device has gone.
pub struct Subscription<C: CaptureResource> {
    id: SubscriptionId,
    set: Arc<DeviceSubscriberSet<C>>,
    attached_at: DateTime<Utc>,
    state: Mutex<SubscriptionState>,
}

impl<C: CaptureResource> Subscription<C> {
    pub(crate) fn new(
        id: SubscriptionId,
        set: Arc<DeviceSubscriberSet<C>>,
        required_duration: Duration,
    ) -> Self {
        Self {
            id,
            set,
            attached_at: Utc::now(),
            state: Mutex::new(SubscriptionState {
                required_duration,
                disposed: false,
            }),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn device_key(&self) -> &str {
        self.set.device_key()
    }

    /// Live device identifier, read through to the capture resource.
    pub fn device_id(&self) -> String {
        self.set.device_id()
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }

    pub fn required_duration(&self) -> Duration {
        self.state.lock().required_duration
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Change how much trailing audio this subscription needs.
    ///
    /// Setting the current value again does nothing. Otherwise the device's
    /// retained window is recomputed across all of its subscriptions.
    pub fn set_required_duration(&self, duration: Duration) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(CaptureError::InvalidOperationOnDisposed);
        }
        if state.required_duration == duration {
            return Ok(());
        }
        if !self.set.update(self.id, duration) {
            return Err(CaptureError::InvalidOperationOnDisposed);
        }
        state.required_duration = duration;
        Ok(())
    }

    /// Persist the trailing window described by `request`.
    ///
    /// Runs on the caller's thread without holding any lock of this crate.
    /// The resource's result, including `Cancelled`, is returned unchanged.
    pub fn save(
        &self,
        request: &SaveRequest,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, CaptureError> {
        if self.is_disposed() || self.set.is_closed() {
            return Err(CaptureError::InvalidOperationOnDisposed);
        }
        self.set.resource().save(request, cancel)
    }

    /// Detach from the device. Idempotent.
    pub fn dispose(&self) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }
        self.set.release(self.id);
    }
}

impl<C: CaptureResource> Drop for Subscription<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<C: CaptureResource> fmt::Debug for Subscription<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("device_key", &self.set.device_key())
            .field("required_duration", &state.required_duration)
            .field("disposed", &state.disposed)
            .finish()
    }
}
