use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::status::DeviceStatus;
use crate::models::subscription_id::SubscriptionId;
use crate::sharing::duration::max_required;
use crate::sharing::subscription::Subscription;
use crate::sharing::table::DeviceTable;
use crate::traits::capture_resource::CaptureResource;
use crate::traits::registry_delegate::RegistryDelegate;

/// Outcome of removing one subscription from a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Detach {
    /// Removed; other subscriptions remain. `resized` carries the new
    /// retained window if removing the member lowered it.
    Detached {
        remaining: usize,
        resized: Option<Duration>,
    },
    /// Removed the last subscription and closed the set to new members.
    /// The owner must drop the set from its table and call `close`.
    Empty,
    /// The caller is the last subscription but the fast path may not empty
    /// the set; retry through the owning table.
    NeedsOwner,
    /// Unknown subscription, or the set was already closed.
    Gone,
}

/// Mutable state guarded by the per-device lock.
struct SetState {
    subscribers: HashMap<SubscriptionId, Duration>,
    applied: Duration,
    closed: bool,
    disposed: bool,
}

/// All live subscriptions for one device key, and the capture resource they
/// share.
///
/// Keeps `resource.required_duration()` equal to the longest duration any
/// member asks for. Membership and the applied duration change only under
/// this set's own lock, so unrelated devices never contend. Delegate
/// notifications are sent after that lock is released.
pub struct DeviceSubscriberSet<C: CaptureResource> {
    device_key: String,
    resource: C,
    created_at: DateTime<Utc>,
    owner: Weak<DeviceTable<C>>,
    delegate: Option<Arc<dyn RegistryDelegate>>,
    state: Mutex<SetState>,
}

impl<C: CaptureResource> DeviceSubscriberSet<C> {
    pub(crate) fn new(
        device_key: String,
        resource: C,
        owner: Weak<DeviceTable<C>>,
        delegate: Option<Arc<dyn RegistryDelegate>>,
    ) -> Self {
        let applied = resource.required_duration();
        Self {
            device_key,
            resource,
            created_at: Utc::now(),
            owner,
            delegate,
            state: Mutex::new(SetState {
                subscribers: HashMap::new(),
                applied,
                closed: false,
                disposed: false,
            }),
        }
    }

    pub fn device_key(&self) -> &str {
        &self.device_key
    }

    /// Live device identifier from the capture resource.
    pub fn device_id(&self) -> String {
        self.resource.device_id()
    }

    /// When the capture resource was opened.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Duration last applied to the capture resource.
    pub fn required_duration(&self) -> Duration {
        self.state.lock().applied
    }

    /// Whether the set has stopped accepting members. Its resource is
    /// disposed, or about to be.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn status(&self) -> DeviceStatus {
        let (subscribers, required_duration) = {
            let state = self.state.lock();
            (state.subscribers.len(), state.applied)
        };
        DeviceStatus {
            device_key: self.device_key.clone(),
            device_id: self.resource.device_id(),
            subscribers,
            required_duration,
            created_at: self.created_at,
        }
    }

    /// Attach a new subscription that needs `duration` of trailing audio.
    ///
    /// The resource grows immediately if `duration` is the new maximum.
    /// Fails with `InvalidOperationOnDisposed` once the set has been closed.
    pub fn subscribe(
        self: &Arc<Self>,
        duration: Duration,
    ) -> Result<Subscription<C>, CaptureError> {
        let (subscription, resized) = self.attach(duration)?;
        self.notify_resized(resized);
        Ok(subscription)
    }

    /// Attach without notifying the delegate, for callers that still hold
    /// the table lock. Returns the new retained window if it grew.
    pub(crate) fn attach(
        self: &Arc<Self>,
        duration: Duration,
    ) -> Result<(Subscription<C>, Option<Duration>), CaptureError> {
        let id = SubscriptionId::new();
        let resized = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(CaptureError::InvalidOperationOnDisposed);
            }
            state.subscribers.insert(id, duration);
            log::trace!(
                "subscription {} attached to {} ({} live)",
                id,
                self.device_key,
                state.subscribers.len()
            );
            self.apply_max(&mut state)
        };
        Ok((Subscription::new(id, Arc::clone(self), duration), resized))
    }

    pub(crate) fn resource(&self) -> &C {
        &self.resource
    }

    /// Record a new duration for `id` and recompute the maximum.
    ///
    /// Returns `false` if the set is closed or `id` is not a member.
    pub(crate) fn update(&self, id: SubscriptionId, duration: Duration) -> bool {
        let resized = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            match state.subscribers.get_mut(&id) {
                Some(current) => *current = duration,
                None => return false,
            }
            self.apply_max(&mut state)
        };
        self.notify_resized(resized);
        true
    }

    /// Detach `id` without the owner's lock. Refuses to remove the last
    /// member, since emptying the set is a table transition.
    pub(crate) fn detach_shared(&self, id: SubscriptionId) -> Detach {
        let mut state = self.state.lock();
        if state.closed || !state.subscribers.contains_key(&id) {
            return Detach::Gone;
        }
        if state.subscribers.len() == 1 {
            return Detach::NeedsOwner;
        }
        state.subscribers.remove(&id);
        Detach::Detached {
            remaining: state.subscribers.len(),
            resized: self.apply_max(&mut state),
        }
    }

    /// Detach `id` unconditionally. Callers must hold the owning table's
    /// lock (or be the sole owner) so that `Empty` can be acted on before any
    /// new subscriber looks the device up. An emptied set is closed before
    /// the lock is released, so nothing can join it on the way to disposal.
    pub(crate) fn detach(&self, id: SubscriptionId) -> Detach {
        let mut state = self.state.lock();
        if state.closed || state.subscribers.remove(&id).is_none() {
            return Detach::Gone;
        }
        if state.subscribers.is_empty() {
            state.closed = true;
            return Detach::Empty;
        }
        Detach::Detached {
            remaining: state.subscribers.len(),
            resized: self.apply_max(&mut state),
        }
    }

    /// Called by a subscription when it is disposed.
    pub(crate) fn release(self: &Arc<Self>, id: SubscriptionId) {
        match self.detach_shared(id) {
            Detach::Detached { remaining, resized } => {
                log::trace!(
                    "subscription {} detached from {} ({} live)",
                    id,
                    self.device_key,
                    remaining
                );
                self.notify_resized(resized);
            }
            Detach::NeedsOwner => match self.owner.upgrade() {
                Some(table) => table.detach_last(self, id),
                None => match self.detach(id) {
                    Detach::Empty => {
                        if self.close() {
                            self.notify_disposed();
                        }
                    }
                    Detach::Detached { resized, .. } => self.notify_resized(resized),
                    Detach::NeedsOwner | Detach::Gone => {}
                },
            },
            Detach::Empty | Detach::Gone => {}
        }
    }

    /// Dispose the capture resource. Idempotent; the resource sees exactly
    /// one `dispose` call. Returns whether this call disposed it, in which
    /// case the caller reports it through [`notify_disposed`](Self::notify_disposed)
    /// once its own locks are released.
    pub(crate) fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return false;
            }
            state.closed = true;
            state.disposed = true;
            state.subscribers.clear();
        }

        self.resource.dispose();
        log::debug!("disposed capture resource for {}", self.device_key);
        true
    }

    pub(crate) fn notify_resized(&self, resized: Option<Duration>) {
        if let (Some(duration), Some(delegate)) = (resized, self.delegate.as_ref()) {
            delegate.on_required_duration_changed(&self.device_key, duration);
        }
    }

    pub(crate) fn notify_disposed(&self) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_resource_disposed(&self.device_key);
        }
    }

    /// Apply the current maximum to the resource. Returns it if it changed.
    fn apply_max(&self, state: &mut SetState) -> Option<Duration> {
        let max = max_required(state.subscribers.values())?;
        if max == state.applied {
            return None;
        }

        state.applied = max;
        self.resource.set_required_duration(max);
        log::trace!("{} now retains {:?}", self.device_key, max);
        Some(max)
    }
}
