use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::models::subscription_id::SubscriptionId;
use crate::sharing::subscriber_set::{Detach, DeviceSubscriberSet};
use crate::traits::capture_resource::CaptureResource;

type Devices<C> = HashMap<String, Arc<DeviceSubscriberSet<C>>>;

/// Device-keyed table of subscriber sets.
///
/// Its lock covers only the create/remove transitions: looking a key up and
/// creating its set, and dropping a set once its last member detaches.
/// Lock order is always table, then set.
pub(crate) struct DeviceTable<C: CaptureResource> {
    devices: Mutex<Devices<C>>,
}

impl<C: CaptureResource> DeviceTable<C> {
    pub(crate) fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Devices<C>> {
        self.devices.lock()
    }

    pub(crate) fn get(&self, device_key: &str) -> Option<Arc<DeviceSubscriberSet<C>>> {
        self.devices.lock().get(device_key).cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<DeviceSubscriberSet<C>>> {
        self.devices.lock().values().cloned().collect()
    }

    /// Remove the last subscription of `set`. If that empties it, the set
    /// leaves the table and its resource is disposed before the lock is
    /// released, so a concurrent `get_or_add` either saw the old set with a
    /// member still in it or sees no set at all. Delegates hear about it
    /// after the lock is released.
    pub(crate) fn detach_last(&self, set: &Arc<DeviceSubscriberSet<C>>, id: SubscriptionId) {
        let outcome = {
            let mut devices = self.devices.lock();
            let outcome = set.detach(id);
            if outcome == Detach::Empty {
                let registered = devices
                    .get(set.device_key())
                    .is_some_and(|current| Arc::ptr_eq(current, set));
                if registered {
                    devices.remove(set.device_key());
                }
                if !set.close() {
                    return;
                }
            }
            outcome
        };

        match outcome {
            Detach::Empty => set.notify_disposed(),
            Detach::Detached { remaining, resized } => {
                log::trace!(
                    "subscription {} detached from {} ({} live)",
                    id,
                    set.device_key(),
                    remaining
                );
                set.notify_resized(resized);
            }
            Detach::NeedsOwner | Detach::Gone => {}
        }
    }

    /// Close every set and empty the table. Returns the sets whose resource
    /// this call disposed.
    pub(crate) fn drain(&self) -> Vec<Arc<DeviceSubscriberSet<C>>> {
        let closed: Vec<_> = {
            let mut devices = self.devices.lock();
            devices.drain().map(|(_, set)| set).filter(|set| set.close()).collect()
        };
        for set in &closed {
            set.notify_disposed();
        }
        closed
    }
}
