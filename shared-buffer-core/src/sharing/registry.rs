use std::sync::Arc;
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::state::DeviceState;
use crate::models::status::DeviceStatus;
use crate::sharing::subscriber_set::DeviceSubscriberSet;
use crate::sharing::subscription::Subscription;
use crate::sharing::table::DeviceTable;
use crate::traits::capture_resource::CaptureResource;
use crate::traits::device_resolver::DeviceResolver;
use crate::traits::registry_delegate::RegistryDelegate;

/// Device-keyed owner of shared capture resources.
///
/// The first [`get_or_add`](Self::get_or_add) for a key resolves the device
/// and opens its capture resource; the resource is disposed as soon as the
/// last subscription for that key detaches. Hosts typically keep one
/// registry for the life of the process and call [`dispose`](Self::dispose)
/// on shutdown.
///
/// ```text
/// get_or_add(key, d) ─→ [DeviceTable] ─→ [DeviceSubscriberSet] ─→ Subscription
///                            ↑                  │ owns
///                            └── last detach ── CaptureResource
/// ```
pub struct SharedBufferRegistry<C, R>
where
    C: CaptureResource,
    R: DeviceResolver<Device = C::Device>,
{
    resolver: R,
    table: Arc<DeviceTable<C>>,
    delegate: Option<Arc<dyn RegistryDelegate>>,
}

impl<C, R> SharedBufferRegistry<C, R>
where
    C: CaptureResource,
    R: DeviceResolver<Device = C::Device>,
{
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            table: Arc::new(DeviceTable::new()),
            delegate: None,
        }
    }

    /// Install a lifecycle observer. Applies to resources created afterwards.
    pub fn set_delegate(&mut self, delegate: Arc<dyn RegistryDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Subscribe to `device_key` with `duration` of trailing audio.
    ///
    /// Creates the device's capture resource on first use, sized to
    /// `duration`. Lookup, creation and attachment happen under the table
    /// lock, so two callers never open two resources for one key and a new
    /// subscriber never lands on a set that is being torn down. The delegate
    /// is notified once that lock is released.
    pub fn get_or_add(
        &self,
        device_key: &str,
        duration: Duration,
    ) -> Result<Subscription<C>, CaptureError> {
        let mut devices = self.table.lock();

        if let Some(set) = devices.get(device_key).cloned() {
            let (subscription, resized) = set.attach(duration)?;
            drop(devices);
            set.notify_resized(resized);
            return Ok(subscription);
        }

        let device = self
            .resolver
            .resolve(device_key)
            .ok_or_else(|| CaptureError::device_not_found(device_key))?;
        let resource = C::open(device, duration)?;

        let set = Arc::new(DeviceSubscriberSet::new(
            device_key.to_string(),
            resource,
            Arc::downgrade(&self.table),
            self.delegate.clone(),
        ));
        let opened_with = set.required_duration();
        let (subscription, resized) = set.attach(duration)?;
        devices.insert(device_key.to_string(), Arc::clone(&set));
        drop(devices);

        log::debug!(
            "opened capture resource for {} retaining {:?}",
            device_key,
            opened_with
        );
        if let Some(ref delegate) = self.delegate {
            delegate.on_resource_created(device_key, opened_with);
        }
        set.notify_resized(resized);

        Ok(subscription)
    }

    /// Live device identifiers of every resource in the registry.
    ///
    /// The set of devices is captured when this is called; identifiers are
    /// read lazily while iterating.
    pub fn get_all(&self) -> impl Iterator<Item = String> {
        self.table.snapshot().into_iter().map(|set| set.device_id())
    }

    pub fn device_keys(&self) -> Vec<String> {
        self.table.lock().keys().cloned().collect()
    }

    pub fn device(&self, device_key: &str) -> Option<Arc<DeviceSubscriberSet<C>>> {
        self.table.get(device_key)
    }

    pub fn contains(&self, device_key: &str) -> bool {
        self.table.lock().contains_key(device_key)
    }

    pub fn state(&self, device_key: &str) -> DeviceState {
        match self.table.lock().get(device_key) {
            Some(set) => DeviceState::Active {
                subscribers: set.subscriber_count(),
            },
            None => DeviceState::Absent,
        }
    }

    pub fn statuses(&self) -> Vec<DeviceStatus> {
        let mut statuses: Vec<DeviceStatus> =
            self.table.snapshot().iter().map(|set| set.status()).collect();
        statuses.sort_by(|a, b| a.device_key.cmp(&b.device_key));
        statuses
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// Dispose every capture resource and empty the registry.
    ///
    /// Outstanding subscriptions become inert. Later `get_or_add` calls open
    /// fresh resources.
    pub fn dispose(&self) {
        let drained = self.table.drain();
        if !drained.is_empty() {
            log::debug!("drained {} capture resource(s)", drained.len());
        }
    }
}

impl<C, R> Drop for SharedBufferRegistry<C, R>
where
    C: CaptureResource,
    R: DeviceResolver<Device = C::Device>,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Sender};
    use std::sync::{Mutex, OnceLock, Weak};
    use std::thread;

    use crate::mock::{MockCaptureResource, MockDeviceResolver};

    type Registry = SharedBufferRegistry<MockCaptureResource, MockDeviceResolver>;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn registry(keys: &[&str]) -> Registry {
        SharedBufferRegistry::new(MockDeviceResolver::with_devices(keys.iter().copied()))
    }

    #[derive(Default)]
    struct RecordingDelegate {
        events: Mutex<Vec<String>>,
    }

    impl RegistryDelegate for RecordingDelegate {
        fn on_resource_created(&self, device_key: &str, required_duration: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("created {} {}", device_key, required_duration.as_secs()));
        }

        fn on_required_duration_changed(&self, device_key: &str, required_duration: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("resized {} {}", device_key, required_duration.as_secs()));
        }

        fn on_resource_disposed(&self, device_key: &str) {
            self.events.lock().unwrap().push(format!("disposed {}", device_key));
        }
    }

    #[test]
    fn join_and_leave_scenario() {
        let registry = registry(&["mic1"]);
        let device = registry.resolver().device("mic1").unwrap();

        let ten = registry.get_or_add("mic1", secs(10)).unwrap();
        assert_eq!(device.required_duration(), secs(10));

        let thirty = registry.get_or_add("mic1", secs(30)).unwrap();
        assert_eq!(device.required_duration(), secs(30));
        assert_eq!(registry.state("mic1"), DeviceState::Active { subscribers: 2 });

        thirty.dispose();
        assert_eq!(device.required_duration(), secs(10));

        ten.dispose();
        assert!(!registry.get_all().any(|id| id == "mic1"));
        assert_eq!(registry.state("mic1"), DeviceState::Absent);
        assert_eq!(device.opened(), 1);
        assert_eq!(device.disposed(), 1);
    }

    #[test]
    fn unknown_device_leaves_nothing_registered() {
        let registry = registry(&["mic1"]);

        let err = registry.get_or_add("missing-device", secs(5)).unwrap_err();
        assert_eq!(err, CaptureError::device_not_found("missing-device"));
        assert!(!registry.get_all().any(|id| id == "missing-device"));
        assert!(registry.is_empty());
    }

    #[test]
    fn resolver_is_not_consulted_for_existing_device() {
        let registry = registry(&["mic1"]);
        let _first = registry.get_or_add("mic1", secs(10)).unwrap();

        registry.resolver().forget("mic1");
        let second = registry.get_or_add("mic1", secs(20));
        assert!(second.is_ok());
    }

    #[test]
    fn open_failure_is_returned_and_not_registered() {
        let registry = registry(&["mic1"]);
        registry
            .resolver()
            .device("mic1")
            .unwrap()
            .fail_opens_with(CaptureError::ResourceUnavailable("exclusive mode".into()));

        assert_eq!(
            registry.get_or_add("mic1", secs(10)).unwrap_err(),
            CaptureError::ResourceUnavailable("exclusive mode".into())
        );
        assert!(!registry.contains("mic1"));
    }

    #[test]
    fn lowering_shared_maximum_waits_for_every_holder() {
        let registry = registry(&["mic1"]);
        let device = registry.resolver().device("mic1").unwrap();

        let a = registry.get_or_add("mic1", secs(20)).unwrap();
        let b = registry.get_or_add("mic1", secs(20)).unwrap();

        a.set_required_duration(secs(5)).unwrap();
        assert_eq!(device.required_duration(), secs(20));

        b.set_required_duration(secs(5)).unwrap();
        assert_eq!(device.required_duration(), secs(5));
    }

    #[test]
    fn devices_are_independent() {
        let registry = registry(&["mic1", "speakers"]);
        let mic = registry.resolver().device("mic1").unwrap();
        let speakers = registry.resolver().device("speakers").unwrap();

        let m = registry.get_or_add("mic1", secs(10)).unwrap();
        let _s = registry.get_or_add("speakers", secs(60)).unwrap();

        assert_eq!(mic.required_duration(), secs(10));
        assert_eq!(speakers.required_duration(), secs(60));

        m.dispose();
        assert_eq!(registry.device_keys(), vec!["speakers".to_string()]);
        assert_eq!(mic.disposed(), 1);
        assert_eq!(speakers.disposed(), 0);
    }

    #[test]
    fn device_is_recreated_after_teardown() {
        let registry = registry(&["mic1"]);
        let device = registry.resolver().device("mic1").unwrap();

        registry.get_or_add("mic1", secs(10)).unwrap().dispose();
        let again = registry.get_or_add("mic1", secs(15)).unwrap();

        assert_eq!(device.opened(), 2);
        assert_eq!(device.disposed(), 1);
        assert_eq!(device.required_duration(), secs(15));
        assert_eq!(again.device_id(), "mic1");
    }

    #[test]
    fn dispose_drains_and_allows_reuse() {
        let registry = registry(&["mic1", "mic2"]);
        let mic1 = registry.resolver().device("mic1").unwrap();

        let stale = registry.get_or_add("mic1", secs(10)).unwrap();
        let _other = registry.get_or_add("mic2", secs(10)).unwrap();

        registry.dispose();
        assert!(registry.is_empty());
        assert_eq!(mic1.disposed(), 1);

        assert_eq!(
            stale.set_required_duration(secs(99)),
            Err(CaptureError::InvalidOperationOnDisposed)
        );

        let fresh = registry.get_or_add("mic1", secs(12)).unwrap();
        assert_eq!(mic1.opened(), 2);

        // The stale handle must not tear down the fresh resource.
        stale.dispose();
        drop(stale);
        assert!(registry.contains("mic1"));
        assert_eq!(mic1.disposed(), 1);
        assert!(!fresh.is_disposed());
    }

    #[test]
    fn dropping_registry_disposes_resources() {
        let resolver = MockDeviceResolver::with_devices(["mic1"]);
        let device = resolver.device("mic1").unwrap();
        let registry: Registry = SharedBufferRegistry::new(resolver);

        let subscription = registry.get_or_add("mic1", secs(10)).unwrap();
        drop(registry);

        assert_eq!(device.disposed(), 1);
        drop(subscription);
        assert_eq!(device.disposed(), 1);
    }

    #[test]
    fn statuses_are_sorted_snapshots() {
        let registry = registry(&["b-mic", "a-mic"]);
        let _b = registry.get_or_add("b-mic", secs(10)).unwrap();
        let _a1 = registry.get_or_add("a-mic", secs(5)).unwrap();
        let _a2 = registry.get_or_add("a-mic", secs(8)).unwrap();

        let statuses = registry.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].device_key, "a-mic");
        assert_eq!(statuses[0].subscribers, 2);
        assert_eq!(statuses[0].required_duration, secs(8));
        assert_eq!(statuses[1].device_key, "b-mic");
    }

    #[test]
    fn delegate_sees_lifecycle_in_order() {
        let delegate = Arc::new(RecordingDelegate::default());
        let mut registry = registry(&["mic1"]);
        registry.set_delegate(delegate.clone());

        let a = registry.get_or_add("mic1", secs(10)).unwrap();
        let b = registry.get_or_add("mic1", secs(30)).unwrap();
        b.dispose();
        a.dispose();

        assert_eq!(
            *delegate.events.lock().unwrap(),
            vec![
                "created mic1 10".to_string(),
                "resized mic1 30".to_string(),
                "resized mic1 10".to_string(),
                "disposed mic1".to_string(),
            ]
        );
    }

    /// Reads the registry back from every callback.
    struct ReentrantDelegate {
        registry: OnceLock<Weak<Registry>>,
        seen: Sender<String>,
    }

    impl ReentrantDelegate {
        fn report(&self, event: String) {
            let _ = self.seen.send(event);
        }

        fn registry(&self) -> Option<Arc<Registry>> {
            self.registry.get().and_then(Weak::upgrade)
        }
    }

    impl RegistryDelegate for ReentrantDelegate {
        fn on_resource_created(&self, device_key: &str, _required_duration: Duration) {
            if let Some(registry) = self.registry() {
                self.report(format!("created {} len={}", device_key, registry.len()));
            }
        }

        fn on_required_duration_changed(&self, device_key: &str, required_duration: Duration) {
            if let Some(registry) = self.registry() {
                let subscribers = registry.state(device_key).subscribers();
                self.report(format!(
                    "resized {} {} subscribers={}",
                    device_key,
                    required_duration.as_secs(),
                    subscribers
                ));
            }
        }

        fn on_resource_disposed(&self, device_key: &str) {
            if let Some(registry) = self.registry() {
                self.report(format!("disposed {} len={}", device_key, registry.len()));
            }
        }
    }

    #[test]
    fn delegate_may_call_back_into_the_registry() {
        let (seen, events) = mpsc::channel();
        let delegate = Arc::new(ReentrantDelegate {
            registry: OnceLock::new(),
            seen,
        });
        let mut registry = registry(&["mic1"]);
        registry.set_delegate(delegate.clone());
        let registry = Arc::new(registry);
        assert!(delegate.registry.set(Arc::downgrade(&registry)).is_ok());

        let worker = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let a = registry.get_or_add("mic1", secs(10)).unwrap();
                let b = registry.get_or_add("mic1", secs(30)).unwrap();
                b.dispose();
                a.dispose();

                let survivor = registry.get_or_add("mic1", secs(5)).unwrap();
                registry.dispose();
                drop(survivor);
            })
        };

        // A callback that deadlocks never reports, so bound every wait.
        let expected = [
            "created mic1 len=1",
            "resized mic1 30 subscribers=2",
            "resized mic1 10 subscribers=1",
            "disposed mic1 len=0",
            "created mic1 len=1",
            "disposed mic1 len=0",
        ];
        for want in expected {
            let got = events
                .recv_timeout(Duration::from_secs(3))
                .expect("delegate callback blocked on a registry lock");
            assert_eq!(got, want);
        }
        worker.join().unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn hot_plugged_device_becomes_resolvable() {
        let registry = registry(&["mic1"]);

        assert_eq!(
            registry.get_or_add("usb-mic", secs(10)).unwrap_err(),
            CaptureError::device_not_found("usb-mic")
        );
        assert_eq!(registry.state("usb-mic").subscribers(), 0);

        let device = registry.resolver().add("usb-mic");
        let first = registry.get_or_add("usb-mic", secs(10)).unwrap();
        let _second = registry.get_or_add("usb-mic", secs(20)).unwrap();

        assert_eq!(device.opened(), 1);
        assert_eq!(device.required_duration(), secs(20));
        assert_eq!(registry.state("usb-mic").subscribers(), 2);

        first.dispose();
        assert_eq!(registry.state("usb-mic").subscribers(), 1);
    }
}
