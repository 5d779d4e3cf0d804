//! In-memory capture resources for testing without audio hardware.
//!
//! [`MockDeviceResolver`] knows a fixed set of device keys. Each key has a
//! [`MockDevice`] that outlives the resources opened on it, so tests can
//! count opens and disposals across the whole lifetime of a key.
//!
//! ```
//! use std::time::Duration;
//! use shared_buffer_core::mock::{MockCaptureResource, MockDeviceResolver};
//! use shared_buffer_core::SharedBufferRegistry;
//!
//! let resolver = MockDeviceResolver::with_devices(["mic1"]);
//! let device = resolver.device("mic1").unwrap();
//! let registry: SharedBufferRegistry<MockCaptureResource, _> =
//!     SharedBufferRegistry::new(resolver);
//!
//! let subscription = registry.get_or_add("mic1", Duration::from_secs(10)).unwrap();
//! assert_eq!(device.required_duration(), Duration::from_secs(10));
//!
//! drop(subscription);
//! assert_eq!(device.disposed(), 1);
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::cancel::CancelFlag;
use crate::models::config::SaveRequest;
use crate::models::error::CaptureError;
use crate::traits::capture_resource::CaptureResource;
use crate::traits::device_resolver::DeviceResolver;

/// Hook run inside [`MockCaptureResource::save`] before it returns.
pub type SaveHook = Arc<dyn Fn(&SaveRequest) + Send + Sync + 'static>;

/// Observable state of one mock device across every resource opened on it.
#[derive(Default)]
pub struct MockDevice {
    device_id: Mutex<String>,
    required_duration: Mutex<Duration>,
    opened: AtomicUsize,
    disposed: AtomicUsize,
    double_disposals: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    duration_writes: AtomicUsize,
    saves: Mutex<Vec<SaveRequest>>,
    open_failure: Mutex<Option<CaptureError>>,
    save_failure: Mutex<Option<CaptureError>>,
    save_hook: Mutex<Option<SaveHook>>,
}

impl MockDevice {
    fn new(device_id: String) -> Self {
        Self {
            device_id: Mutex::new(device_id),
            ..Default::default()
        }
    }

    pub fn device_id(&self) -> String {
        self.device_id.lock().clone()
    }

    /// Duration most recently applied to a resource on this device.
    pub fn required_duration(&self) -> Duration {
        *self.required_duration.lock()
    }

    /// Resources opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Resources disposed so far (first `dispose` per resource only).
    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    /// `dispose` calls on a resource that was already disposed.
    pub fn double_disposals(&self) -> usize {
        self.double_disposals.load(Ordering::SeqCst)
    }

    /// Resources currently open.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most resources ever open at the same time.
    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }

    /// `set_required_duration` calls received.
    pub fn duration_writes(&self) -> usize {
        self.duration_writes.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> Vec<SaveRequest> {
        self.saves.lock().clone()
    }

    pub fn fail_opens_with(&self, error: CaptureError) {
        *self.open_failure.lock() = Some(error);
    }

    pub fn fail_saves_with(&self, error: CaptureError) {
        *self.save_failure.lock() = Some(error);
    }

    pub fn clear_failures(&self) {
        *self.open_failure.lock() = None;
        *self.save_failure.lock() = None;
    }

    pub fn on_save(&self, hook: SaveHook) {
        *self.save_hook.lock() = Some(hook);
    }
}

/// Resolves a fixed set of device keys to [`MockDevice`]s.
#[derive(Default)]
pub struct MockDeviceResolver {
    devices: Mutex<HashMap<String, Arc<MockDevice>>>,
}

impl MockDeviceResolver {
    /// Known devices whose ids equal their keys.
    pub fn with_devices<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let devices = keys
            .into_iter()
            .map(|key| {
                let key = key.into();
                let device = Arc::new(MockDevice::new(key.clone()));
                (key, device)
            })
            .collect();
        Self {
            devices: Mutex::new(devices),
        }
    }

    pub fn device(&self, device_key: &str) -> Option<Arc<MockDevice>> {
        self.devices.lock().get(device_key).cloned()
    }

    /// Make `device_key` resolvable from now on.
    pub fn add(&self, device_key: &str) -> Arc<MockDevice> {
        let device = Arc::new(MockDevice::new(device_key.to_string()));
        self.devices.lock().insert(device_key.to_string(), Arc::clone(&device));
        device
    }

    /// Stop resolving `device_key`, as if the device was unplugged.
    pub fn forget(&self, device_key: &str) {
        self.devices.lock().remove(device_key);
    }

    /// Change the live id reported for `device_key`, as a default-device
    /// switch would.
    pub fn remap(&self, device_key: &str, device_id: &str) {
        if let Some(device) = self.device(device_key) {
            *device.device_id.lock() = device_id.to_string();
        }
    }
}

impl DeviceResolver for MockDeviceResolver {
    type Device = Arc<MockDevice>;

    fn resolve(&self, device_key: &str) -> Option<Self::Device> {
        self.device(device_key)
    }
}

/// Capture resource that records everything done to it.
pub struct MockCaptureResource {
    device: Arc<MockDevice>,
    disposed: AtomicBool,
}

impl CaptureResource for MockCaptureResource {
    type Device = Arc<MockDevice>;

    fn open(device: Self::Device, required_duration: Duration) -> Result<Self, CaptureError> {
        if let Some(error) = device.open_failure.lock().clone() {
            return Err(error);
        }

        *device.required_duration.lock() = required_duration;
        device.opened.fetch_add(1, Ordering::SeqCst);
        let live = device.live.fetch_add(1, Ordering::SeqCst) + 1;
        device.peak_live.fetch_max(live, Ordering::SeqCst);

        Ok(Self {
            device,
            disposed: AtomicBool::new(false),
        })
    }

    fn device_id(&self) -> String {
        self.device.device_id()
    }

    fn required_duration(&self) -> Duration {
        self.device.required_duration()
    }

    fn set_required_duration(&self, duration: Duration) {
        *self.device.required_duration.lock() = duration;
        self.device.duration_writes.fetch_add(1, Ordering::SeqCst);
    }

    fn save(&self, request: &SaveRequest, cancel: &CancelFlag) -> Result<PathBuf, CaptureError> {
        let hook = self.device.save_hook.lock().clone();
        if let Some(hook) = hook {
            hook(request);
        }

        if cancel.is_cancelled() {
            return Err(CaptureError::Cancelled);
        }
        if let Some(error) = self.device.save_failure.lock().clone() {
            return Err(error);
        }
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CaptureError::ResourceSaveFailed("capture stopped".into()));
        }

        self.device.saves.lock().push(request.clone());
        Ok(request.output_path.clone())
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            self.device.double_disposals.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.device.disposed.fetch_add(1, Ordering::SeqCst);
        self.device.live.fetch_sub(1, Ordering::SeqCst);
    }
}
