use std::time::Duration;

/// Lifecycle notifications from a [`SharedBufferRegistry`](crate::SharedBufferRegistry).
///
/// Called on the thread that caused the change, after the registry and the
/// affected device have released their locks. Implementations may query the
/// registry or subscribe from inside a callback.
pub trait RegistryDelegate: Send + Sync {
    /// A capture resource was opened for `device_key`.
    fn on_resource_created(&self, device_key: &str, required_duration: Duration);

    /// The retained window for `device_key` was changed.
    fn on_required_duration_changed(&self, device_key: &str, required_duration: Duration);

    /// The last subscription for `device_key` detached (or the registry was
    /// drained) and its capture resource was disposed.
    fn on_resource_disposed(&self, device_key: &str);
}
