/// Maps a device key to a capturable device.
///
/// Consulted only when a new capture resource must be created; a `None`
/// fails that single `get_or_add` call with `DeviceNotFound`.
pub trait DeviceResolver: Send + Sync {
    type Device: Send;

    fn resolve(&self, device_key: &str) -> Option<Self::Device>;
}
