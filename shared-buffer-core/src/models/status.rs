use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of one active device, for host UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub device_key: String,

    /// Live identifier reported by the capture resource; may differ from the
    /// key when the key names a default device that has been remapped.
    pub device_id: String,

    pub subscribers: usize,

    #[serde(rename = "requiredDurationSecs", with = "duration_secs")]
    pub required_duration: Duration,

    pub created_at: DateTime<Utc>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
