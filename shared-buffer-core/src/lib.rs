//! # shared-buffer-core
//!
//! Shares one rolling capture buffer per audio device between any number of
//! subscribers, each needing a different trailing-window duration.
//!
//! The capture resource for a device is opened on the first subscription,
//! always retains the longest duration any live subscription asks for, and is
//! disposed when the last subscription detaches. Platform capture engines
//! implement `CaptureResource`; device lookup implements `DeviceResolver`.
//!
//! ## Architecture
//!
//! ```text
//! shared-buffer-core (this crate)
//! ├── traits/   ← CaptureResource, DeviceResolver, RegistryDelegate
//! ├── models/   ← CaptureError, DeviceState, DeviceStatus,
//! │             SaveRequest, SaveSettings, CancelFlag
//! ├── sharing/  ← SharedBufferRegistry → DeviceSubscriberSet → Subscription
//! └── mock      ← in-memory resources for tests
//! ```

pub mod mock;
pub mod models;
pub mod sharing;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::cancel::CancelFlag;
pub use models::config::{SaveRequest, SaveSettings};
pub use models::error::CaptureError;
pub use models::state::DeviceState;
pub use models::status::DeviceStatus;
pub use models::subscription_id::SubscriptionId;
pub use sharing::registry::SharedBufferRegistry;
pub use sharing::subscriber_set::DeviceSubscriberSet;
pub use sharing::subscription::Subscription;
pub use traits::capture_resource::CaptureResource;
pub use traits::device_resolver::DeviceResolver;
pub use traits::registry_delegate::RegistryDelegate;
