pub(crate) mod duration;
pub mod registry;
pub mod subscriber_set;
pub mod subscription;
pub(crate) mod table;
