pub mod capture_resource;
pub mod device_resolver;
pub mod registry_delegate;
