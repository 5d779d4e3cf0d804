pub mod cancel;
pub mod config;
pub mod error;
pub mod state;
pub mod status;
pub mod subscription_id;
