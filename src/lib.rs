pub mod authz;
pub mod collab;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod machine;
pub mod notify;
pub mod request;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod views;

pub use error::{PortalError, PortalResult};
pub use service::PortalService;
