pub mod adapters;
pub mod config;
pub mod error;
pub mod registry;
pub mod router;
pub mod server;
pub mod unified;
pub mod workflows;

pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use registry::{ModelRegistry, SharedRegistry};
pub use server::{build_router, AppState};
