pub mod config;
pub mod error;
pub mod gateway;
pub mod runtime;
pub mod sink;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::MarketDataGateway;
pub use runtime::RuntimeConfigStore;
pub use sink::{NotificationSink, PersistenceSink};
pub use types::*;
