pub mod binance;
pub mod dispatch;
pub mod scheduler;

pub use binance::BinanceGateway;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use scheduler::{ScanScheduler, SchedulerConfig, SchedulerHandle, SchedulerState};
