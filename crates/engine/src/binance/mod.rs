pub mod klines;

pub use klines::BinanceGateway;
