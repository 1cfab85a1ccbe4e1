//! Stateless indicator math over slices ordered oldest first.

pub mod atr;
pub mod ema;
pub mod rsi;
pub mod sma;

pub use atr::average_true_range;
pub use ema::ema;
pub use rsi::rsi;
pub use sma::sma;
