use async_trait::async_trait;

use crate::{CandleWindow, Result, Timeframe};

/// Source of candle windows.
///
/// `BinanceGateway` implements this against the public klines endpoint;
/// tests substitute in-memory fakes. Every failure (network, rate limit,
/// unknown symbol) is reported as `Error::Gateway` and the scheduler treats
/// them all the same way: log and skip the target for this cycle.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Fetch up to `limit` bars for `symbol`, oldest first. The last bar may
    /// still be forming; it must then carry `is_closed == false`.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleWindow>;
}
