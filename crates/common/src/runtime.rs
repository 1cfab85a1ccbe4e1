use async_trait::async_trait;

use crate::{Direction, DirectionToggles, Result, ScanTarget};

/// Read side of the live-mutable scan configuration.
///
/// Written by an external control surface, read by the scheduler at the top
/// of every cycle and every target evaluation. Implementations must return a
/// fresh view on each call; callers never cache results across cycles.
#[async_trait]
pub trait RuntimeConfigStore: Send + Sync {
    /// All targets whose `active` flag is set.
    async fn active_targets(&self) -> Result<Vec<ScanTarget>>;

    async fn direction_enabled(&self, direction: Direction) -> Result<bool>;

    /// Global kill switch. When false the scheduler skips whole cycles.
    async fn scanning_enabled(&self) -> Result<bool> {
        Ok(true)
    }

    async fn direction_toggles(&self) -> Result<DirectionToggles> {
        Ok(DirectionToggles {
            long_entry: self.direction_enabled(Direction::LongEntry).await?,
            short_entry: self.direction_enabled(Direction::ShortEntry).await?,
            close_long: self.direction_enabled(Direction::CloseLong).await?,
            close_short: self.direction_enabled(Direction::CloseShort).await?,
        })
    }
}
