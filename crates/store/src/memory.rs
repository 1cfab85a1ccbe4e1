use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use common::{
    normalize_symbol, Direction, DirectionToggles, Result, RuntimeConfigStore, ScanTarget,
    Timeframe,
};

/// Process-local runtime config.
///
/// Every mutation replaces a single entry under a write lock, so readers
/// always observe a consistent per-key value (last write wins). Handy for
/// tests and for running without a database.
#[derive(Clone)]
pub struct InMemoryRuntimeConfig {
    /// Active flag per (symbol, timeframe).
    targets: Arc<RwLock<BTreeMap<(String, Timeframe), bool>>>,
    toggles: Arc<RwLock<DirectionToggles>>,
    scanning: Arc<RwLock<bool>>,
}

impl InMemoryRuntimeConfig {
    pub fn new(toggles: DirectionToggles) -> Self {
        Self {
            targets: Arc::default(),
            toggles: Arc::new(RwLock::new(toggles)),
            scanning: Arc::new(RwLock::new(true)),
        }
    }

    /// Build with every given target active and every direction enabled.
    pub fn with_targets(targets: &[ScanTarget]) -> Self {
        let map = targets
            .iter()
            .map(|t| ((t.symbol.clone(), t.timeframe), t.active))
            .collect();
        Self {
            targets: Arc::new(RwLock::new(map)),
            toggles: Arc::new(RwLock::new(DirectionToggles::all_enabled())),
            scanning: Arc::new(RwLock::new(true)),
        }
    }

    pub async fn upsert_target(&self, symbol: &str, timeframe: Timeframe, active: bool) {
        let symbol = normalize_symbol(symbol);
        info!(symbol = %symbol, timeframe = %timeframe, active, "Target updated");
        self.targets.write().await.insert((symbol, timeframe), active);
    }

    /// Returns false when the target does not exist.
    pub async fn set_target_active(&self, symbol: &str, timeframe: Timeframe, active: bool) -> bool {
        let key = (normalize_symbol(symbol), timeframe);
        match self.targets.write().await.get_mut(&key) {
            Some(flag) => {
                *flag = active;
                true
            }
            None => false,
        }
    }

    pub async fn set_direction_enabled(&self, direction: Direction, enabled: bool) {
        self.toggles.write().await.set(direction, enabled);
    }

    pub async fn set_scanning_enabled(&self, enabled: bool) {
        *self.scanning.write().await = enabled;
    }
}

#[async_trait]
impl RuntimeConfigStore for InMemoryRuntimeConfig {
    async fn active_targets(&self) -> Result<Vec<ScanTarget>> {
        Ok(self
            .targets
            .read()
            .await
            .iter()
            .filter(|(_, active)| **active)
            .map(|((symbol, timeframe), _)| ScanTarget {
                symbol: symbol.clone(),
                timeframe: *timeframe,
                active: true,
            })
            .collect())
    }

    async fn direction_enabled(&self, direction: Direction) -> Result<bool> {
        Ok(self.toggles.read().await.is_enabled(direction))
    }

    async fn scanning_enabled(&self) -> Result<bool> {
        Ok(*self.scanning.read().await)
    }

    async fn direction_toggles(&self) -> Result<DirectionToggles> {
        Ok(*self.toggles.read().await)
    }
}
