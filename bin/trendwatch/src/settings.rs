use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::warn;

use common::{DirectionToggles, ScanTarget, Timeframe};
use cooldown::CooldownPolicy;
use engine::SchedulerConfig;
use strategy::{ClassifierConfig, IndicatorConfig, IndicatorPipeline};

/// Initial scan target. Only inserted when the database does not know it yet.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSeed {
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(default = "enabled")]
    pub active: bool,
}

fn enabled() -> bool {
    true
}

/// Top-level structure of `config/scanner.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScannerFileConfig {
    pub scheduler: SchedulerConfig,
    pub indicators: IndicatorConfig,
    pub classifier: ClassifierConfig,
    pub cooldown: CooldownPolicy,
    /// Initial direction toggles, applied only where no stored value exists.
    pub directions: DirectionToggles,
    #[serde(rename = "target")]
    pub targets: Vec<TargetSeed>,
}

impl ScannerFileConfig {
    /// A missing file means built-in defaults; an unreadable or malformed
    /// one is an error.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Scanner config not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scanner config at '{}'", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse scanner config at '{}'", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.indicators.validate()?;
        self.classifier.validate()?;
        let need = IndicatorPipeline::new(self.indicators.clone()).minimum_required();
        self.scheduler.validate(need)?;
        if !(0.0..=1.0).contains(&self.cooldown.exit_factor) {
            bail!("cooldown.exit_factor must be within [0, 1], got {}", self.cooldown.exit_factor);
        }
        if let Some(seed) = self.targets.iter().find(|t| common::normalize_symbol(&t.symbol).is_empty()) {
            bail!("target symbol '{}' is empty after normalisation", seed.symbol);
        }
        Ok(())
    }

    pub fn scan_targets(&self) -> Vec<ScanTarget> {
        self.targets
            .iter()
            .map(|seed| ScanTarget {
                active: seed.active,
                ..ScanTarget::new(&seed.symbol, seed.timeframe)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use common::Direction;

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = ScannerFileConfig::parse("").unwrap();
        assert_eq!(cfg.scheduler, SchedulerConfig::default());
        assert_eq!(cfg.directions, DirectionToggles::all_enabled());
        assert!(cfg.targets.is_empty());
    }

    #[test]
    fn full_file_is_parsed() {
        let cfg = ScannerFileConfig::parse(
            r#"
            [scheduler]
            batch_size = 5
            cycle_interval_secs = 30

            [classifier]
            volume_multiplier = 2.0

            [cooldown.entry_secs]
            "1h" = 1800

            [directions]
            short_entry = false

            [[target]]
            symbol = "btc/usdt"
            timeframe = "15m"

            [[target]]
            symbol = "DOGEUSDT"
            timeframe = "1m"
            active = false
            "#,
        )
        .unwrap();

        assert_eq!(cfg.scheduler.batch_size, 5);
        assert_eq!(cfg.scheduler.batch_pause_ms, 500);
        assert_eq!(cfg.classifier.volume_multiplier, 2.0);
        assert_eq!(
            cfg.cooldown.cooldown(Timeframe::H1, Direction::LongEntry).num_seconds(),
            1800
        );
        assert!(!cfg.directions.short_entry);
        assert!(cfg.directions.long_entry);

        let targets = cfg.scan_targets();
        assert_eq!(targets[0], ScanTarget::new("BTCUSDT", Timeframe::M15));
        assert!(!targets[1].active);
    }

    #[test]
    fn unsupported_timeframe_is_rejected() {
        let err = ScannerFileConfig::parse(
            r#"
            [[target]]
            symbol = "BTCUSDT"
            timeframe = "2h"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("unsupported timeframe"), "{err:#}");
    }

    #[test]
    fn inconsistent_tunables_are_rejected() {
        assert!(ScannerFileConfig::parse("[indicators]\nfast_period = 60").is_err());
        assert!(ScannerFileConfig::parse("[scheduler]\ncandle_limit = 100").is_err());
        assert!(ScannerFileConfig::parse("[cooldown]\nexit_factor = 1.5").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ScannerFileConfig::load("does/not/exist.toml").unwrap();
        assert!(cfg.targets.is_empty());
    }
}
