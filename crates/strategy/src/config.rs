use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Lookbacks of the indicator pipeline.
///
/// Example `[indicators]` section of `config/scanner.toml`:
/// ```toml
/// [indicators]
/// fast_period = 34
/// mid_period = 55
/// slow_period = 200
/// rsi_period = 14
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub fast_period: usize,
    pub mid_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub volume_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            fast_period: 34,
            mid_period: 55,
            slow_period: 200,
            rsi_period: 14,
            atr_period: 14,
            volume_period: 20,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.fast_period < self.mid_period && self.mid_period < self.slow_period) {
            return Err(Error::Config(format!(
                "trend periods must satisfy fast < mid < slow, got {}/{}/{}",
                self.fast_period, self.mid_period, self.slow_period
            )));
        }
        if self.fast_period == 0 || self.rsi_period < 2 || self.atr_period == 0 || self.volume_period == 0 {
            return Err(Error::Config(
                "indicator periods must be positive (RSI period >= 2)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Entry and exit thresholds of the classifier.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Long entries need RSI strictly inside `(long_rsi_min, long_rsi_max)`.
    pub long_rsi_min: f64,
    pub long_rsi_max: f64,
    /// Short entries need RSI strictly inside `(short_rsi_min, short_rsi_max)`.
    pub short_rsi_min: f64,
    pub short_rsi_max: f64,
    /// RSI at or above this closes longs.
    pub exhaustion_high: f64,
    /// RSI at or below this closes shorts.
    pub exhaustion_low: f64,
    /// Minimum bar move, as a fraction of ATR, that confirms an entry.
    pub momentum_atr_fraction: f64,
    /// Volume multiple of its baseline that confirms an entry.
    pub volume_multiplier: f64,
    /// Adverse bar move, as a multiple of ATR, that forces an exit.
    pub adverse_atr_multiple: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            long_rsi_min: 52.0,
            long_rsi_max: 75.0,
            short_rsi_min: 25.0,
            short_rsi_max: 48.0,
            exhaustion_high: 80.0,
            exhaustion_low: 20.0,
            momentum_atr_fraction: 0.1,
            volume_multiplier: 1.7,
            adverse_atr_multiple: 2.0,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        let bands_ok = self.long_rsi_min < self.long_rsi_max
            && self.long_rsi_max <= self.exhaustion_high
            && self.short_rsi_min < self.short_rsi_max
            && self.exhaustion_low <= self.short_rsi_min;
        if !bands_ok {
            return Err(Error::Config(
                "RSI entry bands must be non-empty and inside the exhaustion extremes".to_string(),
            ));
        }
        if self.momentum_atr_fraction < 0.0 || self.volume_multiplier <= 0.0 || self.adverse_atr_multiple <= 0.0 {
            return Err(Error::Config("momentum/volume/adverse multipliers must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        IndicatorConfig::default().validate().unwrap();
        ClassifierConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_section_keeps_other_defaults() {
        let cfg: IndicatorConfig = toml::from_str("slow_period = 100").unwrap();
        assert_eq!(cfg.slow_period, 100);
        assert_eq!(cfg.fast_period, 34);
    }

    #[test]
    fn misordered_trend_periods_are_rejected() {
        let cfg = IndicatorConfig {
            fast_period: 60,
            ..IndicatorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn entry_band_beyond_exhaustion_is_rejected() {
        let cfg = ClassifierConfig {
            long_rsi_max: 85.0,
            ..ClassifierConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
