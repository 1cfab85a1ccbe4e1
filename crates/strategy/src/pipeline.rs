use serde::{Deserialize, Serialize};

use common::{CandleWindow, Error, Result};

use crate::config::IndicatorConfig;
use crate::indicators::{average_true_range, ema, rsi, sma};

/// Floor for values used as divisors downstream.
pub const EPSILON: f64 = 1e-9;

/// Features derived from one candle window. Owned by a single evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub ema_fast: f64,
    pub ema_mid: f64,
    pub ema_slow: f64,
    /// 0–100 oscillator.
    pub rsi: f64,
    /// Volatility estimate, never below `EPSILON`.
    pub atr: f64,
    /// Volume of the last closed bar.
    pub volume: f64,
    /// Rolling mean volume, never below `EPSILON`.
    pub volume_sma: f64,
    /// Close of the last closed bar.
    pub close: f64,
    pub prev_close: f64,
}

impl FeatureVector {
    pub fn is_finite(&self) -> bool {
        [
            self.ema_fast,
            self.ema_mid,
            self.ema_slow,
            self.rsi,
            self.atr,
            self.volume,
            self.volume_sma,
            self.close,
            self.prev_close,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Turns a candle window into a `FeatureVector`.
#[derive(Debug, Clone, Default)]
pub struct IndicatorPipeline {
    config: IndicatorConfig,
}

impl IndicatorPipeline {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    /// Closed candles needed: the longest lookback plus one bar for the
    /// previous close.
    pub fn minimum_required(&self) -> usize {
        let c = &self.config;
        c.slow_period
            .max(c.mid_period)
            .max(c.fast_period)
            .max(c.rsi_period + 1)
            .max(c.atr_period + 1)
            .max(c.volume_period)
            + 1
    }

    /// Compute features from the closed bars of `window`.
    ///
    /// A trailing bar that is still forming is ignored. Fails with
    /// `Error::InsufficientData` when fewer than `minimum_required()`
    /// closed bars remain.
    pub fn compute(&self, window: &CandleWindow) -> Result<FeatureVector> {
        let candles = window.closed();
        let need = self.minimum_required();
        if candles.len() < need {
            return Err(Error::InsufficientData {
                have: candles.len(),
                need,
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let c = &self.config;

        let insufficient = || Error::InsufficientData {
            have: candles.len(),
            need,
        };

        let n = closes.len();
        Ok(FeatureVector {
            ema_fast: ema(&closes, c.fast_period).ok_or_else(insufficient)?,
            ema_mid: ema(&closes, c.mid_period).ok_or_else(insufficient)?,
            ema_slow: ema(&closes, c.slow_period).ok_or_else(insufficient)?,
            rsi: rsi(&closes, c.rsi_period).ok_or_else(insufficient)?,
            atr: average_true_range(candles, c.atr_period)
                .ok_or_else(insufficient)?
                .max(EPSILON),
            volume: volumes[n - 1],
            volume_sma: sma(&volumes, c.volume_period)
                .ok_or_else(insufficient)?
                .max(EPSILON),
            close: closes[n - 1],
            prev_close: closes[n - 2],
        })
    }
}
