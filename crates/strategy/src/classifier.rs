use chrono::{DateTime, Utc};

use common::{Direction, DirectionToggles, ScanTarget, SignalVerdict};

use crate::config::{ClassifierConfig, IndicatorConfig};
use crate::pipeline::FeatureVector;

/// Maps a feature vector to exactly one verdict.
///
/// Pure: the result depends only on the arguments. Branches are tried in
/// the fixed order `CLOSE_LONG > CLOSE_SHORT > LONG_ENTRY > SHORT_ENTRY`
/// and the first one that holds wins, so an exit always beats an entry
/// evaluated in the same cycle. A disabled branch is skipped before its
/// condition is evaluated.
#[derive(Debug, Clone)]
pub struct SignalClassifier {
    config: ClassifierConfig,
    /// Periods are only used to label reasons.
    periods: (usize, usize, usize),
}

impl Default for SignalClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default(), &IndicatorConfig::default())
    }
}

type Branch = fn(&SignalClassifier, &FeatureVector) -> Option<String>;

impl SignalClassifier {
    const PRIORITY: [(Direction, Branch); 4] = [
        (Direction::CloseLong, SignalClassifier::close_long),
        (Direction::CloseShort, SignalClassifier::close_short),
        (Direction::LongEntry, SignalClassifier::long_entry),
        (Direction::ShortEntry, SignalClassifier::short_entry),
    ];

    pub fn new(config: ClassifierConfig, indicators: &IndicatorConfig) -> Self {
        Self {
            config,
            periods: (indicators.fast_period, indicators.mid_period, indicators.slow_period),
        }
    }

    pub fn classify(
        &self,
        target: &ScanTarget,
        features: &FeatureVector,
        toggles: &DirectionToggles,
        evaluated_at: DateTime<Utc>,
    ) -> SignalVerdict {
        let (direction, reason) = Self::PRIORITY
            .iter()
            .filter(|(direction, _)| toggles.is_enabled(*direction))
            .find_map(|(direction, branch)| branch(self, features).map(|r| (*direction, r)))
            .unwrap_or((Direction::None, String::new()));

        SignalVerdict {
            target: target.clone(),
            direction,
            price: features.close,
            reason,
            evaluated_at,
        }
    }

    fn trend_label(&self) -> String {
        let (fast, mid, slow) = self.periods;
        format!("EMA {fast}/{mid}/{slow}")
    }

    // ─── Entries ─────────────────────────────────────────────────────────────

    fn long_entry(&self, f: &FeatureVector) -> Option<String> {
        let aligned = f.close > f.ema_fast && f.ema_fast > f.ema_mid && f.ema_mid > f.ema_slow;
        let in_band = f.rsi > self.config.long_rsi_min && f.rsi < self.config.long_rsi_max;
        if !(aligned && in_band) {
            return None;
        }
        let confirmation = self.confirmation(f.close - f.prev_close, f)?;
        Some(format!(
            "trend bullish ({}), RSI {:.1}, {confirmation}",
            self.trend_label(),
            f.rsi
        ))
    }

    fn short_entry(&self, f: &FeatureVector) -> Option<String> {
        let aligned = f.close < f.ema_fast && f.ema_fast < f.ema_mid && f.ema_mid < f.ema_slow;
        let in_band = f.rsi > self.config.short_rsi_min && f.rsi < self.config.short_rsi_max;
        if !(aligned && in_band) {
            return None;
        }
        let confirmation = self.confirmation(f.prev_close - f.close, f)?;
        Some(format!(
            "trend bearish ({}), RSI {:.1}, {confirmation}",
            self.trend_label(),
            f.rsi
        ))
    }

    /// `favourable_move` is positive when the last bar moved in the entry's direction.
    fn confirmation(&self, favourable_move: f64, f: &FeatureVector) -> Option<&'static str> {
        let momentum = favourable_move >= self.config.momentum_atr_fraction * f.atr;
        let volume_spike = f.volume >= self.config.volume_multiplier * f.volume_sma;
        match (momentum, volume_spike) {
            (true, true) => Some("momentum + volume spike"),
            (true, false) => Some("momentum"),
            (false, true) => Some("volume spike"),
            (false, false) => None,
        }
    }

    // ─── Exits ───────────────────────────────────────────────────────────────

    fn close_long(&self, f: &FeatureVector) -> Option<String> {
        let (_, mid, _) = self.periods;
        if f.prev_close >= f.ema_mid && f.close < f.ema_mid {
            return Some(format!("exit: price crossed below EMA {mid}"));
        }
        if f.rsi >= self.config.exhaustion_high {
            return Some(format!("exit: RSI {:.1} exhausted", f.rsi));
        }
        let drop = f.prev_close - f.close;
        if drop > self.config.adverse_atr_multiple * f.atr {
            return Some(format!("exit: adverse move {:.1}x ATR", drop / f.atr));
        }
        None
    }

    fn close_short(&self, f: &FeatureVector) -> Option<String> {
        let (_, mid, _) = self.periods;
        if f.prev_close <= f.ema_mid && f.close > f.ema_mid {
            return Some(format!("exit: price crossed above EMA {mid}"));
        }
        if f.rsi <= self.config.exhaustion_low {
            return Some(format!("exit: RSI {:.1} exhausted", f.rsi));
        }
        let rise = f.close - f.prev_close;
        if rise > self.config.adverse_atr_multiple * f.atr {
            return Some(format!("exit: adverse move {:.1}x ATR", rise / f.atr));
        }
        None
    }
}
