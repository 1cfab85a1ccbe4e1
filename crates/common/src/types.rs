use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Candle interval. Only the intervals listed here can be scanned; anything
/// else is rejected with `Error::ConfigInconsistency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == needle)
            .ok_or_else(|| Error::ConfigInconsistency(format!("unsupported timeframe '{s}'")))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// Normalise an instrument name: `"btc/usdt"` and `"BTC-USDT"` both become `"BTCUSDT"`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// One (symbol, timeframe) pair under evaluation. Identity is
/// `(symbol, timeframe)`; `active` is operator-controlled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTarget {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub active: bool,
}

impl ScanTarget {
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            timeframe,
            active: true,
        }
    }
}

impl std::fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// False for the bar that is still forming. Indicators must never treat
    /// such a bar as final.
    pub is_closed: bool,
}

/// Ordered candles for one target, most recent last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandleWindow {
    pub candles: Vec<Candle>,
}

impl CandleWindow {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// The fully elapsed bars: the trailing bar is dropped when it is still open.
    pub fn closed(&self) -> &[Candle] {
        match self.candles.last() {
            Some(last) if !last.is_closed => &self.candles[..self.candles.len() - 1],
            _ => &self.candles,
        }
    }
}

/// Classifier output direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    None,
    LongEntry,
    ShortEntry,
    CloseLong,
    CloseShort,
}

impl Direction {
    /// Every direction that can actually be emitted.
    pub const SIGNALS: [Direction; 4] = [
        Direction::LongEntry,
        Direction::ShortEntry,
        Direction::CloseLong,
        Direction::CloseShort,
    ];

    pub fn is_exit(&self) -> bool {
        matches!(self, Direction::CloseLong | Direction::CloseShort)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::None => "NONE",
            Direction::LongEntry => "LONG_ENTRY",
            Direction::ShortEntry => "SHORT_ENTRY",
            Direction::CloseLong => "CLOSE_LONG",
            Direction::CloseShort => "CLOSE_SHORT",
        }
    }

    /// Runtime-config key of the toggle gating this direction.
    pub fn setting_key(&self) -> Option<&'static str> {
        match self {
            Direction::None => None,
            Direction::LongEntry => Some("long_enabled"),
            Direction::ShortEntry => Some("short_enabled"),
            Direction::CloseLong => Some("close_long_enabled"),
            Direction::CloseShort => Some("close_short_enabled"),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Direction::None),
            "LONG_ENTRY" => Ok(Direction::LongEntry),
            "SHORT_ENTRY" => Ok(Direction::ShortEntry),
            "CLOSE_LONG" => Ok(Direction::CloseLong),
            "CLOSE_SHORT" => Ok(Direction::CloseShort),
            other => Err(Error::ConfigInconsistency(format!("unknown direction '{other}'"))),
        }
    }
}

/// Which verdict classes are globally enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionToggles {
    pub long_entry: bool,
    pub short_entry: bool,
    pub close_long: bool,
    pub close_short: bool,
}

impl Default for DirectionToggles {
    fn default() -> Self {
        Self::all_enabled()
    }
}

impl DirectionToggles {
    pub fn all_enabled() -> Self {
        Self {
            long_entry: true,
            short_entry: true,
            close_long: true,
            close_short: true,
        }
    }

    pub fn all_disabled() -> Self {
        Self {
            long_entry: false,
            short_entry: false,
            close_long: false,
            close_short: false,
        }
    }

    pub fn is_enabled(&self, direction: Direction) -> bool {
        match direction {
            Direction::None => false,
            Direction::LongEntry => self.long_entry,
            Direction::ShortEntry => self.short_entry,
            Direction::CloseLong => self.close_long,
            Direction::CloseShort => self.close_short,
        }
    }

    pub fn set(&mut self, direction: Direction, enabled: bool) {
        match direction {
            Direction::None => {}
            Direction::LongEntry => self.long_entry = enabled,
            Direction::ShortEntry => self.short_entry = enabled,
            Direction::CloseLong => self.close_long = enabled,
            Direction::CloseShort => self.close_short = enabled,
        }
    }
}

/// The classifier's verdict for one evaluation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalVerdict {
    pub target: ScanTarget,
    pub direction: Direction,
    /// Close of the last fully elapsed bar.
    pub price: f64,
    pub reason: String,
    pub evaluated_at: DateTime<Utc>,
}

impl SignalVerdict {
    pub fn is_signal(&self) -> bool {
        self.direction != Direction::None
    }
}

/// Outcome of one sink call inside a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkResult {
    pub sink: String,
    pub ok: bool,
    pub error: Option<String>,
}

impl SinkResult {
    pub fn success(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            ok: true,
            error: None,
        }
    }

    pub fn failure(sink: impl Into<String>, error: impl ToString) -> Self {
        Self {
            sink: sink.into(),
            ok: false,
            error: Some(error.to_string()),
        }
    }
}

/// Audit entry for an admitted verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: String,
    pub verdict: SignalVerdict,
    pub dispatched_at: DateTime<Utc>,
    pub sink_results: Vec<SinkResult>,
}

impl DispatchRecord {
    pub fn new(verdict: SignalVerdict, dispatched_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            verdict,
            dispatched_at,
            sink_results: Vec::new(),
        }
    }
}

/// Counters for one completed scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub targets: usize,
    /// Targets that made it through the indicator pipeline.
    pub evaluated: usize,
    /// Non-NONE verdicts produced.
    pub signals: usize,
    /// Verdicts rejected by the cooldown store.
    pub suppressed: usize,
    pub dispatched: usize,
    /// Targets skipped because of a gateway, data or config error.
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, is_closed: bool) -> Candle {
        Candle {
            open_time: Utc::now(),
            close_time: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            is_closed,
        }
    }

    #[test]
    fn timeframe_parses_supported_values() {
        assert_eq!("1h".parse::<Timeframe>().unwrap(), Timeframe::H1);
        assert_eq!(" 15M ".parse::<Timeframe>().unwrap(), Timeframe::M15);
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn timeframe_rejects_unsupported_value() {
        let err = "45m".parse::<Timeframe>().unwrap_err();
        assert!(matches!(err, Error::ConfigInconsistency(_)));
    }

    #[test]
    fn timeframe_deserializes_from_string() {
        let target: ScanTarget =
            serde_json::from_str(r#"{"symbol":"BTCUSDT","timeframe":"4h","active":true}"#).unwrap();
        assert_eq!(target.timeframe, Timeframe::H4);
        assert!(serde_json::from_str::<Timeframe>(r#""2d""#).is_err());
    }

    #[test]
    fn symbols_are_normalized() {
        assert_eq!(normalize_symbol("btc/usdt"), "BTCUSDT");
        assert_eq!(normalize_symbol("1000PEPE-USDT"), "1000PEPEUSDT");
        assert_eq!(ScanTarget::new("eth/usdt", Timeframe::M5).symbol, "ETHUSDT");
    }

    #[test]
    fn closed_drops_trailing_open_bar_only() {
        let window = CandleWindow::new(vec![candle(1.0, true), candle(2.0, true), candle(3.0, false)]);
        assert_eq!(window.closed().len(), 2);
        assert_eq!(window.closed().last().unwrap().close, 2.0);

        let all_closed = CandleWindow::new(vec![candle(1.0, true), candle(2.0, true)]);
        assert_eq!(all_closed.closed().len(), 2);
    }

    #[test]
    fn direction_round_trips_through_str() {
        for d in Direction::SIGNALS {
            assert_eq!(d.as_str().parse::<Direction>().unwrap(), d);
        }
        assert_eq!(serde_json::to_string(&Direction::CloseShort).unwrap(), r#""CLOSE_SHORT""#);
    }

    #[test]
    fn toggles_gate_each_direction_independently() {
        let mut toggles = DirectionToggles::all_enabled();
        toggles.set(Direction::CloseLong, false);
        assert!(!toggles.is_enabled(Direction::CloseLong));
        assert!(toggles.is_enabled(Direction::LongEntry));
        assert!(!toggles.is_enabled(Direction::None));
    }
}
