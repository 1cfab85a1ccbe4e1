/// Exponential moving average of `data` with smoothing `2 / (period + 1)`,
/// returning the value at the last element.
///
/// Seeded with the SMA of the first `period` values and then run across the
/// whole slice, so longer history converges closer to the textbook value.
/// Returns `None` when `data` holds fewer than `period` values.
pub fn ema(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);

    let mut ema_val: f64 = data[..period].iter().sum::<f64>() / period as f64;
    for &price in &data[period..] {
        ema_val = price * k + ema_val * (1.0 - k);
    }
    Some(ema_val)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_up(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn ema_returns_none_with_insufficient_data() {
        assert!(ema(&[1.0, 2.0], 3).is_none());
        assert!(ema(&[1.0, 2.0], 0).is_none());
    }

    #[test]
    fn ema_of_exact_period_is_the_sma() {
        let value = ema(&[1.0, 2.0, 3.0], 3).unwrap();
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn ema_of_constant_series_is_constant() {
        let value = ema(&[42.0; 50], 10).unwrap();
        assert!((value - 42.0).abs() < 1e-9);
    }

    #[test]
    fn ema_lags_a_rising_series() {
        let prices = trending_up(120);
        let fast = ema(&prices, 5).unwrap();
        let slow = ema(&prices, 50).unwrap();
        let last = *prices.last().unwrap();
        assert!(last > fast, "fast EMA {fast} should trail price {last}");
        assert!(fast > slow, "fast EMA {fast} should lead slow EMA {slow}");
    }

    #[test]
    fn ema_period_one_tracks_last_value() {
        let value = ema(&[3.0, 9.0, 4.0], 1).unwrap();
        assert!((value - 4.0).abs() < 1e-12);
    }
}
