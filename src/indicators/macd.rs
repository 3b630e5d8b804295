use super::moving_average::ema_series;

/// Latest MACD values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Calculate MACD (fast EMA - slow EMA) and its signal line
///
/// Returns None until the signal line has a full window of MACD values,
/// i.e. at least `slow + signal - 1` prices.
pub fn calculate_macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if fast == 0 || slow <= fast || signal == 0 {
        return None;
    }

    let fast_ema = ema_series(prices, fast);
    let slow_ema = ema_series(prices, slow);

    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .filter_map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let signal_line = ema_series(&macd_line, signal);
    let macd = *macd_line.last()?;
    let signal = (*signal_line.last()?)?;

    Some(Macd {
        macd,
        signal,
        histogram: macd - signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_insufficient_data() {
        let prices: Vec<f64> = (0..30).map(|i| i as f64).collect();
        // Needs 26 + 9 - 1 = 34 prices
        assert!(calculate_macd(&prices, 12, 26, 9).is_none());
    }

    #[test]
    fn test_macd_uptrend_positive() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let macd = calculate_macd(&prices, 12, 26, 9).unwrap();
        assert!(macd.macd > 0.0);
        assert!((macd.histogram - (macd.macd - macd.signal)).abs() < 1e-12);
    }

    #[test]
    fn test_macd_flat_is_zero() {
        let prices = vec![50.0; 40];
        let macd = calculate_macd(&prices, 12, 26, 9).unwrap();
        assert!(macd.macd.abs() < 1e-12);
        assert!(macd.signal.abs() < 1e-12);
    }

    #[test]
    fn test_macd_rejects_bad_periods() {
        let prices = vec![50.0; 40];
        assert!(calculate_macd(&prices, 26, 12, 9).is_none());
    }
}
