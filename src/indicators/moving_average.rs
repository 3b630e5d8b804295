/// Calculate Simple Moving Average (SMA) of the most recent `period` values
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA), seeded with the SMA of the first `period` values
pub fn calculate_ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied().flatten()
}

/// SMA for every position of `values`
///
/// Entries before the first full window are `None`.
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let mut window_sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(window_sum / period as f64);

    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        out[i] = Some(window_sum / period as f64);
    }

    out
}

/// EMA for every position of `values`, aligned like [`sma_series`]
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema);

    for i in period..values.len() {
        ema = (values[i] - ema) * multiplier + ema;
        out[i] = Some(ema);
    }

    out
}
