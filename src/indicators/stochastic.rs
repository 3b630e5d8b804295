use super::moving_average::sma_series;

/// Smoothed stochastic oscillator values at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
}

/// Calculate the slow stochastic oscillator series
///
/// Raw %K is smoothed by `smooth_k`, %D is the `d_period` SMA of the smoothed %K.
/// Only fully defined points are returned, oldest first.
pub fn calculate_stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    smooth_k: usize,
    d_period: usize,
) -> Vec<Stochastic> {
    let len = closes.len();
    if k_period == 0 || highs.len() != len || lows.len() != len || len < k_period {
        return Vec::new();
    }

    let raw_k: Vec<f64> = (k_period - 1..len)
        .map(|i| {
            let window = i + 1 - k_period..=i;
            let highest = highs[window.clone()].iter().fold(f64::MIN, |a, &b| a.max(b));
            let lowest = lows[window].iter().fold(f64::MAX, |a, &b| a.min(b));
            let range = highest - lowest;
            if range == 0.0 {
                50.0
            } else {
                100.0 * (closes[i] - lowest) / range
            }
        })
        .collect();

    let slow_k: Vec<f64> = sma_series(&raw_k, smooth_k).into_iter().flatten().collect();
    let d = sma_series(&slow_k, d_period);

    slow_k
        .iter()
        .zip(d)
        .filter_map(|(k, d)| d.map(|d| Stochastic { k: *k, d }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stochastic_length() {
        let closes: Vec<f64> = (0..30).map(|i| 10.0 + (i % 5) as f64).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();

        let series = calculate_stochastic(&highs, &lows, &closes, 14, 3, 3);
        // 30 - 13 raw, -2 for smoothing, -2 for %D
        assert_eq!(series.len(), 13);
        assert!(series.iter().all(|s| (0.0..=100.0).contains(&s.k)));
    }

    #[test]
    fn test_stochastic_top_of_range() {
        let closes: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let series = calculate_stochastic(&closes, &closes, &closes, 5, 3, 3);
        let last = series.last().unwrap();
        assert_eq!(last.k, 100.0);
        assert_eq!(last.d, 100.0);
    }

    #[test]
    fn test_stochastic_mismatched_input() {
        assert!(calculate_stochastic(&[1.0], &[1.0, 2.0], &[1.0], 1, 1, 1).is_empty());
    }
}
