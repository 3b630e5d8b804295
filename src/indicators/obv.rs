use super::moving_average::calculate_sma;

/// On-Balance Volume series, starting at zero
pub fn calculate_obv_series(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    if closes.is_empty() || closes.len() != volumes.len() {
        return Vec::new();
    }

    let mut obv = Vec::with_capacity(closes.len());
    let mut running = 0.0;
    obv.push(running);

    for i in 1..closes.len() {
        if closes[i] > closes[i - 1] {
            running += volumes[i];
        } else if closes[i] < closes[i - 1] {
            running -= volumes[i];
        }
        obv.push(running);
    }

    obv
}

/// Latest OBV and the SMA of the OBV series over `period`
pub fn obv_with_sma(closes: &[f64], volumes: &[f64], period: usize) -> Option<(f64, f64)> {
    let obv = calculate_obv_series(closes, volumes);
    let latest = *obv.last()?;
    let sma = calculate_sma(&obv, period)?;
    Some((latest, sma))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obv_series() {
        let closes = vec![10.0, 11.0, 10.5, 10.5, 12.0];
        let volumes = vec![100.0, 200.0, 50.0, 70.0, 300.0];
        assert_eq!(
            calculate_obv_series(&closes, &volumes),
            vec![0.0, 200.0, 150.0, 150.0, 450.0]
        );
    }

    #[test]
    fn test_obv_with_sma_rising() {
        let closes: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let volumes = vec![10.0; 25];
        let (obv, sma) = obv_with_sma(&closes, &volumes, 20).unwrap();
        assert!(obv > sma);
    }

    #[test]
    fn test_obv_mismatched_lengths() {
        assert!(calculate_obv_series(&[1.0, 2.0], &[1.0]).is_empty());
        assert!(obv_with_sma(&[1.0], &[1.0], 20).is_none());
    }
}
