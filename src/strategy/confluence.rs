use super::{
    signals::{calculate_indicators, confluence_signal, validate_candle_order, ConfluenceConfig},
    SignalGenerator,
};
use crate::models::{Candle, Prediction};

/// Fixed rule confluence of trend, momentum and volume indicators
///
/// Trend comes from SMA(10/30) and MACD(12,26,9), momentum from RSI(14) and
/// the slow stochastic, volume confirmation from OBV against its own SMA.
#[derive(Debug, Clone, Default)]
pub struct ConfluenceStrategy {
    config: ConfluenceConfig,
}

impl ConfluenceStrategy {
    pub fn new(config: ConfluenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfluenceConfig {
        &self.config
    }
}

impl SignalGenerator for ConfluenceStrategy {
    fn evaluate(&self, candles: &[Candle]) -> anyhow::Result<Prediction> {
        validate_candle_order(candles)?;

        let values = calculate_indicators(candles, &self.config)?;
        let signal = confluence_signal(&values, &self.config);

        tracing::debug!(
            signal = %signal,
            rsi = values.rsi,
            sma_short = values.sma_short,
            sma_long = values.sma_long,
            macd = values.macd,
            stoch_k = values.stoch_k,
            "Confluence evaluated"
        );

        Ok(Prediction {
            signal,
            rsi: Some(values.rsi),
        })
    }

    fn name(&self) -> &str {
        "ConfluenceStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.config.min_candles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_candles(prices: &[f64], volume: f64) -> Vec<Candle> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| Candle {
                timestamp: start + Duration::minutes(i as i64),
                open: price,
                high: price * 1.01,
                low: price * 0.99,
                close: price,
                volume,
            })
            .collect()
    }

    #[test]
    fn test_strategy_requires_sufficient_data() {
        let strategy = ConfluenceStrategy::default();
        let candles = create_test_candles(&[100.0, 101.0], 1000.0);

        let result = strategy.evaluate(&candles);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Insufficient data"));
    }

    #[test]
    fn test_min_candles_required() {
        let strategy = ConfluenceStrategy::default();
        assert_eq!(strategy.min_candles_required(), 45);
        assert_eq!(strategy.name(), "ConfluenceStrategy");
    }

    #[test]
    fn test_exhausted_uptrend_is_none() {
        // Straight-line rally pins RSI at 100, which blocks a long entry
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let candles = create_test_candles(&prices, 1000.0);

        let prediction = ConfluenceStrategy::default().evaluate(&candles).unwrap();
        assert_eq!(prediction.signal, Signal::None);
        assert_eq!(prediction.rsi, Some(100.0));
    }

    #[test]
    fn test_downtrend_never_goes_long() {
        let prices: Vec<f64> = (0..60).map(|i| 200.0 - i as f64 * 2.0).collect();
        let candles = create_test_candles(&prices, 1000.0);

        let prediction = ConfluenceStrategy::default().evaluate(&candles).unwrap();
        assert_ne!(prediction.signal, Signal::Long);
        assert!(prediction.rsi.is_some());
    }

    #[test]
    fn test_unordered_candles_rejected() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i % 7) as f64).collect();
        let mut candles = create_test_candles(&prices, 1000.0);
        candles.swap(10, 11);

        assert!(ConfluenceStrategy::default().evaluate(&candles).is_err());
    }

    #[test]
    fn test_nan_close_rejected() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i % 7) as f64).collect();
        let mut candles = create_test_candles(&prices, 1000.0);
        if let Some(last) = candles.last_mut() {
            last.close = f64::NAN;
        }

        assert!(ConfluenceStrategy::default().evaluate(&candles).is_err());
    }
}
