use crate::indicators::{
    calculate_macd, calculate_rsi, calculate_sma, calculate_stochastic, obv_with_sma,
};
use crate::models::{Candle, Signal};

/// Periods and thresholds of the confluence rule set
#[derive(Debug, Clone)]
pub struct ConfluenceConfig {
    pub sma_short_period: usize,
    pub sma_long_period: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub stoch_k_period: usize,
    pub stoch_smooth_k: usize,
    pub stoch_d_period: usize,
    pub obv_sma_period: usize,
    /// Extra candles on top of the longest indicator window
    pub warmup_buffer: usize,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            sma_short_period: 10,
            sma_long_period: 30,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            stoch_k_period: 14,
            stoch_smooth_k: 3,
            stoch_d_period: 3,
            obv_sma_period: 20,
            warmup_buffer: 10,
        }
    }
}

impl ConfluenceConfig {
    /// Number of candles needed before indicators are considered stable
    ///
    /// # Example
    /// ```
    /// use perpbot::strategy::ConfluenceConfig;
    ///
    /// // max(30, 14, 26 + 9, 20, 14 + 3) + 10
    /// assert_eq!(ConfluenceConfig::default().min_candles(), 45);
    /// ```
    pub fn min_candles(&self) -> usize {
        [
            self.sma_long_period,
            self.rsi_period,
            self.macd_slow + self.macd_signal,
            self.obv_sma_period,
            self.stoch_k_period + self.stoch_smooth_k,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + self.warmup_buffer
    }
}

/// Indicator readings at the latest candle (stochastic also at the previous one)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorValues {
    pub sma_short: f64,
    pub sma_long: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub prev_stoch_k: f64,
    pub prev_stoch_d: f64,
    pub obv: f64,
    pub obv_sma: f64,
}

impl IndicatorValues {
    fn all_finite(&self) -> bool {
        [
            self.sma_short,
            self.sma_long,
            self.rsi,
            self.macd,
            self.macd_signal,
            self.stoch_k,
            self.stoch_d,
            self.prev_stoch_k,
            self.prev_stoch_d,
            self.obv,
            self.obv_sma,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Validate that candles are strictly increasing in time
pub fn validate_candle_order(candles: &[Candle]) -> anyhow::Result<()> {
    for window in candles.windows(2) {
        if window[1].timestamp <= window[0].timestamp {
            anyhow::bail!(
                "Candles are not strictly increasing: {} followed by {}",
                window[0].timestamp.format("%Y-%m-%d %H:%M:%S"),
                window[1].timestamp.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    Ok(())
}

/// Compute every indicator the rule set needs
pub fn calculate_indicators(
    candles: &[Candle],
    config: &ConfluenceConfig,
) -> anyhow::Result<IndicatorValues> {
    let required = config.min_candles();
    if candles.len() < required {
        anyhow::bail!(
            "Insufficient data: {} candles, need {}",
            candles.len(),
            required
        );
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let missing = |name: &str| anyhow::anyhow!("Indicator {} could not be calculated", name);

    let sma_short =
        calculate_sma(&closes, config.sma_short_period).ok_or_else(|| missing("SMA short"))?;
    let sma_long =
        calculate_sma(&closes, config.sma_long_period).ok_or_else(|| missing("SMA long"))?;
    let rsi = calculate_rsi(&closes, config.rsi_period).ok_or_else(|| missing("RSI"))?;
    let macd = calculate_macd(&closes, config.macd_fast, config.macd_slow, config.macd_signal)
        .ok_or_else(|| missing("MACD"))?;

    let stoch = calculate_stochastic(
        &highs,
        &lows,
        &closes,
        config.stoch_k_period,
        config.stoch_smooth_k,
        config.stoch_d_period,
    );
    let (previous, latest) = match stoch.as_slice() {
        [.., previous, latest] => (*previous, *latest),
        _ => return Err(missing("Stochastic")),
    };

    let (obv, obv_sma) =
        obv_with_sma(&closes, &volumes, config.obv_sma_period).ok_or_else(|| missing("OBV"))?;

    let values = IndicatorValues {
        sma_short,
        sma_long,
        rsi,
        macd: macd.macd,
        macd_signal: macd.signal,
        stoch_k: latest.k,
        stoch_d: latest.d,
        prev_stoch_k: previous.k,
        prev_stoch_d: previous.d,
        obv,
        obv_sma,
    };

    if !values.all_finite() {
        anyhow::bail!("Indicator values contain NaN, waiting for more data");
    }

    Ok(values)
}

/// Combine indicator conditions into a single signal
///
/// LONG needs a bullish trend (SMA or MACD), RSI not overbought, bullish
/// stochastic and rising OBV. SHORT is the mirror image.
pub fn confluence_signal(values: &IndicatorValues, config: &ConfluenceConfig) -> Signal {
    let sma_trend_up = values.sma_short > values.sma_long;
    let sma_trend_down = values.sma_short < values.sma_long;
    let macd_trend_up = values.macd > values.macd_signal;
    let macd_trend_down = values.macd < values.macd_signal;

    let rsi_not_overbought = values.rsi < config.rsi_overbought;
    let rsi_not_oversold = values.rsi > config.rsi_oversold;

    let stoch_crossed_up =
        values.prev_stoch_k <= values.prev_stoch_d && values.stoch_k > values.stoch_d;
    let stoch_crossed_down =
        values.prev_stoch_k >= values.prev_stoch_d && values.stoch_k < values.stoch_d;

    let obv_rising = values.obv > values.obv_sma;
    let obv_falling = values.obv < values.obv_sma;

    let is_long = (sma_trend_up || macd_trend_up)
        && rsi_not_overbought
        && (stoch_crossed_up || values.stoch_k > values.stoch_d)
        && obv_rising;

    let is_short = (sma_trend_down || macd_trend_down)
        && rsi_not_oversold
        && (stoch_crossed_down || values.stoch_k < values.stoch_d)
        && obv_falling;

    if is_long {
        Signal::Long
    } else if is_short {
        Signal::Short
    } else {
        Signal::None
    }
}
