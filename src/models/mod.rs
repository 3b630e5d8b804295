use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV candlestick for one timeframe bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Latest fetched candles plus the price resolved from them
///
/// Replaced wholesale on every successful fetch.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub candles: Vec<Candle>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            fetched_at: Utc::now(),
        }
    }

    /// Close of the most recent candle, if it is a finite number
    pub fn latest_close(&self) -> Option<Decimal> {
        decimal_from_f64(self.candles.last()?.close)
    }
}

/// Shortest decimal representation of a finite float
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    value.to_string().parse().ok()
}

/// Direction of a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Order side used to open a position in this direction
    pub fn order_side(self) -> &'static str {
        match self {
            Side::Long => "buy",
            Side::Short => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Long),
            "short" | "sell" => Ok(Side::Short),
            other => Err(format!("Unknown side: {}", other)),
        }
    }
}

/// Directional trading signal
///
/// `None` is also the default when the signal generator fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Signal {
    Long,
    Short,
    #[default]
    None,
}

impl Signal {
    /// Side to open for this signal, if it asks for one
    pub fn side(self) -> Option<Side> {
        match self {
            Signal::Long => Some(Side::Long),
            Signal::Short => Some(Side::Short),
            Signal::None => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Long => write!(f, "LONG"),
            Signal::Short => write!(f, "SHORT"),
            Signal::None => write!(f, "NONE"),
        }
    }
}

/// Output of a signal generator: the signal plus an advisory RSI for display
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Prediction {
    pub signal: Signal,
    pub rsi: Option<f64>,
}

/// The single open trade for a symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub order_id: String,
    pub opened_at: DateTime<Utc>,
}

/// Exchange trading rules needed to build legal orders
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarketRules {
    pub price_step: Decimal,
    pub amount_step: Decimal,
    pub min_amount: Decimal,
}

/// Market order as handed to the order gateway
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub amount: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Confirmation returned by the order gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderResult {
    pub order_id: String,
    pub average_price: Option<Decimal>,
    pub filled_amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Candle bucket size
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    Min1,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour4,
    Day1,
}

impl Timeframe {
    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::Min1 => 60,
            Timeframe::Min5 => 300,
            Timeframe::Min15 => 900,
            Timeframe::Min30 => 1800,
            Timeframe::Hour1 => 3600,
            Timeframe::Hour4 => 14_400,
            Timeframe::Day1 => 86_400,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::Min1),
            "5m" => Ok(Timeframe::Min5),
            "15m" => Ok(Timeframe::Min15),
            "30m" => Ok(Timeframe::Min30),
            "1h" | "60m" => Ok(Timeframe::Hour1),
            "4h" => Ok(Timeframe::Hour4),
            "1d" => Ok(Timeframe::Day1),
            other => Err(format!("Unsupported timeframe: {}", other)),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.as_str().to_string()
    }
}
