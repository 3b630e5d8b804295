// Layered settings: defaults, optional TOML file, PERPBOT__* environment
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::Timeframe;

const ENV_PREFIX: &str = "PERPBOT";
const DEFAULT_CONFIG_FILE: &str = "perpbot";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub trading: TradingSettings,
    pub reporting: ReportingSettings,
}

/// MEXC contract REST client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
    pub fetch_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://contract.mexc.com".to_string(),
            request_timeout_secs: 10,
            requests_per_second: 10,
            fetch_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl ExchangeSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Trading parameters; the runtime-tunable subset is changed through
/// [`TradingSettings::apply_update`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TradingSettings {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle_limit: usize,
    /// Order size in base currency
    pub trade_amount: Decimal,
    pub leverage: u32,
    /// Percent units: 5 means 5%
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    /// Attach SL/TP to manual trades as well
    pub protect_manual_trades: bool,
    pub data_fetch_interval_secs: u64,
    pub prediction_interval_secs: u64,
    pub connection_check_interval_secs: u64,
    pub tick_millis: u64,
    pub command_queue_capacity: usize,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            symbol: "XRP_USDT".to_string(),
            timeframe: Timeframe::Min1,
            candle_limit: 100,
            trade_amount: Decimal::ONE_HUNDRED,
            leverage: 10,
            stop_loss_pct: Decimal::new(5, 2),
            take_profit_pct: Decimal::new(1, 1),
            protect_manual_trades: false,
            data_fetch_interval_secs: 5,
            prediction_interval_secs: 1,
            connection_check_interval_secs: 10,
            tick_millis: 100,
            command_queue_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportingSettings {
    /// Broadcast buffer; lagging subscribers lose the oldest events
    pub snapshot_capacity: usize,
    /// Minimum spacing between two reports of the same error kind
    pub error_throttle_secs: u64,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            snapshot_capacity: 64,
            error_throttle_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from an optional file and the environment
    ///
    /// Without an explicit path, `perpbot.toml` in the working directory is
    /// used if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchange.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("exchange.base_url is empty".into()));
        }
        if self.exchange.fetch_attempts == 0 {
            return Err(ConfigError::Invalid(
                "exchange.fetch_attempts must be at least 1".into(),
            ));
        }
        if self.exchange.requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "exchange.requests_per_second must be positive".into(),
            ));
        }
        if self.reporting.snapshot_capacity == 0 {
            return Err(ConfigError::Invalid(
                "reporting.snapshot_capacity must be positive".into(),
            ));
        }
        self.trading.validate()
    }
}

impl TradingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("trading.symbol is empty".into()));
        }
        if self.trade_amount <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "trading.trade_amount must be positive".into(),
            ));
        }
        if self.leverage < 1 {
            return Err(ConfigError::Invalid(
                "trading.leverage must be at least 1".into(),
            ));
        }
        if self.stop_loss_pct < Decimal::ZERO || self.take_profit_pct < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "stop-loss/take-profit percentages cannot be negative".into(),
            ));
        }
        if self.stop_loss_pct >= Decimal::ONE_HUNDRED {
            return Err(ConfigError::Invalid(
                "trading.stop_loss_pct must be below 100".into(),
            ));
        }
        if self.take_profit_pct >= Decimal::ONE_HUNDRED {
            return Err(ConfigError::Invalid(
                "trading.take_profit_pct must be below 100".into(),
            ));
        }
        if self.data_fetch_interval_secs == 0
            || self.prediction_interval_secs == 0
            || self.connection_check_interval_secs == 0
            || self.tick_millis == 0
        {
            return Err(ConfigError::Invalid("intervals must be non-zero".into()));
        }
        if self.candle_limit == 0 || self.command_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "trading.candle_limit and trading.command_queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn data_fetch_interval(&self) -> Duration {
        Duration::from_secs(self.data_fetch_interval_secs)
    }

    pub fn prediction_interval(&self) -> Duration {
        Duration::from_secs(self.prediction_interval_secs)
    }

    pub fn connection_check_interval(&self) -> Duration {
        Duration::from_secs(self.connection_check_interval_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Apply an operator setting change
    ///
    /// Accepts snake_case or kebab-case names. The update is validated on a
    /// copy, so a rejected value leaves every setting untouched.
    pub fn apply_update(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let key = name.trim().to_ascii_lowercase().replace('-', "_");
        let value = value.trim();
        let invalid = || ConfigError::InvalidValue {
            name: key.clone(),
            value: value.to_string(),
        };

        let mut updated = self.clone();
        match key.as_str() {
            "trade_amount" => updated.trade_amount = value.parse().map_err(|_| invalid())?,
            "leverage" => updated.leverage = value.parse().map_err(|_| invalid())?,
            "stop_loss_pct" => updated.stop_loss_pct = value.parse().map_err(|_| invalid())?,
            "take_profit_pct" => updated.take_profit_pct = value.parse().map_err(|_| invalid())?,
            "protect_manual_trades" => {
                updated.protect_manual_trades = parse_bool(value).ok_or_else(invalid)?
            }
            "data_fetch_interval_secs" => {
                updated.data_fetch_interval_secs = value.parse().map_err(|_| invalid())?
            }
            "prediction_interval_secs" => {
                updated.prediction_interval_secs = value.parse().map_err(|_| invalid())?
            }
            "connection_check_interval_secs" => {
                updated.connection_check_interval_secs = value.parse().map_err(|_| invalid())?
            }
            _ => return Err(ConfigError::UnknownSetting(name.to_string())),
        }

        updated.validate().map_err(|_| invalid())?;
        *self = updated;

        tracing::info!("⚙️  Setting {} updated to {}", key, value);
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
