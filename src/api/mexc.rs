use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::MarketDataSource;
use crate::config::ExchangeSettings;
use crate::models::{decimal_from_f64, Candle, MarketRules, Timeframe};

type MexcRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Public MEXC contract (futures) REST client
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct MexcClient {
    client: Client,
    base_url: String,
    fetch_attempts: u32,
    retry_backoff: Duration,
    rate_limiter: Arc<MexcRateLimiter>,
}

/// Every contract endpoint wraps its payload in this envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

/// Column-oriented kline payload; timestamps are unix seconds
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct KlineData {
    time: Vec<i64>,
    open: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    vol: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerData {
    last_price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractDetail {
    price_unit: f64,
    vol_unit: f64,
    contract_size: f64,
    min_vol: f64,
}

/// MEXC interval name for a timeframe
fn interval_name(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::Min1 => "Min1",
        Timeframe::Min5 => "Min5",
        Timeframe::Min15 => "Min15",
        Timeframe::Min30 => "Min30",
        Timeframe::Hour1 => "Min60",
        Timeframe::Hour4 => "Hour4",
        Timeframe::Day1 => "Day1",
    }
}

fn to_decimal(value: f64, field: &str) -> Result<Decimal> {
    decimal_from_f64(value).with_context(|| format!("Invalid {} value: {}", field, value))
}

impl KlineData {
    /// Zip the columns into candles sorted by time; missing prices become NaN
    fn into_candles(self) -> Vec<Candle> {
        let column = |values: &[Option<f64>], i: usize| -> f64 {
            values.get(i).copied().flatten().unwrap_or(f64::NAN)
        };

        let mut candles: Vec<Candle> = self
            .time
            .iter()
            .enumerate()
            .filter_map(|(i, &secs)| {
                let timestamp = DateTime::<Utc>::from_timestamp(secs, 0)?;
                Some(Candle {
                    timestamp,
                    open: column(&self.open, i),
                    high: column(&self.high, i),
                    low: column(&self.low, i),
                    close: column(&self.close, i),
                    volume: column(&self.vol, i),
                })
            })
            .collect();

        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
        candles
    }
}

impl MexcClient {
    pub fn new(settings: &ExchangeSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let per_second =
            NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            fetch_attempts: settings.fetch_attempts.max(1),
            retry_backoff: settings.retry_backoff(),
            rate_limiter,
        })
    }

    /// Rate-limited GET returning the unwrapped `data` payload
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("MEXC API error ({}): {}", status, error_text);
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))?;

        if !envelope.success {
            anyhow::bail!(
                "MEXC API error code {}: {}",
                envelope.code,
                envelope.message.unwrap_or_default()
            );
        }

        envelope
            .data
            .with_context(|| format!("Missing data in response from {}", path))
    }

    /// One kline request covering the last `limit` buckets
    async fn fetch_candles_once(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let end = Utc::now().timestamp();
        let span = timeframe.seconds() * i64::try_from(limit).unwrap_or(i64::MAX / 86_400);
        let start = end - span;

        let data: KlineData = self
            .get(
                &format!("/api/v1/contract/kline/{}", symbol),
                &[
                    ("interval", interval_name(timeframe).to_string()),
                    ("start", start.to_string()),
                    ("end", end.to_string()),
                ],
            )
            .await?;

        let mut candles = data.into_candles();
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    /// Contract trading rules: price tick, amount step and minimum amount in
    /// base currency
    pub async fn contract_rules(&self, symbol: &str) -> Result<MarketRules> {
        let detail: ContractDetail = self
            .get(
                "/api/v1/contract/detail",
                &[("symbol", symbol.to_string())],
            )
            .await?;

        let contract_size = to_decimal(detail.contract_size, "contractSize")?;
        let rules = MarketRules {
            price_step: to_decimal(detail.price_unit, "priceUnit")?,
            amount_step: contract_size * to_decimal(detail.vol_unit, "volUnit")?,
            min_amount: contract_size * to_decimal(detail.min_vol, "minVol")?,
        };

        tracing::info!(
            symbol = %symbol,
            price_step = %rules.price_step,
            amount_step = %rules.amount_step,
            min_amount = %rules.min_amount,
            "Loaded contract rules"
        );

        Ok(rules)
    }
}

#[async_trait]
impl MarketDataSource for MexcClient {
    /// Fetch candles with linear backoff between attempts
    ///
    /// An empty candle list counts as a failed attempt.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let mut last_error = None;

        for attempt in 1..=self.fetch_attempts {
            match self.fetch_candles_once(symbol, timeframe, limit).await {
                Ok(candles) if !candles.is_empty() => {
                    if attempt > 1 {
                        tracing::info!(
                            "✓ Fetched {} candles for {} after {} attempts",
                            candles.len(),
                            symbol,
                            attempt
                        );
                    }
                    return Ok(candles);
                }
                Ok(_) => {
                    last_error = Some(anyhow::anyhow!("Empty candle list for {}", symbol));
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }

            if attempt < self.fetch_attempts {
                let backoff = self.retry_backoff * attempt;
                tracing::warn!(
                    "Candle fetch for {} failed (attempt {}/{}), retrying in {:?}",
                    symbol,
                    attempt,
                    self.fetch_attempts,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Candle fetch failed"))
            .context(format!(
                "Failed to fetch candles for {} after {} attempts",
                symbol, self.fetch_attempts
            )))
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker: TickerData = self
            .get(
                "/api/v1/contract/ticker",
                &[("symbol", symbol.to_string())],
            )
            .await?;

        to_decimal(ticker.last_price, "lastPrice")
    }
}
