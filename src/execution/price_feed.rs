use std::sync::Arc;

use rust_decimal::Decimal;

use crate::api::MarketDataSource;
use crate::error::LoopError;
use crate::models::{Candle, MarketSnapshot, Timeframe};

/// Most recent market snapshot and the price resolved from it
///
/// Only the latest snapshot is retained.
pub struct PriceFeed {
    source: Arc<dyn MarketDataSource>,
    symbol: String,
    timeframe: Timeframe,
    limit: usize,
    snapshot: Option<MarketSnapshot>,
    current_price: Option<Decimal>,
}

impl PriceFeed {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        limit: usize,
    ) -> Self {
        Self {
            source,
            symbol: symbol.into(),
            timeframe,
            limit,
            snapshot: None,
            current_price: None,
        }
    }

    /// Fetch a new snapshot and recompute the current price
    ///
    /// On failure the previous snapshot and price are kept.
    pub async fn refresh(&mut self) -> Result<(), LoopError> {
        let candles = self
            .source
            .fetch_candles(&self.symbol, self.timeframe, self.limit)
            .await
            .map_err(|e| LoopError::DataFetchFailed(format!("{:#}", e)))?;

        if candles.is_empty() {
            return Err(LoopError::DataFetchFailed(format!(
                "No candles returned for {}",
                self.symbol
            )));
        }

        tracing::debug!(
            symbol = %self.symbol,
            candles = candles.len(),
            "Fetched market snapshot"
        );

        self.snapshot = Some(MarketSnapshot::new(candles));
        self.resolve_price().await;
        Ok(())
    }

    /// Prefer the latest candle close; ask the ticker only when the snapshot
    /// has no usable close
    async fn resolve_price(&mut self) {
        if let Some(close) = self.snapshot.as_ref().and_then(MarketSnapshot::latest_close) {
            self.current_price = Some(close);
            return;
        }

        match self.source.last_price(&self.symbol).await {
            Ok(price) => {
                tracing::debug!("Latest close unusable, using ticker price {}", price);
                self.current_price = Some(price);
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️  Ticker fallback for {} failed, keeping previous price: {:#}",
                    self.symbol,
                    e
                );
            }
        }
    }

    pub fn snapshot(&self) -> Option<&MarketSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn candles(&self) -> Option<&[Candle]> {
        self.snapshot.as_ref().map(|s| s.candles.as_slice())
    }

    pub fn current_price(&self) -> Option<Decimal> {
        self.current_price
    }
}
