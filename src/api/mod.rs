// External collaborators of the trading loop
pub mod mexc;
pub mod paper;

pub use mexc::MexcClient;
pub use paper::PaperGateway;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{Candle, MarketRules, OrderRequest, OrderResult, Position, Timeframe};

/// Source of OHLCV candles and last-trade prices
///
/// Implementations carry their own request timeouts and retry policy; the
/// trading loop treats each call as a single fallible operation.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Candles ordered by strictly increasing timestamp
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    async fn last_price(&self, symbol: &str) -> Result<Decimal>;
}

/// Executes orders and reports open positions
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Exchange trading rules used to quantize orders
    async fn market_rules(&self, symbol: &str) -> Result<MarketRules>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Connectivity probe
    async fn last_price(&self, symbol: &str) -> Result<Decimal>;

    async fn place_market_order(&self, request: &OrderRequest) -> Result<OrderResult>;

    /// Close the full size of `position`
    async fn close(&self, position: &Position) -> Result<OrderResult>;

    async fn current_positions(&self, symbol: &str) -> Result<Vec<Position>>;
}
