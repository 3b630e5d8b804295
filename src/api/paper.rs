use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{MarketDataSource, MexcClient, OrderGateway};
use crate::models::{MarketRules, OrderRequest, OrderResult, Position};

/// Simulated order gateway
///
/// Market orders fill immediately at the exchange's last price. Rules and
/// prices come from the live MEXC API; nothing is sent to an account.
pub struct PaperGateway {
    client: MexcClient,
    positions: RwLock<HashMap<String, Position>>,
    leverage: RwLock<HashMap<String, u32>>,
}

impl PaperGateway {
    pub fn new(client: MexcClient) -> Self {
        Self {
            client,
            positions: RwLock::new(HashMap::new()),
            leverage: RwLock::new(HashMap::new()),
        }
    }

    pub async fn leverage(&self, symbol: &str) -> Option<u32> {
        self.leverage.read().await.get(symbol).copied()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn market_rules(&self, symbol: &str) -> Result<MarketRules> {
        self.client.contract_rules(symbol).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        if leverage == 0 {
            anyhow::bail!("Leverage must be at least 1");
        }
        self.leverage
            .write()
            .await
            .insert(symbol.to_string(), leverage);
        tracing::info!("📝 [PAPER] Leverage for {} set to {}x", symbol, leverage);
        Ok(())
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal> {
        self.client.last_price(symbol).await
    }

    async fn place_market_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        if request.amount <= Decimal::ZERO {
            anyhow::bail!("Order amount must be positive");
        }
        if self.positions.read().await.contains_key(&request.symbol) {
            anyhow::bail!("Paper position already open for {}", request.symbol);
        }

        let price = self.client.last_price(&request.symbol).await?;
        let order_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let position = Position {
            symbol: request.symbol.clone(),
            side: request.side,
            size: request.amount,
            entry_price: price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            order_id: order_id.clone(),
            opened_at: now,
        };
        self.positions
            .write()
            .await
            .insert(request.symbol.clone(), position);

        tracing::info!(
            "📝 [PAPER] {} {} {} @ ${}",
            request.side.order_side(),
            request.amount,
            request.symbol,
            price
        );

        Ok(OrderResult {
            order_id,
            average_price: Some(price),
            filled_amount: request.amount,
            timestamp: now,
        })
    }

    async fn close(&self, position: &Position) -> Result<OrderResult> {
        if !self.positions.read().await.contains_key(&position.symbol) {
            anyhow::bail!("No paper position open for {}", position.symbol);
        }

        let price = self.client.last_price(&position.symbol).await?;
        self.positions.write().await.remove(&position.symbol);

        tracing::info!(
            "📝 [PAPER] {} {} {} @ ${} (close)",
            position.side.opposite().order_side(),
            position.size,
            position.symbol,
            price
        );

        Ok(OrderResult {
            order_id: Uuid::new_v4().to_string(),
            average_price: Some(price),
            filled_amount: position.size,
            timestamp: Utc::now(),
        })
    }

    async fn current_positions(&self, symbol: &str) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .read()
            .await
            .get(symbol)
            .cloned()
            .into_iter()
            .collect())
    }
}
