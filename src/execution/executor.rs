use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::api::OrderGateway;
use crate::config::TradingSettings;
use crate::error::LoopError;
use crate::execution::PositionState;
use crate::models::{OrderRequest, OrderResult, Position, Side, Signal};
use crate::sizing::{PositionSizer, StopTake};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Open { side: Side },
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

impl ExecutionDecision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: ExecutionAction::Skip,
            reason: reason.into(),
        }
    }
}

/// Decide what an automated signal means for the current state
///
/// Only a Flat state acts on a signal. An open position is never reversed or
/// scaled.
pub fn process_signal(signal: Signal, state: &PositionState) -> ExecutionDecision {
    match (signal.side(), state) {
        (None, _) => ExecutionDecision::skip("No signal"),
        (Some(side), PositionState::Flat) => ExecutionDecision {
            action: ExecutionAction::Open { side },
            reason: format!("{} signal while flat", signal),
        },
        (Some(side), PositionState::Open(position)) if side != position.side => {
            ExecutionDecision::skip(format!(
                "{} signal disagrees with open {} position",
                signal, position.side
            ))
        }
        (Some(_), PositionState::Open(position)) => ExecutionDecision::skip(format!(
            "Already have open {} position",
            position.side
        )),
    }
}

/// Places and closes orders through the gateway
pub struct TradeExecutor {
    gateway: Arc<dyn OrderGateway>,
    sizer: PositionSizer,
}

impl TradeExecutor {
    pub fn new(gateway: Arc<dyn OrderGateway>, sizer: PositionSizer) -> Self {
        Self { gateway, sizer }
    }

    /// Open a position of the configured size
    ///
    /// With `protect`, stop-loss/take-profit levels are derived from
    /// `reference_price` and attached to the order. Nothing changes on failure.
    pub async fn open(
        &self,
        side: Side,
        reference_price: Option<Decimal>,
        trading: &TradingSettings,
        protect: bool,
    ) -> Result<Position, LoopError> {
        let amount = self
            .sizer
            .quantize_amount(trading.trade_amount)
            .map_err(|e| LoopError::TradeFailed(e.to_string()))?;

        let levels = match (protect, reference_price) {
            (true, Some(price)) => self
                .sizer
                .stop_take(price, side, trading.stop_loss_pct, trading.take_profit_pct)
                .map_err(|e| LoopError::TradeFailed(e.to_string()))?,
            (true, None) => {
                tracing::warn!("⚠️  No reference price, placing {} order without SL/TP", side);
                StopTake::default()
            }
            (false, _) => StopTake::default(),
        };

        let request = OrderRequest {
            symbol: trading.symbol.clone(),
            side,
            amount,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
        };

        tracing::info!(
            "🚀 Placing {} market order: {} {} (ref: {})",
            side,
            amount,
            trading.symbol,
            reference_price.map_or_else(|| "-".to_string(), |p| p.to_string())
        );

        let result = self
            .gateway
            .place_market_order(&request)
            .await
            .map_err(|e| LoopError::TradeFailed(format!("{:#}", e)))?;

        Ok(self.position_from_fill(request, result, reference_price))
    }

    fn position_from_fill(
        &self,
        request: OrderRequest,
        result: OrderResult,
        reference_price: Option<Decimal>,
    ) -> Position {
        let entry_price = match result.average_price.or(reference_price) {
            Some(price) => price,
            None => {
                tracing::warn!(
                    "⚠️  Order {} has no fill price, entry recorded as 0 (PnL unavailable)",
                    result.order_id
                );
                Decimal::ZERO
            }
        };

        let size = if result.filled_amount > Decimal::ZERO {
            result.filled_amount
        } else {
            request.amount
        };

        Position {
            symbol: request.symbol,
            side: request.side,
            size,
            entry_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            order_id: result.order_id,
            opened_at: Utc::now(),
        }
    }

    /// Close the full position
    pub async fn close(&self, position: &Position) -> Result<OrderResult, LoopError> {
        tracing::info!(
            "🔻 Closing {} {} {}",
            position.side,
            position.size,
            position.symbol
        );

        self.gateway
            .close(position)
            .await
            .map_err(|e| LoopError::CloseFailed(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketRules;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    /// Gateway that records requests and fills at a fixed price
    struct RecordingGateway {
        fill_price: Option<Decimal>,
        fail: bool,
        requests: Mutex<Vec<OrderRequest>>,
    }

    impl RecordingGateway {
        fn new(fill_price: Option<&str>) -> Self {
            Self {
                fill_price: fill_price.map(d),
                fail: false,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrderGateway for RecordingGateway {
        async fn market_rules(&self, _symbol: &str) -> anyhow::Result<MarketRules> {
            unreachable!()
        }

        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> anyhow::Result<()> {
            Ok(())
        }

        async fn last_price(&self, _symbol: &str) -> anyhow::Result<Decimal> {
            Ok(d("0.5"))
        }

        async fn place_market_order(
            &self,
            request: &OrderRequest,
        ) -> anyhow::Result<OrderResult> {
            if self.fail {
                anyhow::bail!("insufficient margin");
            }
            self.requests.lock().unwrap().push(request.clone());
            Ok(OrderResult {
                order_id: "order-1".to_string(),
                average_price: self.fill_price,
                filled_amount: request.amount,
                timestamp: Utc::now(),
            })
        }

        async fn close(&self, _position: &Position) -> anyhow::Result<OrderResult> {
            if self.fail {
                anyhow::bail!("exchange unavailable");
            }
            Ok(OrderResult {
                order_id: "close-1".to_string(),
                average_price: self.fill_price,
                filled_amount: Decimal::ZERO,
                timestamp: Utc::now(),
            })
        }

        async fn current_positions(&self, _symbol: &str) -> anyhow::Result<Vec<Position>> {
            Ok(Vec::new())
        }
    }

    fn sizer() -> PositionSizer {
        PositionSizer::new(MarketRules {
            price_step: d("0.0001"),
            amount_step: d("1"),
            min_amount: d("1"),
        })
        .unwrap()
    }

    fn open_state(side: Side) -> PositionState {
        PositionState::Open(Position {
            symbol: "XRP_USDT".to_string(),
            side,
            size: d("100"),
            entry_price: d("0.5"),
            stop_loss: None,
            take_profit: None,
            order_id: "1".to_string(),
            opened_at: Utc::now(),
        })
    }

    #[test]
    fn test_open_when_flat() {
        let decision = process_signal(Signal::Long, &PositionState::Flat);
        assert_eq!(decision.action, ExecutionAction::Open { side: Side::Long });
    }

    #[test]
    fn test_no_signal_skips() {
        let decision = process_signal(Signal::None, &PositionState::Flat);
        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("No signal"));
    }

    #[test]
    fn test_disagreement_skips() {
        let decision = process_signal(Signal::Long, &open_state(Side::Short));
        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("disagrees"));
    }

    #[test]
    fn test_same_side_skips() {
        let decision = process_signal(Signal::Short, &open_state(Side::Short));
        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("Already have"));
    }

    #[tokio::test]
    async fn test_open_with_protection() {
        let gateway = Arc::new(RecordingGateway::new(Some("0.5")));
        let executor = TradeExecutor::new(gateway.clone(), sizer());
        let trading = TradingSettings {
            trade_amount: d("100.7"),
            stop_loss_pct: d("5"),
            take_profit_pct: d("10"),
            ..TradingSettings::default()
        };

        let position = executor
            .open(Side::Short, Some(d("0.5")), &trading, true)
            .await
            .unwrap();

        assert_eq!(position.size, d("100"));
        assert_eq!(position.entry_price, d("0.5"));
        assert_eq!(position.stop_loss, Some(d("0.5250")));
        assert_eq!(position.take_profit, Some(d("0.4500")));

        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].side, Side::Short);
        assert_eq!(requests[0].stop_loss, Some(d("0.525")));
    }

    #[tokio::test]
    async fn test_open_unprotected_manual_trade() {
        let gateway = Arc::new(RecordingGateway::new(None));
        let executor = TradeExecutor::new(gateway, sizer());

        let position = executor
            .open(Side::Long, Some(d("0.51")), &TradingSettings::default(), false)
            .await
            .unwrap();

        assert_eq!(position.stop_loss, None);
        assert_eq!(position.take_profit, None);
        // Falls back to the reference price when the fill has none
        assert_eq!(position.entry_price, d("0.51"));
    }

    #[tokio::test]
    async fn test_open_below_minimum_fails_without_order() {
        let gateway = Arc::new(RecordingGateway::new(Some("0.5")));
        let executor = TradeExecutor::new(gateway.clone(), sizer());
        let trading = TradingSettings {
            trade_amount: d("0.5"),
            ..TradingSettings::default()
        };

        let result = executor.open(Side::Long, Some(d("0.5")), &trading, true).await;

        assert!(matches!(result, Err(LoopError::TradeFailed(_))));
        assert!(gateway.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_amount_fails_without_order() {
        let gateway = Arc::new(RecordingGateway::new(Some("0.5")));
        let fine_steps = PositionSizer::new(MarketRules {
            price_step: d("0.0001"),
            amount_step: d("0.0001"),
            min_amount: d("1"),
        })
        .unwrap();
        let executor = TradeExecutor::new(gateway.clone(), fine_steps);

        let mut trading = TradingSettings::default();
        trading
            .apply_update("trade_amount", "10000000000000000000000000")
            .unwrap();

        let result = executor.open(Side::Long, Some(d("0.5")), &trading, true).await;

        assert!(matches!(result, Err(LoopError::TradeFailed(msg)) if msg.contains("overflow")));
        assert!(gateway.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failures_map_to_loop_errors() {
        let gateway = Arc::new(RecordingGateway {
            fail: true,
            ..RecordingGateway::new(Some("0.5"))
        });
        let executor = TradeExecutor::new(gateway, sizer());

        let open = executor
            .open(Side::Long, Some(d("0.5")), &TradingSettings::default(), true)
            .await;
        assert!(matches!(open, Err(LoopError::TradeFailed(msg)) if msg.contains("margin")));

        let state = open_state(Side::Long);
        let close = executor.close(state.position().unwrap()).await;
        assert!(matches!(close, Err(LoopError::CloseFailed(_))));
    }
}
