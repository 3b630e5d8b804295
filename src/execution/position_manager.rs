use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Position, Side};
use crate::sizing::{self, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
    /// Closed outside the loop, e.g. by an exchange-side order
    External,
}

impl From<Trigger> for ExitReason {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::StopHit => ExitReason::StopLoss,
            Trigger::TakeHit => ExitReason::TakeProfit,
        }
    }
}

/// Position state machine
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Open(Position),
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        matches!(self, PositionState::Open(_))
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Open(position) => Some(position),
            PositionState::Flat => None,
        }
    }
}

/// A position after its close was confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: Option<Decimal>,
    /// Quote-currency PnL; unknown when the exit or entry price is unknown
    pub realized_pnl: Option<Decimal>,
    pub reason: ExitReason,
    pub closed_at: DateTime<Utc>,
}

/// Realized results since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub realized_pnl: Decimal,
    pub trades: u32,
    pub wins: u32,
}

impl SessionStats {
    /// Win rate in percent, `None` before the first closed trade
    pub fn win_rate(&self) -> Option<f64> {
        if self.trades == 0 {
            return None;
        }
        Some(f64::from(self.wins) / f64::from(self.trades) * 100.0)
    }

    fn record(&mut self, pnl: Decimal) {
        self.realized_pnl += pnl;
        self.trades += 1;
        if pnl > Decimal::ZERO {
            self.wins += 1;
        }
    }
}

/// Owns the single position for the traded symbol
///
/// Only `open` moves Flat to Open and only `close` moves Open to Flat.
#[derive(Debug, Default)]
pub struct PositionManager {
    state: PositionState,
    stats: SessionStats,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.state.position()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Record a confirmed open
    pub fn open(&mut self, position: Position) -> anyhow::Result<()> {
        if let PositionState::Open(existing) = &self.state {
            anyhow::bail!(
                "Already have open {} position for {}",
                existing.side,
                existing.symbol
            );
        }

        tracing::info!(
            "📈 Position opened: {} {} {} @ ${} (SL: {}, TP: {})",
            position.side,
            position.size,
            position.symbol,
            position.entry_price,
            fmt_level(position.stop_loss),
            fmt_level(position.take_profit)
        );

        self.state = PositionState::Open(position);
        Ok(())
    }

    /// Record a confirmed close and update session stats
    pub fn close(
        &mut self,
        exit_price: Option<Decimal>,
        reason: ExitReason,
    ) -> anyhow::Result<ClosedTrade> {
        let position = match std::mem::take(&mut self.state) {
            PositionState::Open(position) => position,
            PositionState::Flat => anyhow::bail!("No open position to close"),
        };

        let realized_pnl = exit_price.and_then(|exit| realized_pnl(&position, exit));
        if let Some(pnl) = realized_pnl {
            self.stats.record(pnl);
        }

        tracing::info!(
            "📉 Position closed: {} {} ({:?}) exit: {}, P&L: {}",
            position.side,
            position.symbol,
            reason,
            fmt_level(exit_price),
            fmt_level(realized_pnl)
        );

        Ok(ClosedTrade {
            position,
            exit_price,
            realized_pnl,
            reason,
            closed_at: Utc::now(),
        })
    }

    /// Exit reason if the price crossed the open position's stop or take level
    pub fn should_exit(&self, current_price: Decimal) -> Option<ExitReason> {
        let position = self.position()?;
        sizing::check_trigger(position, current_price).map(ExitReason::from)
    }

    /// Unrealized PnL % of the open position
    pub fn unrealized_pnl_pct(&self, current_price: Option<Decimal>) -> Option<f64> {
        let position = self.position()?;
        sizing::unrealized_pnl_pct(position, current_price?)?.to_f64()
    }
}

/// Quote-currency PnL of closing `position` at `exit_price`
pub fn realized_pnl(position: &Position, exit_price: Decimal) -> Option<Decimal> {
    if position.entry_price <= Decimal::ZERO {
        return None;
    }
    let diff = match position.side {
        Side::Long => exit_price - position.entry_price,
        Side::Short => position.entry_price - exit_price,
    };
    Some(diff * position.size)
}

fn fmt_level(level: Option<Decimal>) -> String {
    level.map_or_else(|| "-".to_string(), |v| v.to_string())
}
