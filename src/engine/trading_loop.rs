use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::command::Command;
use super::schedule::Schedule;
use super::status::{
    ConnectionStatus, MetricsSnapshot, NotificationLevel, StatusEvent, StatusPublisher,
};
use super::throttle::ReportThrottle;
use crate::api::{MarketDataSource, OrderGateway};
use crate::config::{ReportingSettings, TradingSettings};
use crate::error::LoopError;
use crate::execution::{
    process_signal, ExecutionAction, ExecutionDecision, ExitReason, PositionManager,
    PositionState, PriceFeed, SessionStats, TradeExecutor,
};
use crate::models::{Position, Prediction, Side, Signal};
use crate::sizing::PositionSizer;
use crate::strategy::SignalGenerator;

/// A state change made during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened(Side),
    Closed(ExitReason),
}

/// What happened during one tick
#[derive(Debug, Default)]
pub struct TickReport {
    pub errors: Vec<LoopError>,
    /// Decision taken on the automated signal, if a prediction ran
    pub decision: Option<ExecutionDecision>,
    pub transitions: Vec<Transition>,
}

impl TickReport {
    pub fn transitioned(&self) -> bool {
        !self.transitions.is_empty()
    }
}

/// Collaborators handed to the loop at construction
pub struct LoopDeps {
    pub market: Arc<dyn MarketDataSource>,
    pub strategy: Arc<dyn SignalGenerator>,
    pub gateway: Arc<dyn OrderGateway>,
    pub commands: mpsc::Receiver<Command>,
    pub publisher: StatusPublisher,
}

/// Single-task trading control loop
///
/// Owns the position state. Operator commands arrive through the command
/// queue and status leaves through the publisher; nothing else touches the
/// loop's state.
pub struct TradingLoop {
    trading: TradingSettings,
    feed: PriceFeed,
    strategy: Arc<dyn SignalGenerator>,
    gateway: Arc<dyn OrderGateway>,
    executor: TradeExecutor,
    positions: PositionManager,
    commands: mpsc::Receiver<Command>,
    publisher: StatusPublisher,
    throttle: ReportThrottle,
    schedule: Schedule,
    prediction: Prediction,
    connection: ConnectionStatus,
}

impl std::fmt::Debug for TradingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingLoop").finish_non_exhaustive()
    }
}

impl TradingLoop {
    /// Load market rules, set leverage and adopt an existing position
    ///
    /// Fails with `HandlerInitFailed` when the market rules cannot be loaded
    /// or are unusable; the loop then never starts.
    pub async fn initialize(
        trading: TradingSettings,
        reporting: &ReportingSettings,
        deps: LoopDeps,
    ) -> Result<Self, LoopError> {
        let LoopDeps {
            market,
            strategy,
            gateway,
            commands,
            publisher,
        } = deps;
        let symbol = trading.symbol.clone();

        tracing::info!(
            "🔧 Initializing trading loop for {} ({}, strategy: {})",
            symbol,
            trading.timeframe,
            strategy.name()
        );

        let rules = gateway.market_rules(&symbol).await.map_err(|e| {
            LoopError::HandlerInitFailed(format!("market rules for {}: {:#}", symbol, e))
        })?;
        let sizer = PositionSizer::new(rules)
            .map_err(|e| LoopError::HandlerInitFailed(format!("market rules: {}", e)))?;

        if let Err(e) = gateway.set_leverage(&symbol, trading.leverage).await {
            tracing::warn!(
                "⚠️  Could not set leverage {}x for {}: {:#}",
                trading.leverage,
                symbol,
                e
            );
        }

        let mut positions = PositionManager::new();
        match gateway.current_positions(&symbol).await {
            Ok(existing) => {
                if existing.len() > 1 {
                    tracing::warn!(
                        "⚠️  Exchange reports {} positions for {}, adopting the first",
                        existing.len(),
                        symbol
                    );
                }
                if let Some(position) = existing.into_iter().next() {
                    tracing::info!(
                        "♻️  Adopting existing {} position {}",
                        position.side,
                        position.order_id
                    );
                    positions
                        .open(position)
                        .map_err(|e| LoopError::HandlerInitFailed(e.to_string()))?;
                }
            }
            Err(e) => tracing::warn!("⚠️  Could not query open positions: {:#}", e),
        }

        let feed = PriceFeed::new(market, symbol, trading.timeframe, trading.candle_limit);
        let executor = TradeExecutor::new(gateway.clone(), sizer);

        Ok(Self {
            feed,
            strategy,
            gateway,
            executor,
            positions,
            commands,
            publisher,
            throttle: ReportThrottle::new(std::time::Duration::from_secs(
                reporting.error_throttle_secs,
            )),
            schedule: Schedule::new(Instant::now()),
            prediction: Prediction::default(),
            connection: ConnectionStatus::Unknown,
            trading,
        })
    }

    pub fn state(&self) -> &PositionState {
        self.positions.state()
    }

    pub fn position(&self) -> Option<&Position> {
        self.positions.position()
    }

    pub fn stats(&self) -> &SessionStats {
        self.positions.stats()
    }

    pub fn prediction(&self) -> Prediction {
        self.prediction
    }

    pub fn feed(&self) -> &PriceFeed {
        &self.feed
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn settings(&self) -> &TradingSettings {
        &self.trading
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    /// Run ticks until the stop signal is set or its sender is dropped
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> SessionStats {
        tracing::info!("🚀 Trading loop started for {}", self.trading.symbol);

        loop {
            if *stop.borrow() {
                break;
            }

            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.trading.tick()) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let stats = *self.positions.stats();
        tracing::info!(
            "🛑 Trading loop stopped: {} trades, realized P&L {}",
            stats.trades,
            stats.realized_pnl
        );
        if self.positions.is_open() {
            tracing::warn!("⚠️  Position still open at shutdown");
        }
        stats
    }

    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now()).await
    }

    /// One loop iteration at `now`
    pub async fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        // Commands take priority over periodic work
        match self.commands.try_recv() {
            Ok(command) => self.handle_command(command, now, &mut report).await,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }

        if self.schedule.connection_check_due(now) {
            self.check_connection(&mut report).await;
            self.schedule
                .connection_checked(now, self.trading.connection_check_interval());
        }

        if self.schedule.fetch_due(now) {
            match self.feed.refresh().await {
                Ok(()) => self
                    .schedule
                    .fetch_succeeded(now, self.trading.data_fetch_interval()),
                Err(e) => {
                    self.schedule
                        .fetch_failed(now, self.trading.data_fetch_interval());
                    self.report_error(&mut report, e);
                }
            }
        }

        let has_price = self.feed.current_price().is_some();
        if self.schedule.prediction_due(now) && self.feed.snapshot().is_some() && has_price {
            self.schedule
                .prediction_ran(now, self.trading.prediction_interval());
            self.predict_and_trade(&mut report).await;
        }

        if let Some(price) = self.feed.current_price() {
            if let Some(reason) = self.positions.should_exit(price) {
                tracing::info!("🎯 {:?} triggered at ${}", reason, price);
                self.close_position(reason, &mut report).await;
            }
        }

        self.publish_metrics();
        report
    }

    async fn handle_command(&mut self, command: Command, now: Instant, report: &mut TickReport) {
        tracing::info!("📥 Command: {:?}", command);

        match command {
            Command::ManualTrade { side } => {
                if let Some(position) = self.positions.position() {
                    let error = LoopError::TradeFailed(format!(
                        "manual {} rejected, {} position already open",
                        side, position.side
                    ));
                    self.report_error(report, error);
                    return;
                }
                let protect = self.trading.protect_manual_trades;
                self.open_position(side, protect, report).await;
            }
            Command::ClosePosition => {
                if !self.positions.is_open() {
                    self.report_error(
                        report,
                        LoopError::InvalidCommand("no open position to close".to_string()),
                    );
                    return;
                }
                self.close_position(ExitReason::Manual, report).await;
            }
            Command::RefreshData => {
                self.schedule.refresh_now(now);
            }
            Command::UpdateSetting { name, value } => {
                match self.trading.apply_update(&name, &value) {
                    Ok(()) => {
                        self.publisher.notify(
                            NotificationLevel::Info,
                            format!("Setting {} updated to {}", name, value),
                        );
                        if name.replace('-', "_").eq_ignore_ascii_case("leverage") {
                            self.apply_leverage().await;
                        }
                    }
                    Err(e) => self.report_error(report, LoopError::InvalidCommand(e.to_string())),
                }
            }
        }
    }

    async fn apply_leverage(&self) {
        if let Err(e) = self
            .gateway
            .set_leverage(&self.trading.symbol, self.trading.leverage)
            .await
        {
            tracing::warn!("⚠️  Could not set leverage: {:#}", e);
            self.publisher.notify(
                NotificationLevel::Warning,
                format!("Leverage change not applied on exchange: {}", e),
            );
        }
    }

    /// Probe the gateway and reconcile an open position that was closed
    /// outside the loop
    async fn check_connection(&mut self, report: &mut TickReport) {
        let status = match self.gateway.last_price(&self.trading.symbol).await {
            Ok(_) => ConnectionStatus::Connected,
            Err(e) => {
                tracing::warn!("📡 Connectivity check failed: {:#}", e);
                ConnectionStatus::Disconnected
            }
        };

        if status != self.connection {
            tracing::info!("📡 Connection status: {:?}", status);
            self.connection = status;
            self.publisher.publish(StatusEvent::Connection(status));
        }

        if status != ConnectionStatus::Connected || !self.positions.is_open() {
            return;
        }

        match self.gateway.current_positions(&self.trading.symbol).await {
            Ok(open) if open.is_empty() => {
                tracing::info!("🔄 Position closed outside the loop, marking flat");
                if let Ok(closed) = self.positions.close(None, ExitReason::External) {
                    self.publisher.notify(
                        NotificationLevel::Warning,
                        format!("{} position closed externally", closed.position.side),
                    );
                    self.publisher.publish(StatusEvent::PositionClosed(closed));
                    report.transitions.push(Transition::Closed(ExitReason::External));
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️  Position reconciliation failed: {:#}", e),
        }
    }

    async fn predict_and_trade(&mut self, report: &mut TickReport) {
        let Some(candles) = self.feed.candles() else {
            return;
        };

        let required = self.strategy.min_candles_required();
        if candles.len() < required {
            tracing::debug!(
                "Waiting for history: {}/{} candles for {}",
                candles.len(),
                required,
                self.strategy.name()
            );
            self.prediction = Prediction::default();
            report.decision = Some(process_signal(Signal::None, self.positions.state()));
            return;
        }

        self.prediction = match self.strategy.evaluate(candles) {
            Ok(prediction) => prediction,
            Err(e) => {
                self.report_error(report, LoopError::PredictionFailed(format!("{:#}", e)));
                Prediction::default()
            }
        };

        let decision = process_signal(self.prediction.signal, self.positions.state());
        match &decision.action {
            ExecutionAction::Open { side } => {
                tracing::info!("📊 {}", decision.reason);
                self.open_position(*side, true, report).await;
            }
            ExecutionAction::Skip if self.prediction.signal != Signal::None => {
                tracing::info!("↔️  {}", decision.reason);
            }
            ExecutionAction::Skip => {
                tracing::debug!("{}", decision.reason);
            }
        }
        report.decision = Some(decision);
    }

    async fn open_position(&mut self, side: Side, protect: bool, report: &mut TickReport) {
        let price = self.feed.current_price();
        let result = self.executor.open(side, price, &self.trading, protect).await;

        let position = match result {
            Ok(position) => position,
            Err(e) => {
                self.report_error(report, e);
                return;
            }
        };

        let message = format!(
            "Opened {} {} {} @ {}",
            position.side, position.size, position.symbol, position.entry_price
        );
        match self.positions.open(position) {
            Ok(()) => {
                self.publisher.notify(NotificationLevel::Info, message);
                report.transitions.push(Transition::Opened(side));
            }
            Err(e) => self.report_error(report, LoopError::TradeFailed(e.to_string())),
        }
    }

    /// Close the open position; on failure stay Open and retry next tick
    async fn close_position(&mut self, reason: ExitReason, report: &mut TickReport) {
        let Some(position) = self.positions.position().cloned() else {
            return;
        };

        let result = match self.executor.close(&position).await {
            Ok(result) => result,
            Err(e) => {
                self.report_error(report, e);
                return;
            }
        };

        let exit_price = result.average_price.or(self.feed.current_price());
        match self.positions.close(exit_price, reason) {
            Ok(closed) => {
                self.publisher.notify(
                    NotificationLevel::Info,
                    format!(
                        "Closed {} {} ({:?}), P&L: {}",
                        closed.position.side,
                        closed.position.symbol,
                        reason,
                        closed
                            .realized_pnl
                            .map_or_else(|| "n/a".to_string(), |p| p.to_string())
                    ),
                );
                self.publisher.publish(StatusEvent::PositionClosed(closed));
                report.transitions.push(Transition::Closed(reason));
            }
            Err(e) => self.report_error(report, LoopError::CloseFailed(e.to_string())),
        }
    }

    /// Log, notify observers unless throttled, and record in the tick report
    fn report_error(&self, report: &mut TickReport, error: LoopError) {
        let level = match &error {
            LoopError::TradeFailed(_) | LoopError::CloseFailed(_) => {
                tracing::error!("❌ {}", error);
                NotificationLevel::Error
            }
            _ => {
                tracing::warn!("⚠️  {}", error);
                NotificationLevel::Warning
            }
        };

        if self.throttle.should_report(error.kind()) {
            self.publisher.notify(level, error.to_string());
        } else {
            tracing::debug!("Suppressed repeated {:?} report", error.kind());
        }

        report.errors.push(error);
    }

    fn publish_metrics(&self) {
        let current_price = self.feed.current_price();
        self.publisher.metrics(MetricsSnapshot {
            timestamp: Utc::now(),
            symbol: self.trading.symbol.clone(),
            current_price,
            signal: self.prediction.signal,
            rsi: self.prediction.rsi,
            position: self.positions.position().cloned(),
            unrealized_pnl_pct: self.positions.unrealized_pnl_pct(current_price),
            stats: *self.positions.stats(),
            connection: self.connection,
        });
    }
}
