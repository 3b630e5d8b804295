use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::execution::{ClosedTrade, SessionStats};
use crate::models::{Position, Signal};

/// Immutable view of loop state, published once per tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub current_price: Option<Decimal>,
    pub signal: Signal,
    pub rsi: Option<f64>,
    pub position: Option<Position>,
    pub unrealized_pnl_pct: Option<f64>,
    pub stats: SessionStats,
    pub connection: ConnectionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Unknown,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Metrics(Arc<MetricsSnapshot>),
    Notification {
        level: NotificationLevel,
        message: String,
    },
    Connection(ConnectionStatus),
    PositionClosed(ClosedTrade),
}

/// Fire-and-forget fan-out to any number of observers
///
/// Sending never blocks; a subscriber that falls more than `capacity` events
/// behind skips the oldest ones.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StatusEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn metrics(&self, snapshot: MetricsSnapshot) {
        self.publish(StatusEvent::Metrics(Arc::new(snapshot)));
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.publish(StatusEvent::Notification {
            level,
            message: message.into(),
        });
    }
}
