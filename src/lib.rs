// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod sizing;
pub mod strategy;

// Re-export commonly used types
pub use api::{MarketDataSource, OrderGateway};
pub use engine::{Command, StatusEvent, StatusPublisher, TradingLoop};
pub use error::{ErrorKind, LoopError};
pub use models::*;
pub use strategy::SignalGenerator;
