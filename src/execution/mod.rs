// Order execution, position state and market data caching
pub mod executor;
pub mod position_manager;
pub mod price_feed;

pub use executor::{process_signal, ExecutionAction, ExecutionDecision, TradeExecutor};
pub use position_manager::{
    ClosedTrade, ExitReason, PositionManager, PositionState, SessionStats,
};
pub use price_feed::PriceFeed;
