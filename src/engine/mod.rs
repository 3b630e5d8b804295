// Trading control loop, its command queue and status fan-out
pub mod command;
pub mod schedule;
pub mod status;
pub mod throttle;
pub mod trading_loop;

pub use command::Command;
pub use schedule::Schedule;
pub use status::{
    ConnectionStatus, MetricsSnapshot, NotificationLevel, StatusEvent, StatusPublisher,
};
pub use throttle::ReportThrottle;
pub use trading_loop::{LoopDeps, TickReport, TradingLoop, Transition};
