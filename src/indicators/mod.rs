// Technical indicators used by the confluence strategy
// All functions work on plain f64 series, oldest value first

pub mod macd;
pub mod moving_average;
pub mod obv;
pub mod rsi;
pub mod stochastic;

pub use macd::{calculate_macd, Macd};
pub use moving_average::{calculate_ema, calculate_sma, ema_series, sma_series};
pub use obv::{calculate_obv_series, obv_with_sma};
pub use rsi::calculate_rsi;
pub use stochastic::{calculate_stochastic, Stochastic};
