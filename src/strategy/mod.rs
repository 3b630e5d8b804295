// Signal generation
pub mod confluence;
pub mod signals;

pub use confluence::ConfluenceStrategy;
pub use signals::{ConfluenceConfig, IndicatorValues};

use crate::models::{Candle, Prediction};

/// Maps a candle history to a directional signal
///
/// Implementations are pure computations; the control loop treats any error
/// as a `None` signal.
pub trait SignalGenerator: Send + Sync {
    /// Generate a prediction from candles ordered oldest first
    fn evaluate(&self, candles: &[Candle]) -> anyhow::Result<Prediction>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
