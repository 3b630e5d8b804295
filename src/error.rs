use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the trading control loop
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoopError {
    #[error("Market data fetch failed: {0}")]
    DataFetchFailed(String),

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Trade failed: {0}")]
    TradeFailed(String),

    #[error("Close failed: {0}")]
    CloseFailed(String),

    #[error("Handler initialization failed: {0}")]
    HandlerInitFailed(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Discriminant of [`LoopError`], used to throttle repeated reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DataFetch,
    Prediction,
    Trade,
    Close,
    HandlerInit,
    InvalidCommand,
}

impl LoopError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoopError::DataFetchFailed(_) => ErrorKind::DataFetch,
            LoopError::PredictionFailed(_) => ErrorKind::Prediction,
            LoopError::TradeFailed(_) => ErrorKind::Trade,
            LoopError::CloseFailed(_) => ErrorKind::Close,
            LoopError::HandlerInitFailed(_) => ErrorKind::HandlerInit,
            LoopError::InvalidCommand(_) => ErrorKind::InvalidCommand,
        }
    }

    /// Only a failed startup stops the loop from ever running
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoopError::HandlerInitFailed(_))
    }
}

/// Errors from amount and price quantization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizingError {
    #[error("Trade amount {amount} is below exchange minimum {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("Invalid step size: {0}")]
    InvalidStep(Decimal),

    #[error("Cannot calculate stop-loss/take-profit without a price")]
    MissingPrice,

    #[error("Decimal overflow while sizing {0}")]
    Overflow(&'static str),

    #[error("Protective level {0} is not a positive price")]
    NonPositiveLevel(Decimal),
}

/// Configuration loading and runtime setting errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error("Invalid value '{value}' for setting {name}")]
    InvalidValue { name: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_init_failure_is_fatal() {
        assert!(LoopError::HandlerInitFailed("no rules".into()).is_fatal());
        assert!(!LoopError::DataFetchFailed("timeout".into()).is_fatal());
        assert!(!LoopError::CloseFailed("rejected".into()).is_fatal());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            LoopError::PredictionFailed("nan".into()).kind(),
            ErrorKind::Prediction
        );
        assert_eq!(LoopError::TradeFailed("x".into()).kind(), ErrorKind::Trade);
    }

    #[test]
    fn test_sizing_error_message() {
        let err = SizingError::BelowMinimum {
            amount: Decimal::new(5, 1),
            minimum: Decimal::ONE,
        };
        assert_eq!(
            err.to_string(),
            "Trade amount 0.5 is below exchange minimum 1"
        );
    }
}
