use std::time::Duration;

use thiserror::Error;

/// Failures returned by the exchange REST layer.
///
/// `Transient` and `RateLimited` are absorbed by the client's retry loop;
/// everything else surfaces to the caller unchanged.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transient exchange failure: {0}")]
    Transient(String),

    #[error("rate limited by exchange (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("order rejected by exchange: {0}")]
    InvalidOrder(String),

    #[error("exchange error ({status}): {message}")]
    Terminal { status: u16, message: String },
}

impl ExchangeError {
    /// True for failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Transient(_) | ExchangeError::RateLimited { .. }
        )
    }
}

/// Order sizing rejections. These are per-position, not fatal: the
/// position simply does not open this cycle.
#[derive(Debug, Error, PartialEq)]
pub enum SizingError {
    #[error("computed notional ${notional:.2} below exchange minimum ${min_notional:.2}")]
    BelowMinNotional { notional: f64, min_notional: f64 },

    #[error("quantity rounds to zero at step size {step_size}")]
    ZeroQuantity { step_size: f64 },

    #[error("free balance ${available:.2} below required minimum ${required:.2}")]
    InsufficientFunds { available: f64, required: f64 },

    #[error("{symbol} already has {count} working orders (limit {limit})")]
    OrderLimitReached {
        symbol: String,
        count: usize,
        limit: usize,
    },
}

/// Configuration problems detected at startup. Always fatal: the bot
/// refuses to trade on a half-parsed configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::Transient("timeout".into()).is_transient());
        assert!(ExchangeError::RateLimited { retry_after: None }.is_transient());
        assert!(!ExchangeError::InvalidOrder("bad qty".into()).is_transient());
        assert!(!ExchangeError::Terminal {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
    }

    #[test]
    fn test_sizing_error_message() {
        let err = SizingError::BelowMinNotional {
            notional: 4.5,
            min_notional: 10.0,
        };
        assert!(err.to_string().contains("$4.50"));
        assert!(err.to_string().contains("$10.00"));
    }
}
