//! Error types for quote merging.

use crate::quote::Timestamp;
use thiserror::Error;

/// Reason a candidate quote was not committed.
///
/// None of these conditions is fatal; the store maps each one to an
/// [`UpdateOutcome`](crate::store::UpdateOutcome) and leaves the decision to
/// log, retry or ignore with the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteError {
    /// Non-finite or negative price/quantity.
    #[error("invalid quote: price {price}, quantity {quantity}")]
    InvalidQuote {
        /// Offending price.
        price: f64,
        /// Offending quantity.
        quantity: f64,
    },

    /// Superseded by a more recent observation.
    #[error("stale update: observed at {observed_at}, held value observed at {held_at}")]
    StaleUpdate {
        /// Observation time of the candidate.
        observed_at: Timestamp,
        /// Observation time of the held value.
        held_at: Timestamp,
    },

    /// Bid at or above ask.
    #[error("crossed book: bid {bid} >= ask {ask}")]
    CrossedBook {
        /// Bid price.
        bid: f64,
        /// Ask price.
        ask: f64,
    },
}

/// Result type alias for quote operations.
pub type Result<T> = std::result::Result<T, QuoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuoteError::InvalidQuote {
            price: -1.0,
            quantity: 2.0,
        };
        assert_eq!(err.to_string(), "invalid quote: price -1, quantity 2");

        let err = QuoteError::StaleUpdate {
            observed_at: Timestamp::from_millis(1),
            held_at: Timestamp::from_millis(2),
        };
        assert!(err.to_string().contains("stale update"));

        let err = QuoteError::CrossedBook {
            bid: 101.0,
            ask: 100.5,
        };
        assert_eq!(err.to_string(), "crossed book: bid 101 >= ask 100.5");
    }
}
