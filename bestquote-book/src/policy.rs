//! Merge policy deciding whether a candidate quote is committed.
//!
//! The policy is a pure function of the held value for the side being
//! written, the lock-free view of the opposite side and the candidate. It
//! runs inside the writer's critical section, so it must not block.

use crate::error::{QuoteError, Result};
use crate::quote::{QuoteSide, QuoteSlot, Side, Timestamp, UpdateSource};

/// Opposite side's best as seen by a writer at decision time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OppositeView {
    /// Opposite best price.
    pub price: f64,
    /// Observation time of the opposite best.
    pub observed_at: Timestamp,
}

/// Everything a policy sees when judging one candidate.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
    /// Side being written.
    pub side: Side,
    /// Incoming quote.
    pub candidate: QuoteSide,
    /// Provenance of the candidate.
    pub source: UpdateSource,
    /// Observation time of the candidate.
    pub observed_at: Timestamp,
    /// Value currently held for `side`.
    pub held: QuoteSlot,
    /// Observation time of the held value, `None` while unset.
    pub held_at: Option<Timestamp>,
    /// Opposite side's best, `None` while unset.
    pub opposite: Option<OppositeView>,
}

impl MergeContext {
    /// Returns `(bid, ask)` prices if the candidate would overlap the opposite best.
    #[must_use]
    pub fn crossing(&self) -> Option<(f64, f64)> {
        let opposite = self.opposite?;
        let (bid, ask) = match self.side {
            Side::Bid => (self.candidate.price, opposite.price),
            Side::Ask => (opposite.price, self.candidate.price),
        };
        Side::crosses(bid, ask).then_some((bid, ask))
    }
}

/// Admitted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Commit the candidate.
    Apply,
    /// Commit the candidate and flag the opposite side for reconciliation.
    ApplyMarkOppositeStale,
}

/// Decides whether a candidate is committed.
pub trait MergePolicy: Send + Sync {
    /// Judges a candidate.
    ///
    /// # Errors
    /// Returns the `QuoteError` explaining the rejection.
    fn admit(&self, ctx: &MergeContext) -> Result<Admission>;
}

/// Default policy.
///
/// - every source: non-finite or negative values are rejected.
/// - `IncrementalDiff`: always applied. A cross means the opposite side is
///   the one lagging, so it is flagged rather than the diff refused.
/// - `TickerSnapshot` / `PolledSnapshot`: applied only when strictly newer
///   than the held observation; equal timestamps keep the held value. Once
///   admitted, a cross is handled as for diffs.
/// - an unset side takes the first valid candidate from any source.
///
/// `StandardPolicy` never refuses a candidate for crossing, so the newest
/// snapshot for a side wins regardless of arrival order.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPolicy;

impl MergePolicy for StandardPolicy {
    fn admit(&self, ctx: &MergeContext) -> Result<Admission> {
        let candidate = ctx.candidate;
        if !candidate.is_valid() {
            return Err(QuoteError::InvalidQuote {
                price: candidate.price,
                quantity: candidate.quantity,
            });
        }

        if ctx.source.is_snapshot()
            && let (QuoteSlot::Set(_), Some(held_at)) = (ctx.held, ctx.held_at)
            && ctx.observed_at <= held_at
        {
            return Err(QuoteError::StaleUpdate {
                observed_at: ctx.observed_at,
                held_at,
            });
        }

        if ctx.crossing().is_some() {
            Ok(Admission::ApplyMarkOppositeStale)
        } else {
            Ok(Admission::Apply)
        }
    }
}
