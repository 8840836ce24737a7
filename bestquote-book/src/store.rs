//! Concurrent best bid/ask store.
//!
//! Each side lives behind its own `RwLock`, so writers on the bid never wait
//! for writers on the ask. A writer needs the opposite best to detect a
//! crossed book; it reads it from the opposite side's seqlock mirror instead
//! of taking the opposite lock. `snapshot` takes both read locks (bid, then
//! ask) and therefore sees each side either before or after any write.
//!
//! Crossed-book handling relies on the following ordering inside a writer's
//! critical section: clear own stale flag, publish own mirror, re-read the
//! opposite mirror, flag the opposite if crossed. With sequentially
//! consistent atomics, of two racing writers on opposite sides at least one
//! observes the other's new price, so a crossed pair of committed sides
//! always has at least one side flagged.

use crate::error::QuoteError;
use crate::instruments::Instrument;
use crate::policy::{Admission, MergeContext, MergePolicy, OppositeView, StandardPolicy};
use crate::quote::{QuoteSide, QuoteSlot, Side, Timestamp, UpdateSource};
use parking_lot::RwLock;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Result of a call to [`BestQuoteStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOutcome {
    /// Candidate committed.
    Applied,
    /// Candidate superseded by a newer observation.
    RejectedStale,
    /// Candidate had non-finite or negative values.
    RejectedInvalid,
    /// The merge policy refused the candidate as crossing the opposite best.
    ///
    /// Only custom policies produce this; `StandardPolicy` applies crossing
    /// candidates and flags the opposite side instead.
    RejectedCrossed,
}

impl UpdateOutcome {
    /// Returns true if the candidate was committed.
    #[inline]
    #[must_use]
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

impl From<&QuoteError> for UpdateOutcome {
    fn from(err: &QuoteError) -> Self {
        match err {
            QuoteError::InvalidQuote { .. } => Self::RejectedInvalid,
            QuoteError::StaleUpdate { .. } => Self::RejectedStale,
            QuoteError::CrossedBook { .. } => Self::RejectedCrossed,
        }
    }
}

/// Per-side observation times of the held values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastUpdated {
    /// Observation time of the held bid, `None` while unset.
    pub bid_at: Option<Timestamp>,
    /// Observation time of the held ask, `None` while unset.
    pub ask_at: Option<Timestamp>,
}

/// Per-side reconciliation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleFlags {
    /// Bid flagged as lagging a crossing ask.
    pub bid: bool,
    /// Ask flagged as lagging a crossing bid.
    pub ask: bool,
}

/// Point-in-time copy of both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestQuoteState {
    /// Best bid.
    pub best_bid: QuoteSlot,
    /// Best ask.
    pub best_ask: QuoteSlot,
    /// Observation times of the held values.
    pub last_updated: LastUpdated,
    /// Sides awaiting reconciliation after a crossed book.
    pub stale: StaleFlags,
}

impl BestQuoteState {
    /// Returns the held value for a side.
    #[must_use]
    pub fn side(&self, side: Side) -> QuoteSlot {
        match side {
            Side::Bid => self.best_bid,
            Side::Ask => self.best_ask,
        }
    }

    /// Returns the observation time of a side's held value.
    #[must_use]
    pub fn updated_at(&self, side: Side) -> Option<Timestamp> {
        match side {
            Side::Bid => self.last_updated.bid_at,
            Side::Ask => self.last_updated.ask_at,
        }
    }

    /// Returns true if a side is flagged for reconciliation.
    #[must_use]
    pub fn is_stale(&self, side: Side) -> bool {
        match side {
            Side::Bid => self.stale.bid,
            Side::Ask => self.stale.ask,
        }
    }

    /// Returns the bid-ask spread when both sides are set.
    #[must_use]
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid.price(), self.best_ask.price()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Returns the mid price when both sides are set.
    #[must_use]
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid.price(), self.best_ask.price()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Returns true if both sides are set and bid >= ask.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid.price(), self.best_ask.price()) {
            (Some(bid), Some(ask)) => Side::crosses(bid, ask),
            _ => false,
        }
    }

    /// Returns true unless the book is crossed with neither side flagged.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.is_crossed() || self.stale.bid || self.stale.ask
    }

    /// Checks the book for a cross.
    ///
    /// # Errors
    /// Returns `QuoteError::CrossedBook` if bid >= ask.
    pub fn check_crossed(&self) -> Result<(), QuoteError> {
        match (self.best_bid.price(), self.best_ask.price()) {
            (Some(bid), Some(ask)) if Side::crosses(bid, ask) => {
                Err(QuoteError::CrossedBook { bid, ask })
            }
            _ => Ok(()),
        }
    }
}

/// Counters of update outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Committed updates.
    pub applied: u64,
    /// Stale rejections.
    pub rejected_stale: u64,
    /// Invalid rejections.
    pub rejected_invalid: u64,
    /// Crossed rejections.
    pub rejected_crossed: u64,
    /// Times a side was flagged stale by a crossing write.
    pub crossings: u64,
}

#[derive(Debug, Default)]
struct SideState {
    slot: QuoteSlot,
    observed_at: Option<Timestamp>,
}

/// Lock-free copy of one side's price and observation time.
///
/// Only the holder of the side's write lock publishes, so a plain
/// sequence counter is enough to detect torn reads.
#[derive(Debug)]
struct SideMirror {
    seq: AtomicU64,
    price_bits: AtomicU64,
    observed_at: AtomicU64,
}

impl SideMirror {
    fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            price_bits: AtomicU64::new(f64::NAN.to_bits()),
            observed_at: AtomicU64::new(0),
        }
    }

    fn publish(&self, price: Option<f64>, observed_at: Timestamp) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::SeqCst);
        self.price_bits.store(
            price.unwrap_or(f64::NAN).to_bits(),
            Ordering::SeqCst,
        );
        self.observed_at
            .store(observed_at.as_nanos(), Ordering::SeqCst);
        self.seq.store(seq.wrapping_add(2), Ordering::SeqCst);
    }

    fn load(&self) -> Option<OppositeView> {
        loop {
            let before = self.seq.load(Ordering::SeqCst);
            if before & 1 == 0 {
                let price = f64::from_bits(self.price_bits.load(Ordering::SeqCst));
                let observed_at = self.observed_at.load(Ordering::SeqCst);
                if self.seq.load(Ordering::SeqCst) == before {
                    return (!price.is_nan()).then_some(OppositeView {
                        price,
                        observed_at: Timestamp::from_nanos(observed_at),
                    });
                }
            }
            hint::spin_loop();
        }
    }
}

#[derive(Debug)]
struct SideCell {
    state: RwLock<SideState>,
    mirror: SideMirror,
    stale: AtomicBool,
}

impl SideCell {
    fn new() -> Self {
        Self {
            state: RwLock::new(SideState::default()),
            mirror: SideMirror::new(),
            stale: AtomicBool::new(false),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    applied: AtomicU64,
    rejected_stale: AtomicU64,
    rejected_invalid: AtomicU64,
    rejected_crossed: AtomicU64,
    crossings: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: UpdateOutcome) {
        let counter = match outcome {
            UpdateOutcome::Applied => &self.applied,
            UpdateOutcome::RejectedStale => &self.rejected_stale,
            UpdateOutcome::RejectedInvalid => &self.rejected_invalid,
            UpdateOutcome::RejectedCrossed => &self.rejected_crossed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Authoritative best bid/ask for one instrument.
///
/// Share it as `Arc<BestQuoteStore>` between producer tasks and readers;
/// all operations take `&self`.
#[derive(Debug)]
pub struct BestQuoteStore<P = StandardPolicy> {
    instrument: Instrument,
    bid: SideCell,
    ask: SideCell,
    policy: P,
    counters: Counters,
}

impl BestQuoteStore<StandardPolicy> {
    /// Creates a store with both sides unset.
    #[must_use]
    pub fn new(instrument: Instrument) -> Self {
        Self::with_policy(instrument, StandardPolicy)
    }
}

impl<P: MergePolicy> BestQuoteStore<P> {
    /// Creates a store with a custom merge policy.
    #[must_use]
    pub fn with_policy(instrument: Instrument, policy: P) -> Self {
        Self {
            instrument,
            bid: SideCell::new(),
            ask: SideCell::new(),
            policy,
            counters: Counters::default(),
        }
    }

    /// Returns the tracked instrument.
    #[must_use]
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    #[inline]
    fn cell(&self, side: Side) -> &SideCell {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }

    /// Merges a candidate into the held value for `side`.
    ///
    /// Blocks only on `side`'s own lock. On `Applied`, price, quantity and
    /// observation time become visible to readers together.
    pub fn update(
        &self,
        side: Side,
        candidate: QuoteSide,
        source: UpdateSource,
        observed_at: Timestamp,
    ) -> UpdateOutcome {
        let outcome = self.merge(side, candidate, source, observed_at);
        self.counters.record(outcome);
        outcome
    }

    fn merge(
        &self,
        side: Side,
        candidate: QuoteSide,
        source: UpdateSource,
        observed_at: Timestamp,
    ) -> UpdateOutcome {
        if !candidate.is_valid() {
            tracing::trace!(
                "{} {} rejected: invalid {:?}",
                self.instrument.symbol,
                side,
                candidate
            );
            return UpdateOutcome::RejectedInvalid;
        }

        let own = self.cell(side);
        let opposite = self.cell(side.opposite());
        let mut state = own.state.write();

        let ctx = MergeContext {
            side,
            candidate,
            source,
            observed_at,
            held: state.slot,
            held_at: state.observed_at,
            opposite: opposite.mirror.load(),
        };

        let admission = match self.policy.admit(&ctx) {
            Ok(admission) => admission,
            Err(err) => {
                tracing::trace!(
                    "{} {} {} update rejected: {}",
                    self.instrument.symbol,
                    side,
                    source,
                    err
                );
                return UpdateOutcome::from(&err);
            }
        };

        // Diffs are accepted out of timestamp order; keep the watermark
        // monotonic so a delayed snapshot cannot slip under it.
        let watermark = match (source, state.observed_at) {
            (UpdateSource::IncrementalDiff, Some(held_at)) => held_at.max(observed_at),
            _ => observed_at,
        };

        own.stale.store(false, Ordering::SeqCst);
        own.mirror.publish(Some(candidate.price), watermark);
        state.slot = QuoteSlot::Set(candidate);
        state.observed_at = Some(watermark);

        let crossed_now = opposite.mirror.load().is_some_and(|view| match side {
            Side::Bid => Side::crosses(candidate.price, view.price),
            Side::Ask => Side::crosses(view.price, candidate.price),
        });
        if admission == Admission::ApplyMarkOppositeStale || crossed_now {
            opposite.stale.store(true, Ordering::SeqCst);
            self.counters.crossings.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "{} crossed by {} {} at {}; {} flagged stale",
                self.instrument.symbol,
                source,
                side,
                candidate.price,
                side.opposite()
            );
        }
        drop(state);

        tracing::trace!(
            "{} {} <- {} {:?} @ {}",
            self.instrument.symbol,
            side,
            source,
            candidate,
            observed_at
        );
        UpdateOutcome::Applied
    }

    /// Returns a consistent copy of both sides.
    #[must_use]
    pub fn snapshot(&self) -> BestQuoteState {
        let bid = self.bid.state.read();
        let ask = self.ask.state.read();
        BestQuoteState {
            best_bid: bid.slot,
            best_ask: ask.slot,
            last_updated: LastUpdated {
                bid_at: bid.observed_at,
                ask_at: ask.observed_at,
            },
            stale: StaleFlags {
                bid: self.bid.stale.load(Ordering::SeqCst),
                ask: self.ask.stale.load(Ordering::SeqCst),
            },
        }
    }

    /// Returns the held value for one side.
    #[must_use]
    pub fn side(&self, side: Side) -> QuoteSlot {
        self.cell(side).state.read().slot
    }

    /// Returns true if a side is flagged for reconciliation.
    #[must_use]
    pub fn is_stale(&self, side: Side) -> bool {
        self.cell(side).stale.load(Ordering::SeqCst)
    }

    /// Forces a side back to unset and clears its stale flag.
    pub fn reset(&self, side: Side) {
        let cell = self.cell(side);
        let mut state = cell.state.write();
        cell.stale.store(false, Ordering::SeqCst);
        cell.mirror.publish(None, Timestamp::ZERO);
        *state = SideState::default();
        drop(state);
        tracing::debug!("{} {} reset", self.instrument.symbol, side);
    }

    /// Resets a side only if it is still flagged stale.
    ///
    /// Checked under the side's lock, so an update that healed the side
    /// after the caller looked is never discarded.
    pub fn reset_if_stale(&self, side: Side) -> bool {
        let cell = self.cell(side);
        let mut state = cell.state.write();
        if !cell.stale.load(Ordering::SeqCst) {
            return false;
        }
        cell.stale.store(false, Ordering::SeqCst);
        cell.mirror.publish(None, Timestamp::ZERO);
        *state = SideState::default();
        drop(state);
        tracing::debug!("{} {} reset while stale", self.instrument.symbol, side);
        true
    }

    /// Resets both sides.
    pub fn reset_all(&self) {
        for side in Side::ALL {
            self.reset(side);
        }
    }

    /// Returns outcome counters since creation.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            applied: self.counters.applied.load(Ordering::Relaxed),
            rejected_stale: self.counters.rejected_stale.load(Ordering::Relaxed),
            rejected_invalid: self.counters.rejected_invalid.load(Ordering::Relaxed),
            rejected_crossed: self.counters.rejected_crossed.load(Ordering::Relaxed),
            crossings: self.counters.crossings.load(Ordering::Relaxed),
        }
    }
}
