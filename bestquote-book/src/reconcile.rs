//! Reconciliation of crossed books that do not heal on their own.

use crate::policy::MergePolicy;
use crate::quote::Side;
use crate::store::BestQuoteStore;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How long a side may stay flagged on a crossed book before it is reset.
    pub timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Resets sides left stale on a crossed book for longer than the timeout.
///
/// A crossed book normally heals with the next valid update to the lagging
/// side. If that update never comes (a dropped stream, a silent venue), the
/// reconciler clears the side so consumers see it as unset rather than
/// trading on a price known to be wrong.
pub struct Reconciler {
    /// First time each side was seen flagged on a crossed book.
    flagged: HashMap<Side, Instant>,
    timeout: Duration,
}

impl Reconciler {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            flagged: HashMap::new(),
            timeout: config.timeout,
        }
    }

    /// Inspects the store and resets sides stuck past the timeout.
    ///
    /// Returns the sides that were reset.
    pub fn check<P: MergePolicy>(&mut self, store: &BestQuoteStore<P>) -> Vec<Side> {
        self.check_at(store, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock.
    pub fn check_at<P: MergePolicy>(
        &mut self,
        store: &BestQuoteStore<P>,
        now: Instant,
    ) -> Vec<Side> {
        let state = store.snapshot();
        let crossed = state.is_crossed();
        let mut reset = Vec::new();

        for side in Side::ALL {
            if !(crossed && state.is_stale(side)) {
                self.flagged.remove(&side);
                continue;
            }

            let since = *self.flagged.entry(side).or_insert(now);
            if now.duration_since(since) > self.timeout {
                self.flagged.remove(&side);
                if store.reset_if_stale(side) {
                    tracing::warn!(
                        "{} {} stale on crossed book for over {:?}, reset",
                        store.instrument().symbol,
                        side,
                        self.timeout
                    );
                    reset.push(side);
                }
            }
        }

        reset
    }

    /// Returns true if a side is currently tracked as flagged.
    #[must_use]
    pub fn is_flagged(&self, side: Side) -> bool {
        self.flagged.contains_key(&side)
    }

    /// Returns the number of tracked sides.
    #[must_use]
    pub fn flagged_count(&self) -> usize {
        self.flagged.len()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::Instrument;
    use crate::quote::{QuoteSide, QuoteSlot, Timestamp, UpdateSource};

    fn crossed_store() -> BestQuoteStore {
        let store = BestQuoteStore::new(Instrument::new("BTCUSDT"));
        store.update(
            Side::Ask,
            QuoteSide::new(100.5, 1.0),
            UpdateSource::IncrementalDiff,
            Timestamp::from_millis(1),
        );
        store.update(
            Side::Bid,
            QuoteSide::new(101.0, 1.0),
            UpdateSource::IncrementalDiff,
            Timestamp::from_millis(2),
        );
        store
    }

    #[test]
    fn test_tracks_then_resets_after_timeout() {
        let store = crossed_store();
        let mut reconciler = Reconciler::new(ReconcilerConfig {
            timeout: Duration::from_secs(5),
        });
        let start = Instant::now();

        assert!(reconciler.check_at(&store, start).is_empty());
        assert!(reconciler.is_flagged(Side::Ask));
        assert!(!reconciler.is_flagged(Side::Bid));

        assert!(
            reconciler
                .check_at(&store, start + Duration::from_secs(3))
                .is_empty()
        );

        let reset = reconciler.check_at(&store, start + Duration::from_secs(6));
        assert_eq!(reset, vec![Side::Ask]);
        assert_eq!(store.side(Side::Ask), QuoteSlot::Unset);
        assert!(store.side(Side::Bid).is_set());
        assert_eq!(reconciler.flagged_count(), 0);
    }

    #[test]
    fn test_healed_side_is_forgotten() {
        let store = crossed_store();
        let mut reconciler = Reconciler::default();
        let start = Instant::now();

        reconciler.check_at(&store, start);
        assert_eq!(reconciler.flagged_count(), 1);

        store.update(
            Side::Ask,
            QuoteSide::new(101.5, 1.0),
            UpdateSource::IncrementalDiff,
            Timestamp::from_millis(3),
        );
        let reset = reconciler.check_at(&store, start + Duration::from_secs(60));
        assert!(reset.is_empty());
        assert_eq!(reconciler.flagged_count(), 0);
        assert!(store.side(Side::Ask).is_set());
    }

    #[test]
    fn test_uncrossed_book_untouched() {
        let store = BestQuoteStore::new(Instrument::new("BTCUSDT"));
        let mut reconciler = Reconciler::default();
        assert!(reconciler.check(&store).is_empty());
        assert_eq!(reconciler.flagged_count(), 0);
    }
}
