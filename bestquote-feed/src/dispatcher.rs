//! Routes decoded feed events into the store.

use crate::event::{FeedEvent, FeedKind, TickerEvent};
use crate::sequence::{SequenceCheck, SequenceGuard};
use bestquote_book::{BestQuoteState, BestQuoteStore, Side, Timestamp, UpdateOutcome, UpdateSource};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Notifications for consumers that prefer push over polling `snapshot`.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteEvent {
    /// At least one side changed; carries the state right after the event.
    TopOfBookChanged(BestQuoteState),
    /// The book is crossed after an event.
    CrossedBook {
        /// Bid price.
        bid: f64,
        /// Ask price.
        ask: f64,
    },
    /// A side was forced back to unset.
    SideReset(Side),
}

/// Outcome tally for one dispatched event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Side updates committed.
    pub applied: usize,
    /// Side updates rejected as stale.
    pub stale: usize,
    /// Side updates rejected as invalid.
    pub invalid: usize,
    /// Side updates refused by the policy as crossing.
    pub crossed: usize,
    /// Whole message dropped as a replay.
    pub duplicate: bool,
}

impl DispatchReport {
    fn record(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Applied => self.applied += 1,
            UpdateOutcome::RejectedStale => self.stale += 1,
            UpdateOutcome::RejectedInvalid => self.invalid += 1,
            UpdateOutcome::RejectedCrossed => self.crossed += 1,
        }
    }
}

/// Single entry point through which every feed task writes to the store.
///
/// Shared as `Arc<Dispatcher>`; all methods take `&self`.
pub struct Dispatcher {
    store: Arc<BestQuoteStore>,
    sequence: Mutex<SequenceGuard>,
    notify_tx: Option<Sender<QuoteEvent>>,
    dropped_notifications: AtomicU64,
}

impl Dispatcher {
    /// Creates a dispatcher without notifications.
    #[must_use]
    pub fn new(store: Arc<BestQuoteStore>) -> Self {
        Self {
            store,
            sequence: Mutex::new(SequenceGuard::new()),
            notify_tx: None,
            dropped_notifications: AtomicU64::new(0),
        }
    }

    /// Creates a dispatcher publishing notifications on a bounded channel.
    ///
    /// A full channel drops notifications rather than stalling producers.
    #[must_use]
    pub fn with_notifications(
        store: Arc<BestQuoteStore>,
        capacity: usize,
    ) -> (Self, Receiver<QuoteEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let mut dispatcher = Self::new(store);
        dispatcher.notify_tx = Some(tx);
        (dispatcher, rx)
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<BestQuoteStore> {
        &self.store
    }

    /// Applies one decoded event observed at `observed_at`.
    pub fn dispatch(&self, event: &FeedEvent, observed_at: Timestamp) -> DispatchReport {
        let mut report = DispatchReport::default();

        match event {
            FeedEvent::Depth(depth) => {
                let check = self
                    .sequence
                    .lock()
                    .check(depth.first_update_id, depth.final_update_id);
                match check {
                    SequenceCheck::Duplicate => {
                        tracing::debug!(
                            "{} dropped replayed depth message {}..={} (event time {})",
                            self.symbol(),
                            depth.first_update_id,
                            depth.final_update_id,
                            depth.event_time
                        );
                        report.duplicate = true;
                        return report;
                    }
                    SequenceCheck::Gap { expected, received } => {
                        tracing::debug!(
                            "{} depth gap: expected update {}, received {} (event time {})",
                            self.symbol(),
                            expected,
                            received,
                            depth.event_time
                        );
                    }
                    SequenceCheck::InOrder => {}
                }

                for (side, level) in &depth.levels {
                    let outcome = self.store.update(
                        *side,
                        *level,
                        UpdateSource::IncrementalDiff,
                        observed_at,
                    );
                    self.log_rejection(*side, UpdateSource::IncrementalDiff, outcome, None);
                    report.record(outcome);
                }
            }
            FeedEvent::Ticker(ticker) | FeedEvent::Polled(ticker) => {
                self.apply_ticker(ticker, event.source(), observed_at, &mut report);
            }
        }

        if report.applied > 0 {
            self.notify_changed();
        }
        report
    }

    fn apply_ticker(
        &self,
        ticker: &TickerEvent,
        source: UpdateSource,
        observed_at: Timestamp,
        report: &mut DispatchReport,
    ) {
        for (side, quote) in [(Side::Bid, ticker.bid), (Side::Ask, ticker.ask)] {
            let outcome = self.store.update(side, quote, source, observed_at);
            self.log_rejection(side, source, outcome, ticker.update_id);
            report.record(outcome);
        }
    }

    fn log_rejection(
        &self,
        side: Side,
        source: UpdateSource,
        outcome: UpdateOutcome,
        update_id: Option<u64>,
    ) {
        let id = update_id.map(|id| format!(" (update {id})")).unwrap_or_default();
        match outcome {
            UpdateOutcome::Applied => {}
            UpdateOutcome::RejectedInvalid => {
                tracing::warn!(
                    "{} invalid {} {} update rejected{}",
                    self.symbol(),
                    source,
                    side,
                    id
                );
            }
            UpdateOutcome::RejectedStale => {
                tracing::debug!("{} stale {} {} update ignored{}", self.symbol(), source, side, id);
            }
            UpdateOutcome::RejectedCrossed => {
                tracing::debug!(
                    "{} {} {} update refused as crossing{}",
                    self.symbol(),
                    source,
                    side,
                    id
                );
            }
        }
    }

    /// Clears both sides after `kind` reconnected.
    ///
    /// The depth sequence is cleared only for a depth reconnect. Other
    /// streams reconnecting leave the depth stream untouched, so its replays
    /// must still be dropped.
    pub fn reset(&self, kind: FeedKind) {
        self.store.reset_all();
        if kind == FeedKind::Depth {
            self.sequence.lock().reset();
        }
        for side in Side::ALL {
            self.notify(QuoteEvent::SideReset(side));
        }
    }

    /// Publishes a reset performed elsewhere (e.g. by the reconciler).
    pub fn notify_reset(&self, side: Side) {
        self.notify(QuoteEvent::SideReset(side));
    }

    /// Returns the number of notifications dropped on a full channel.
    #[must_use]
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }

    /// Returns the number of depth gaps seen.
    #[must_use]
    pub fn depth_gaps(&self) -> u64 {
        self.sequence.lock().gaps()
    }

    fn notify_changed(&self) {
        if self.notify_tx.is_none() {
            return;
        }
        let state = self.store.snapshot();
        self.notify(QuoteEvent::TopOfBookChanged(state));
        if let (Some(bid), Some(ask)) = (state.best_bid.price(), state.best_ask.price())
            && state.is_crossed()
        {
            self.notify(QuoteEvent::CrossedBook { bid, ask });
        }
    }

    fn notify(&self, event: QuoteEvent) {
        let Some(tx) = &self.notify_tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn symbol(&self) -> &str {
        &self.store.instrument().symbol
    }
}
