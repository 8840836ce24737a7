//! Synthetic update streams.

use bestquote_book::{QuoteSide, Side, Timestamp, UpdateSource};

/// One generated store update.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticUpdate {
    /// Side.
    pub side: Side,
    /// Candidate quote.
    pub quote: QuoteSide,
    /// Source tag.
    pub source: UpdateSource,
    /// Observation time.
    pub observed_at: Timestamp,
}

/// Deterministic random walk around a mid price.
///
/// Bids stay below the mid and asks above it, so generated streams never
/// cross unless the walk is reset between sides.
pub struct UpdateWorkload {
    state: u64,
    mid: f64,
    tick: f64,
    clock: u64,
    snapshot_every: u32,
    emitted: u32,
}

impl UpdateWorkload {
    /// Creates a workload; every `snapshot_every`-th update is a ticker
    /// snapshot (0 disables snapshots).
    #[must_use]
    pub fn new(seed: u64, mid: f64, tick: f64, snapshot_every: u32) -> Self {
        Self {
            state: seed.max(1),
            mid,
            tick,
            clock: 1,
            snapshot_every,
            emitted: 0,
        }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Returns the next update.
    pub fn next_update(&mut self) -> SyntheticUpdate {
        let r = self.next_u64();
        let side = if r & 1 == 0 { Side::Bid } else { Side::Ask };
        let offset = ((r >> 1) % 5 + 1) as f64 * self.tick;
        let price = match side {
            Side::Bid => self.mid - offset,
            Side::Ask => self.mid + offset,
        };
        let quantity = ((r >> 8) % 1000) as f64 / 100.0;

        self.emitted = self.emitted.wrapping_add(1);
        let source = if self.snapshot_every != 0 && self.emitted % self.snapshot_every == 0 {
            UpdateSource::TickerSnapshot
        } else {
            UpdateSource::IncrementalDiff
        };
        self.clock += 1;

        SyntheticUpdate {
            side,
            quote: QuoteSide::new(price, quantity),
            source,
            observed_at: Timestamp::from_nanos(self.clock),
        }
    }

    /// Returns `count` updates.
    pub fn take(&mut self, count: usize) -> Vec<SyntheticUpdate> {
        (0..count).map(|_| self.next_update()).collect()
    }
}
