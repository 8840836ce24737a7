//! Quote value types.

use crate::error::QuoteError;
use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Price/quantity pair for one side of the market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteSide {
    /// Price of the best level.
    pub price: f64,
    /// Resting quantity at that price (0 = level consumed).
    pub quantity: f64,
}

impl QuoteSide {
    /// Creates a quote without validation.
    ///
    /// The store validates every candidate it receives, so an invalid quote
    /// built here is rejected on `update` rather than stored.
    #[inline]
    #[must_use]
    pub const fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }

    /// Creates a quote, rejecting non-finite or negative values.
    ///
    /// # Errors
    /// Returns `QuoteError::InvalidQuote` if either field is NaN, infinite or
    /// negative.
    pub fn try_new(price: f64, quantity: f64) -> Result<Self, QuoteError> {
        let quote = Self::new(price, quantity);
        if quote.is_valid() {
            Ok(quote)
        } else {
            Err(QuoteError::InvalidQuote { price, quantity })
        }
    }

    /// Returns true if both fields are finite and non-negative.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.price.is_finite()
            && self.quantity.is_finite()
            && self.price >= 0.0
            && self.quantity >= 0.0
    }

    /// Returns true if the level carries no volume.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantity == 0.0
    }
}

/// Market side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Bid (buy) side.
    Bid,
    /// Ask (sell) side.
    Ask,
}

impl Side {
    /// Both sides, bid first.
    pub const ALL: [Side; 2] = [Side::Bid, Side::Ask];

    /// Returns the other side of the market.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }

    /// Returns true if a bid at `bid` and an ask at `ask` overlap.
    #[inline]
    #[must_use]
    pub fn crosses(bid: f64, ask: f64) -> bool {
        bid >= ask
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// Provenance of an incoming update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateSource {
    /// Incremental depth diff from the streaming feed.
    IncrementalDiff,
    /// Book-ticker snapshot from the streaming feed.
    TickerSnapshot,
    /// Ticker snapshot pulled by the polling fallback.
    PolledSnapshot,
}

impl UpdateSource {
    /// Returns true for the best-effort snapshot sources.
    #[inline]
    #[must_use]
    pub const fn is_snapshot(self) -> bool {
        matches!(self, Self::TickerSnapshot | Self::PolledSnapshot)
    }
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncrementalDiff => write!(f, "diff"),
            Self::TickerSnapshot => write!(f, "ticker"),
            Self::PolledSnapshot => write!(f, "poll"),
        }
    }
}

/// Observation time in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch; older than any real observation.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from nanoseconds.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from venue milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Returns the current time.
    ///
    /// The wall clock is read once per process; later calls advance it by a
    /// monotonic clock, so successive calls never go backwards even if the
    /// system clock is stepped.
    #[must_use]
    pub fn now() -> Self {
        static ANCHOR: OnceLock<(u64, Instant)> = OnceLock::new();
        let (epoch_nanos, anchor) = ANCHOR.get_or_init(|| {
            let wall = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
                .unwrap_or(0);
            (wall, Instant::now())
        });
        let elapsed = u64::try_from(anchor.elapsed().as_nanos()).unwrap_or(u64::MAX);
        Self(epoch_nanos.saturating_add(elapsed))
    }

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time elapsed from `self` to `later`, zero if `later` is earlier.
    #[must_use]
    pub fn elapsed_until(self, later: Timestamp) -> Duration {
        Duration::from_nanos(later.0.saturating_sub(self.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}

/// Held value of one side: explicitly unset until the first valid update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum QuoteSlot {
    /// No update has been applied since creation or the last reset.
    #[default]
    Unset,
    /// Current best quote.
    Set(QuoteSide),
}

impl QuoteSlot {
    /// Returns true if the side holds a quote.
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Returns the held quote, if any.
    #[inline]
    #[must_use]
    pub fn quote(&self) -> Option<QuoteSide> {
        match self {
            Self::Set(q) => Some(*q),
            Self::Unset => None,
        }
    }

    /// Returns the held price, if any.
    #[inline]
    #[must_use]
    pub fn price(&self) -> Option<f64> {
        self.quote().map(|q| q.price)
    }
}
