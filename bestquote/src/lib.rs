//! # BestQuote
//!
//! Best bid/ask state for an instrument, merged from several market data
//! sources of differing freshness.
//!
//! Incremental depth diffs, streamed book-ticker summaries and periodic
//! REST snapshots all write into one shared store. A merge policy decides
//! which candidate wins per side: diffs always apply, snapshots only when
//! strictly newer than the held value, and a cross between the sides flags
//! the side that is likely outdated instead of silently publishing a
//! crossed book.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bestquote::prelude::*;
//!
//! let mut sub = Subscription::builder(Instrument::new("BTCUSDT"))
//!     .poll_interval(Duration::from_secs(1))
//!     .notifications(1024)
//!     .build();
//!
//! sub.spawn_depth_feed(my_depth_source);
//! sub.spawn_ticker_feed(my_ticker_source);
//! sub.spawn_poller(my_rest_fetcher);
//!
//! let state = sub.snapshot();
//! println!("{:?} / {:?}", state.best_bid, state.best_ask);
//! ```
//!
//! ## Crate Organization
//!
//! - [`book`] - Quote types, the store and merge policy
//! - [`feed`] - Wire decoding, dispatch, stream supervision and polling

pub mod prelude;

/// Quote types, the concurrent store and merge policy.
pub mod book {
    pub use bestquote_book::*;
}

/// Feed decoding, dispatch and task supervision.
pub mod feed {
    pub use bestquote_feed::*;
}

// Re-export commonly used items at the crate root
pub use bestquote_book::{
    BestQuoteState, BestQuoteStore, Instrument, QuoteSide, QuoteSlot, Side, Timestamp,
    UpdateOutcome, UpdateSource,
};
pub use bestquote_feed::{Subscription, SubscriptionBuilder};
