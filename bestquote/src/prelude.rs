//! Prelude module for convenient imports.
//!
//! ```ignore
//! use bestquote::prelude::*;
//! ```

// Book types
pub use bestquote_book::{
    Admission, BestQuoteState, BestQuoteStore, Instrument, MergeContext, MergePolicy,
    QuoteError, QuoteSide, QuoteSlot, Reconciler, ReconcilerConfig, Side, StandardPolicy,
    StoreRegistry, StoreStats, Timestamp, UpdateOutcome, UpdateSource,
};

// Feed types
pub use bestquote_feed::{
    DecodeError, DispatchReport, Dispatcher, FeedError, FeedEvent, FeedHealth, FeedKind,
    FeedSource, PollMode, PollerConfig, QuoteEvent, ReconnectConfig, SnapshotFetcher,
    Subscription, SubscriptionBuilder,
};

pub use std::time::Duration;
