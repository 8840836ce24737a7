//! # BestQuote Feed
//!
//! Feed plumbing around a [`BestQuoteStore`](bestquote_book::BestQuoteStore):
//!
//! - Binance depth, book ticker and REST ticker decoding
//! - A dispatcher routing decoded events into the store, with replay
//!   detection for depth messages and optional push notifications
//! - Supervised stream feeds with exponential reconnect backoff
//! - A periodic REST snapshot poller
//! - A [`Subscription`] tying the tasks for one instrument together

pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod health;
pub mod poller;
pub mod reconnect;
pub mod sequence;
pub mod stream;
pub mod subscription;

pub use decode::{decode_book_ticker, decode_depth, decode_frame, decode_rest_ticker};
pub use dispatcher::{DispatchReport, Dispatcher, QuoteEvent};
pub use error::{DecodeError, FeedError};
pub use event::{DepthEvent, FeedEvent, FeedKind, TickerEvent};
pub use health::{FeedHealth, FeedState};
pub use poller::{PollMode, PollStats, Poller, PollerConfig, SnapshotFetcher};
pub use reconnect::{ReconnectConfig, ReconnectState};
pub use sequence::{SequenceCheck, SequenceGuard};
pub use stream::{FeedSource, StreamFeed};
pub use subscription::{Subscription, SubscriptionBuilder};
