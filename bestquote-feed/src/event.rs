//! Decoded feed events.

use bestquote_book::{QuoteSide, Side, Timestamp, UpdateSource};

/// Stream a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Incremental depth diffs.
    Depth,
    /// Best bid/ask ticker.
    BookTicker,
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Depth => write!(f, "depth"),
            Self::BookTicker => write!(f, "bookTicker"),
        }
    }
}

/// Decoded depth diff message.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthEvent {
    /// Venue event time.
    pub event_time: Timestamp,
    /// First update id covered by the message.
    pub first_update_id: u64,
    /// Last update id covered by the message.
    pub final_update_id: u64,
    /// Levels in message order, bids before asks.
    pub levels: Vec<(Side, QuoteSide)>,
}

/// Decoded best bid/ask summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerEvent {
    /// Venue update id, when the message carries one.
    pub update_id: Option<u64>,
    /// Best bid.
    pub bid: QuoteSide,
    /// Best ask.
    pub ask: QuoteSide,
}

/// Event handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Depth diff from the streaming feed.
    Depth(DepthEvent),
    /// Ticker from the streaming feed.
    Ticker(TickerEvent),
    /// Ticker pulled by the poller.
    Polled(TickerEvent),
}

impl FeedEvent {
    /// Returns the merge source for this event.
    #[must_use]
    pub fn source(&self) -> UpdateSource {
        match self {
            Self::Depth(_) => UpdateSource::IncrementalDiff,
            Self::Ticker(_) => UpdateSource::TickerSnapshot,
            Self::Polled(_) => UpdateSource::PolledSnapshot,
        }
    }

    /// Returns the number of side updates the event expands to.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Depth(depth) => depth.levels.len(),
            Self::Ticker(_) | Self::Polled(_) => 2,
        }
    }

    /// Returns true if the event carries no side update.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_sources() {
        let ticker = TickerEvent {
            update_id: None,
            bid: QuoteSide::new(1.0, 1.0),
            ask: QuoteSide::new(2.0, 1.0),
        };
        assert_eq!(
            FeedEvent::Ticker(ticker).source(),
            UpdateSource::TickerSnapshot
        );
        assert_eq!(
            FeedEvent::Polled(ticker).source(),
            UpdateSource::PolledSnapshot
        );
        assert_eq!(FeedEvent::Polled(ticker).len(), 2);

        let depth = FeedEvent::Depth(DepthEvent {
            event_time: Timestamp::ZERO,
            first_update_id: 1,
            final_update_id: 1,
            levels: vec![],
        });
        assert_eq!(depth.source(), UpdateSource::IncrementalDiff);
        assert!(depth.is_empty());
    }

    #[test]
    fn test_feed_kind_display() {
        assert_eq!(FeedKind::Depth.to_string(), "depth");
        assert_eq!(FeedKind::BookTicker.to_string(), "bookTicker");
    }
}
