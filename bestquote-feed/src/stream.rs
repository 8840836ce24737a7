//! Supervised streaming feed: connect, read, decode, dispatch, reconnect.

use crate::decode::decode_frame;
use crate::dispatcher::Dispatcher;
use crate::error::FeedError;
use crate::event::FeedKind;
use crate::health::FeedHealth;
use crate::reconnect::{ReconnectConfig, ReconnectState};
use async_trait::async_trait;
use bestquote_book::Timestamp;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Transport delivering raw text frames of one stream.
///
/// Implementations wrap a websocket or any other message transport; the
/// feed owns reconnect policy, so `connect` is expected to make a single
/// attempt.
#[async_trait]
pub trait FeedSource: Send {
    /// Opens (or reopens) the connection.
    async fn connect(&mut self) -> Result<(), FeedError>;

    /// Returns the next frame, or `None` once the venue closed the stream.
    async fn next_frame(&mut self) -> Result<Option<String>, FeedError>;
}

/// A stream feed bound to one dispatcher.
pub struct StreamFeed<S> {
    kind: FeedKind,
    source: S,
    dispatcher: Arc<Dispatcher>,
    health: Arc<FeedHealth>,
    reconnect: ReconnectState,
    reset_on_reconnect: bool,
}

impl<S: FeedSource> StreamFeed<S> {
    /// Creates a feed with default reconnect settings.
    #[must_use]
    pub fn new(
        kind: FeedKind,
        source: S,
        dispatcher: Arc<Dispatcher>,
        health: Arc<FeedHealth>,
    ) -> Self {
        Self {
            kind,
            source,
            dispatcher,
            health,
            reconnect: ReconnectState::new(ReconnectConfig::default()),
            reset_on_reconnect: true,
        }
    }

    /// Sets the reconnect backoff.
    #[must_use]
    pub fn reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = ReconnectState::new(config);
        self
    }

    /// Sets whether the store is cleared when the connection comes back.
    #[must_use]
    pub fn reset_on_reconnect(mut self, enabled: bool) -> Self {
        self.reset_on_reconnect = enabled;
        self
    }

    /// Runs until cancelled.
    ///
    /// # Errors
    /// Returns `FeedError::MaxReconnectAttempts` if the attempt limit is hit.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), FeedError> {
        self.health.register(self.kind);
        let result = self.supervise(&cancel).await;
        self.health.deregister(self.kind);
        result
    }

    async fn supervise(&mut self, cancel: &CancellationToken) -> Result<(), FeedError> {
        let symbol = self.dispatcher.store().instrument().symbol.clone();

        loop {
            let connected = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = self.source.connect() => result,
            };

            match connected {
                Ok(()) => {
                    if self.reconnect.on_connected() && self.reset_on_reconnect {
                        tracing::info!("{} {} feed reconnected, clearing book", symbol, self.kind);
                        self.dispatcher.reset(self.kind);
                    } else {
                        tracing::info!("{} {} feed connected", symbol, self.kind);
                    }
                    self.health.set_up(self.kind);

                    let err = tokio::select! {
                        () = cancel.cancelled() => return Ok(()),
                        err = self.pump() => err,
                    };
                    self.health.set_down(self.kind);
                    tracing::warn!("{} {} feed interrupted: {}", symbol, self.kind, err);
                }
                Err(e) => {
                    tracing::warn!("{} {} feed connect failed: {}", symbol, self.kind, e);
                }
            }

            let delay = match self.reconnect.on_failure() {
                Ok(delay) => delay,
                Err(e) => {
                    tracing::error!(
                        "{} {} feed giving up after {} attempts",
                        symbol,
                        self.kind,
                        self.reconnect.failures() - 1
                    );
                    return Err(e);
                }
            };
            tracing::info!("{} {} feed reconnecting in {:?}", symbol, self.kind, delay);

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Reads frames until the connection fails; returns the failure.
    async fn pump(&mut self) -> FeedError {
        loop {
            let frame = match self.source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return FeedError::ConnectionClosed,
                Err(e) => return e,
            };
            let observed_at = Timestamp::now();

            match decode_frame(self.kind, &frame, self.dispatcher.store().instrument()) {
                Ok(event) => {
                    let report = self.dispatcher.dispatch(&event, observed_at);
                    tracing::trace!(
                        "{} frame applied {} of {} updates",
                        self.kind,
                        report.applied,
                        event.len()
                    );
                }
                Err(e) => {
                    tracing::warn!("dropped {} frame: {}", self.kind, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::FeedState;
    use bestquote_book::{BestQuoteStore, Instrument, QuoteSlot, Side};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Each session is either a refused connect or a list of frames
    /// followed by a close.
    struct ScriptedSource {
        sessions: VecDeque<Option<Vec<&'static str>>>,
        frames: VecDeque<&'static str>,
        hang_when_done: bool,
    }

    impl ScriptedSource {
        fn new(sessions: Vec<Option<Vec<&'static str>>>) -> Self {
            Self {
                sessions: sessions.into(),
                frames: VecDeque::new(),
                hang_when_done: false,
            }
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn connect(&mut self) -> Result<(), FeedError> {
            match self.sessions.pop_front() {
                Some(Some(frames)) => {
                    self.frames = frames.into();
                    Ok(())
                }
                Some(None) => Err(FeedError::connect("refused")),
                None if self.hang_when_done => std::future::pending().await,
                None => Err(FeedError::connect("no more sessions")),
            }
        }

        async fn next_frame(&mut self) -> Result<Option<String>, FeedError> {
            Ok(self.frames.pop_front().map(str::to_string))
        }
    }

    const DEPTH_1: &str =
        r#"{"e":"depthUpdate","E":1,"s":"BTCUSDT","U":1,"u":1,"b":[["100.0","1"]],"a":[["101.0","1"]]}"#;
    const DEPTH_2: &str =
        r#"{"e":"depthUpdate","E":2,"s":"BTCUSDT","U":2,"u":2,"b":[["99.0","2"]],"a":[]}"#;

    fn setup() -> (Arc<Dispatcher>, Arc<FeedHealth>) {
        let store = Arc::new(BestQuoteStore::new(Instrument::new("BTCUSDT")));
        (Arc::new(Dispatcher::new(store)), Arc::new(FeedHealth::new()))
    }

    fn limited(attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_attempts: Some(attempts),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_clears_book() {
        let (dispatcher, health) = setup();
        let source = ScriptedSource::new(vec![Some(vec![DEPTH_1]), None, Some(vec![DEPTH_2])]);

        let result = StreamFeed::new(FeedKind::Depth, source, dispatcher.clone(), health.clone())
            .reconnect(limited(2))
            .run(CancellationToken::new())
            .await;

        assert!(matches!(result, Err(FeedError::MaxReconnectAttempts)));
        let state = dispatcher.store().snapshot();
        assert_eq!(state.best_bid.price(), Some(99.0));
        assert_eq!(state.best_ask, QuoteSlot::Unset);
        assert_eq!(health.state(FeedKind::Depth), FeedState::NotRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_without_reset_keeps_book() {
        let (dispatcher, health) = setup();
        let source = ScriptedSource::new(vec![Some(vec![DEPTH_1]), Some(vec![DEPTH_2])]);

        let _ = StreamFeed::new(FeedKind::Depth, source, dispatcher.clone(), health)
            .reconnect(limited(1))
            .reset_on_reconnect(false)
            .run(CancellationToken::new())
            .await;

        let state = dispatcher.store().snapshot();
        assert_eq!(state.best_bid.price(), Some(99.0));
        assert_eq!(state.best_ask.price(), Some(101.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_skipped() {
        let (dispatcher, health) = setup();
        let source = ScriptedSource::new(vec![Some(vec![
            "not json",
            r#"{"e":"depthUpdate","E":1,"s":"BTCUSDT","U":1,"u":1,"b":[["abc","1"]],"a":[]}"#,
            DEPTH_1,
        ])]);

        let _ = StreamFeed::new(FeedKind::Depth, source, dispatcher.clone(), health)
            .reconnect(limited(0))
            .run(CancellationToken::new())
            .await;

        assert_eq!(dispatcher.store().side(Side::Bid).price(), Some(100.0));
        assert_eq!(dispatcher.store().stats().rejected_invalid, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_feed() {
        let (dispatcher, health) = setup();
        let mut source = ScriptedSource::new(vec![]);
        source.hang_when_done = true;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            StreamFeed::new(FeedKind::BookTicker, source, dispatcher, health.clone())
                .run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(health.state(FeedKind::BookTicker), FeedState::Down);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(health.state(FeedKind::BookTicker), FeedState::NotRunning);
    }
}
