//! Periodic REST snapshot poller.

use crate::decode::decode_rest_ticker;
use crate::dispatcher::Dispatcher;
use crate::error::FeedError;
use crate::event::FeedEvent;
use crate::health::FeedHealth;
use async_trait::async_trait;
use bestquote_book::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Fetches one REST ticker body.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Performs one request and returns the raw response body.
    async fn fetch(&self) -> Result<String, FeedError>;
}

/// When the poller issues requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollMode {
    /// Every tick, regardless of stream health.
    #[default]
    Always,
    /// Only while some stream feed is down or none is running.
    WhenDegraded,
}

/// Poller settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Time between requests.
    pub interval: Duration,
    /// Polling mode.
    pub mode: PollMode,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            mode: PollMode::Always,
        }
    }
}

/// Counters for one poller run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Requests issued.
    pub requests: u64,
    /// Requests that failed or returned an undecodable body.
    pub failures: u64,
    /// Ticks skipped because streams were healthy.
    pub skipped: u64,
}

/// Polls a snapshot endpoint and feeds results to the dispatcher.
pub struct Poller<F> {
    fetcher: F,
    dispatcher: Arc<Dispatcher>,
    health: Arc<FeedHealth>,
    config: PollerConfig,
}

impl<F: SnapshotFetcher> Poller<F> {
    /// Creates a poller.
    #[must_use]
    pub fn new(
        fetcher: F,
        dispatcher: Arc<Dispatcher>,
        health: Arc<FeedHealth>,
        config: PollerConfig,
    ) -> Self {
        Self {
            fetcher,
            dispatcher,
            health,
            config,
        }
    }

    /// Polls until cancelled and returns the run's counters.
    pub async fn run(self, cancel: CancellationToken) -> PollStats {
        let mut stats = PollStats::default();
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let symbol = &self.dispatcher.store().instrument().symbol;

        tracing::info!("{} poller started, every {:?}", symbol, self.config.interval);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.config.mode == PollMode::WhenDegraded && self.health.streams_healthy() {
                stats.skipped += 1;
                continue;
            }

            // Requested-at time: a slow response must not look fresher than
            // stream events received while it was in flight.
            let observed_at = Timestamp::now();
            stats.requests += 1;

            let body = tokio::select! {
                () = cancel.cancelled() => break,
                body = self.fetcher.fetch() => body,
            };

            let result = body.and_then(|body| {
                decode_rest_ticker(&body, self.dispatcher.store().instrument()).map_err(FeedError::from)
            });
            match result {
                Ok(ticker) => {
                    self.dispatcher.dispatch(&FeedEvent::Polled(ticker), observed_at);
                }
                Err(e) => {
                    stats.failures += 1;
                    tracing::warn!("{} snapshot poll failed: {}", symbol, e);
                }
            }
        }

        tracing::info!("{} poller stopped after {} requests", symbol, stats.requests);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FeedKind;
    use bestquote_book::{BestQuoteStore, Instrument};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    #[async_trait]
    impl SnapshotFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<String, FeedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(FeedError::fetch("503"));
            }
            Ok(format!(
                r#"{{"symbol":"BTCUSDT","bidPrice":"{}","bidQty":"1","askPrice":"{}","askQty":"1"}}"#,
                100 + n,
                101 + n
            ))
        }
    }

    fn setup() -> (Arc<Dispatcher>, Arc<FeedHealth>) {
        let store = Arc::new(BestQuoteStore::new(Instrument::new("BTCUSDT")));
        (Arc::new(Dispatcher::new(store)), Arc::new(FeedHealth::new()))
    }

    fn config(mode: PollMode) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(100),
            mode,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_cancelled() {
        let (dispatcher, health) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = CountingFetcher {
            calls: calls.clone(),
            fail_first: true,
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Poller::new(fetcher, dispatcher.clone(), health, config(PollMode::Always))
                .run(cancel.clone()),
        );

        // Ticks at 0, 100, 200 and 300 ms.
        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();
        let stats = task.await.unwrap();

        assert_eq!(stats.requests, 4);
        assert_eq!(stats.failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(dispatcher.store().side(bestquote_book::Side::Bid).is_set());
        assert!(dispatcher.store().stats().applied >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_when_degraded_skips_while_streams_up() {
        let (dispatcher, health) = setup();
        health.register(FeedKind::Depth);
        health.set_up(FeedKind::Depth);

        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = CountingFetcher {
            calls: calls.clone(),
            fail_first: false,
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Poller::new(fetcher, dispatcher, health.clone(), config(PollMode::WhenDegraded))
                .run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        health.set_down(FeedKind::Depth);
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let stats = task.await.unwrap();

        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.requests, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
