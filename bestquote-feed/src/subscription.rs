//! Subscription builder and the running set of feed tasks for one instrument.

use crate::dispatcher::{Dispatcher, QuoteEvent};
use crate::event::FeedKind;
use crate::health::FeedHealth;
use crate::poller::{PollMode, Poller, PollerConfig, SnapshotFetcher};
use crate::reconnect::ReconnectConfig;
use crate::stream::{FeedSource, StreamFeed};
use bestquote_book::{
    BestQuoteState, BestQuoteStore, Instrument, Reconciler, ReconcilerConfig,
};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builder for configuring and creating a subscription.
pub struct SubscriptionBuilder {
    instrument: Instrument,
    store: Option<Arc<BestQuoteStore>>,
    poller: PollerConfig,
    reconnect: ReconnectConfig,
    reset_on_reconnect: bool,
    notification_capacity: Option<usize>,
    reconciler: ReconcilerConfig,
    reconcile_interval: Duration,
}

impl SubscriptionBuilder {
    /// Creates a builder for the given instrument.
    #[must_use]
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            store: None,
            poller: PollerConfig::default(),
            reconnect: ReconnectConfig::default(),
            reset_on_reconnect: true,
            notification_capacity: None,
            reconciler: ReconcilerConfig::default(),
            reconcile_interval: Duration::from_millis(500),
        }
    }

    /// Uses an existing store, e.g. one from a `StoreRegistry`.
    #[must_use]
    pub fn store(mut self, store: Arc<BestQuoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poller.interval = interval;
        self
    }

    /// Sets the poll mode.
    #[must_use]
    pub fn poll_mode(mut self, mode: PollMode) -> Self {
        self.poller.mode = mode;
        self
    }

    /// Sets stream reconnect backoff.
    #[must_use]
    pub fn reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    /// Sets whether a stream reconnect clears the book.
    #[must_use]
    pub fn reset_on_reconnect(mut self, enabled: bool) -> Self {
        self.reset_on_reconnect = enabled;
        self
    }

    /// Enables `QuoteEvent` notifications on a channel of this capacity.
    #[must_use]
    pub fn notifications(mut self, capacity: usize) -> Self {
        self.notification_capacity = Some(capacity);
        self
    }

    /// Sets the reconciler timeout and how often it checks the book.
    #[must_use]
    pub fn reconciler(mut self, config: ReconcilerConfig, interval: Duration) -> Self {
        self.reconciler = config;
        self.reconcile_interval = interval;
        self
    }

    /// Builds the subscription. No task runs until one is spawned.
    #[must_use]
    pub fn build(self) -> Subscription {
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(BestQuoteStore::new(self.instrument)),
        };

        let (dispatcher, notifications) = match self.notification_capacity {
            Some(capacity) => {
                let (dispatcher, rx) = Dispatcher::with_notifications(store.clone(), capacity);
                (dispatcher, Some(rx))
            }
            None => (Dispatcher::new(store.clone()), None),
        };

        Subscription {
            store,
            dispatcher: Arc::new(dispatcher),
            health: Arc::new(FeedHealth::new()),
            notifications,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            poller: self.poller,
            reconnect: self.reconnect,
            reset_on_reconnect: self.reset_on_reconnect,
            reconciler: self.reconciler,
            reconcile_interval: self.reconcile_interval,
        }
    }
}

/// Feed tasks maintaining the best quote of one instrument.
///
/// Spawning requires a Tokio runtime. Dropping the subscription cancels
/// its tasks; `shutdown` also waits for them.
pub struct Subscription {
    store: Arc<BestQuoteStore>,
    dispatcher: Arc<Dispatcher>,
    health: Arc<FeedHealth>,
    notifications: Option<Receiver<QuoteEvent>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    poller: PollerConfig,
    reconnect: ReconnectConfig,
    reset_on_reconnect: bool,
    reconciler: ReconcilerConfig,
    reconcile_interval: Duration,
}

impl Subscription {
    /// Creates a builder.
    #[must_use]
    pub fn builder(instrument: Instrument) -> SubscriptionBuilder {
        SubscriptionBuilder::new(instrument)
    }

    /// Starts the depth diff stream.
    pub fn spawn_depth_feed<S: FeedSource + 'static>(&mut self, source: S) {
        self.spawn_stream(FeedKind::Depth, source);
    }

    /// Starts the book ticker stream.
    pub fn spawn_ticker_feed<S: FeedSource + 'static>(&mut self, source: S) {
        self.spawn_stream(FeedKind::BookTicker, source);
    }

    fn spawn_stream<S: FeedSource + 'static>(&mut self, kind: FeedKind, source: S) {
        // Registered before spawning so a poller in WhenDegraded mode
        // sees the feed as down until it first connects.
        self.health.register(kind);
        let feed = StreamFeed::new(kind, source, self.dispatcher.clone(), self.health.clone())
            .reconnect(self.reconnect.clone())
            .reset_on_reconnect(self.reset_on_reconnect);
        let cancel = self.cancel.clone();
        let symbol = self.store.instrument().symbol.clone();

        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = feed.run(cancel).await {
                tracing::error!("{} {} feed stopped: {}", symbol, kind, e);
            }
        }));
    }

    /// Starts the snapshot poller.
    pub fn spawn_poller<F: SnapshotFetcher + 'static>(&mut self, fetcher: F) {
        let poller = Poller::new(
            fetcher,
            self.dispatcher.clone(),
            self.health.clone(),
            self.poller.clone(),
        );
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            poller.run(cancel).await;
        }));
    }

    /// Starts the reconciler, which resets sides stuck stale on a crossed book.
    pub fn spawn_reconciler(&mut self) {
        let mut reconciler = Reconciler::new(self.reconciler.clone());
        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.clone();
        let period = self.reconcile_interval;

        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                // Runtime clock, so the timeout follows paused time in tests.
                let now = tokio::time::Instant::now().into_std();
                let store: &BestQuoteStore = dispatcher.store();
                for side in reconciler.check_at(store, now) {
                    dispatcher.notify_reset(side);
                }
            }
        }));
    }

    /// Returns the shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<BestQuoteStore> {
        &self.store
    }

    /// Returns a consistent copy of both sides.
    #[must_use]
    pub fn snapshot(&self) -> BestQuoteState {
        self.store.snapshot()
    }

    /// Returns stream health.
    #[must_use]
    pub fn health(&self) -> &Arc<FeedHealth> {
        &self.health
    }

    /// Returns the dispatcher feeding the store.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the notification receiver, if enabled.
    #[must_use]
    pub fn notifications(&self) -> Option<&Receiver<QuoteEvent>> {
        self.notifications.as_ref()
    }

    /// Returns the number of spawned tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancels all tasks and waits for them to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("{} feed task failed: {}", self.store.instrument().symbol, e);
            }
        }
        tracing::info!("{} subscription shut down", self.store.instrument().symbol);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use async_trait::async_trait;
    use bestquote_book::{QuoteSide, Side, StoreRegistry, Timestamp, UpdateSource};
    use std::collections::VecDeque;

    struct OneShot {
        frames: VecDeque<String>,
        connected: bool,
    }

    #[async_trait]
    impl FeedSource for OneShot {
        async fn connect(&mut self) -> Result<(), FeedError> {
            if self.connected {
                std::future::pending::<()>().await;
            }
            self.connected = true;
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Option<String>, FeedError> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => std::future::pending().await,
            }
        }
    }

    struct StaticFetcher;

    #[async_trait]
    impl SnapshotFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<String, FeedError> {
            Ok(r#"[{"symbol":"ETHUSDT","bidPrice":"1","bidQty":"1","askPrice":"2","askQty":"1"},
                {"symbol":"BTCUSDT","bidPrice":"100","bidQty":"1","askPrice":"101","askQty":"1"}]"#
                .to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_depth_feed_updates_store() {
        let mut sub = Subscription::builder(Instrument::new("btcusdt"))
            .notifications(8)
            .build();
        sub.spawn_depth_feed(OneShot {
            frames: VecDeque::from([String::from(
                r#"{"e":"depthUpdate","E":1,"s":"BTCUSDT","U":1,"u":1,"b":[["100.5","2"]],"a":[["101","1"]]}"#,
            )]),
            connected: false,
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = sub.snapshot();
        assert_eq!(state.best_bid.price(), Some(100.5));
        assert_eq!(state.best_ask.price(), Some(101.0));
        assert!(sub.health().streams_healthy());
        assert!(matches!(
            sub.notifications().unwrap().try_recv(),
            Ok(QuoteEvent::TopOfBookChanged(_))
        ));

        sub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_on_registry_store() {
        let registry = StoreRegistry::new();
        let store = registry.get_or_create(&Instrument::new("BTCUSDT"));

        let mut sub = Subscription::builder(Instrument::new("BTCUSDT"))
            .store(store.clone())
            .poll_interval(Duration::from_millis(100))
            .build();
        sub.spawn_poller(StaticFetcher);
        assert_eq!(sub.task_count(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.side(Side::Bid).price(), Some(100.0));
        assert!(Arc::ptr_eq(sub.store(), &store));

        sub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconciler_task_resets_stuck_side() {
        let mut sub = Subscription::builder(Instrument::new("BTCUSDT"))
            .notifications(8)
            .reconciler(
                ReconcilerConfig {
                    timeout: Duration::from_millis(5),
                },
                Duration::from_millis(10),
            )
            .build();

        let store = sub.store().clone();
        store.update(
            Side::Ask,
            QuoteSide::new(100.0, 1.0),
            UpdateSource::IncrementalDiff,
            Timestamp::from_millis(1),
        );
        store.update(
            Side::Bid,
            QuoteSide::new(101.0, 1.0),
            UpdateSource::IncrementalDiff,
            Timestamp::from_millis(2),
        );
        assert!(store.is_stale(Side::Ask));

        sub.spawn_reconciler();
        // First tick starts tracking; the tick 10ms later is past the timeout.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.side(Side::Ask).is_set());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!store.side(Side::Ask).is_set());
        assert_eq!(store.side(Side::Bid).price(), Some(101.0));
        assert_eq!(
            sub.notifications().unwrap().try_recv(),
            Ok(QuoteEvent::SideReset(Side::Ask))
        );
        sub.shutdown().await;
    }
}
