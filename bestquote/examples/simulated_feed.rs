//! Runs a subscription against a simulated venue.
//!
//! The venue walks a mid price and serves it three ways: a depth diff
//! stream, a book ticker stream that drops its connection every few
//! seconds, and a REST ticker endpoint that answers slowly.
//!
//! Run with: `RUST_LOG=info cargo run --example simulated_feed`

use async_trait::async_trait;
use bestquote::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Venue mid price in hundredths.
#[derive(Default)]
struct Venue {
    mid_cents: AtomicU64,
    update_id: AtomicU64,
}

impl Venue {
    fn new(mid: f64) -> Arc<Self> {
        let venue = Self::default();
        venue.mid_cents.store((mid * 100.0) as u64, Ordering::Relaxed);
        Arc::new(venue)
    }

    fn step(&self, seed: u64) -> (f64, u64) {
        let delta = if seed % 3 == 0 { 1 } else { 0 };
        let mid = if seed % 2 == 0 {
            self.mid_cents.fetch_add(delta, Ordering::Relaxed) + delta
        } else {
            self.mid_cents.fetch_sub(delta, Ordering::Relaxed) - delta
        };
        let id = self.update_id.fetch_add(1, Ordering::Relaxed) + 1;
        (mid as f64 / 100.0, id)
    }

    fn mid(&self) -> f64 {
        self.mid_cents.load(Ordering::Relaxed) as f64 / 100.0
    }
}

struct DepthStream {
    venue: Arc<Venue>,
    n: u64,
}

#[async_trait]
impl FeedSource for DepthStream {
    async fn connect(&mut self) -> Result<(), FeedError> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<String>, FeedError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.n += 1;
        let (mid, id) = self.venue.step(self.n);
        Ok(Some(format!(
            r#"{{"e":"depthUpdate","E":0,"s":"BTCUSDT","U":{id},"u":{id},"b":[["{:.2}","{}"]],"a":[["{:.2}","{}"]]}}"#,
            mid - 0.01,
            1 + self.n % 4,
            mid + 0.01,
            1 + self.n % 3,
        )))
    }
}

struct TickerStream {
    venue: Arc<Venue>,
    frames: u64,
}

#[async_trait]
impl FeedSource for TickerStream {
    async fn connect(&mut self) -> Result<(), FeedError> {
        self.frames = 0;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<String>, FeedError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.frames += 1;
        if self.frames > 60 {
            return Err(FeedError::transport("simulated disconnect"));
        }
        let mid = self.venue.mid();
        Ok(Some(format!(
            r#"{{"s":"BTCUSDT","b":"{:.2}","B":"2.5","a":"{:.2}","A":"1.5"}}"#,
            mid - 0.01,
            mid + 0.01
        )))
    }
}

struct SlowRest {
    venue: Arc<Venue>,
}

#[async_trait]
impl SnapshotFetcher for SlowRest {
    async fn fetch(&self) -> Result<String, FeedError> {
        let mid = self.venue.mid();
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(format!(
            r#"{{"symbol":"BTCUSDT","bidPrice":"{:.2}","bidQty":"3","askPrice":"{:.2}","askQty":"3"}}"#,
            mid - 0.01,
            mid + 0.01
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let venue = Venue::new(30_000.0);
    let mut sub = Subscription::builder(Instrument::new("BTCUSDT"))
        .poll_interval(Duration::from_millis(500))
        .reconnect(ReconnectConfig {
            initial_delay: Duration::from_millis(200),
            ..ReconnectConfig::default()
        })
        .notifications(4096)
        .build();

    sub.spawn_depth_feed(DepthStream {
        venue: venue.clone(),
        n: 0,
    });
    sub.spawn_ticker_feed(TickerStream {
        venue: venue.clone(),
        frames: 0,
    });
    sub.spawn_poller(SlowRest {
        venue: venue.clone(),
    });
    sub.spawn_reconciler();

    println!("Streaming simulated BTCUSDT for 10s (Ctrl+C to stop early)...");

    let mut report = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
            _ = report.tick() => {
                let state = sub.snapshot();
                let resets = sub
                    .notifications()
                    .map(|rx| {
                        rx.try_iter()
                            .filter(|e| matches!(e, QuoteEvent::SideReset(_)))
                            .count()
                    })
                    .unwrap_or(0);
                println!(
                    "bid={:?} ask={:?} spread={:?} stale=({}, {}) resets={} venue_mid={:.2}",
                    state.best_bid.quote(),
                    state.best_ask.quote(),
                    state.spread(),
                    state.stale.bid,
                    state.stale.ask,
                    resets,
                    venue.mid(),
                );
            }
        }
    }

    let stats = sub.store().stats();
    println!(
        "applied={} stale={} invalid={} crossed={} crossings={}",
        stats.applied,
        stats.rejected_stale,
        stats.rejected_invalid,
        stats.rejected_crossed,
        stats.crossings
    );
    sub.shutdown().await;
    Ok(())
}
