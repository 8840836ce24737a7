//! Several producer threads racing on one store while a reader samples it.
//!
//! Run with: `cargo run --example concurrent_writers`

use bestquote::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = Arc::new(BestQuoteStore::new(Instrument::new("ETHUSDT")));
    let clock = Arc::new(AtomicU64::new(1));
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = store.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let (mut samples, mut crossed, mut inconsistent) = (0u64, 0u64, 0u64);
            while !done.load(Ordering::Acquire) {
                let state = store.snapshot();
                samples += 1;
                if state.is_crossed() {
                    crossed += 1;
                }
                if !state.is_consistent() {
                    inconsistent += 1;
                }
            }
            (samples, crossed, inconsistent)
        })
    };

    // One diff writer per side plus a lagging ticker writer for both sides.
    let writers: Vec<_> = [Side::Bid, Side::Ask]
        .into_iter()
        .map(|side| {
            let store = store.clone();
            let clock = clock.clone();
            std::thread::spawn(move || {
                for i in 0..100_000u64 {
                    let offset = (i % 10) as f64 * 0.01;
                    let price = match side {
                        Side::Bid => 1999.9 - offset,
                        Side::Ask => 2000.1 + offset,
                    };
                    let t = Timestamp::from_nanos(clock.fetch_add(1, Ordering::Relaxed));
                    store.update(side, QuoteSide::new(price, 1.0), UpdateSource::IncrementalDiff, t);
                }
            })
        })
        .chain(std::iter::once({
            let store = store.clone();
            let clock = clock.clone();
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    // Observed well in the past: always loses to the diffs.
                    let t = Timestamp::from_nanos(clock.load(Ordering::Relaxed) / 2);
                    store.update(Side::Bid, QuoteSide::new(2005.0, 1.0), UpdateSource::TickerSnapshot, t);
                    store.update(Side::Ask, QuoteSide::new(1995.0, 1.0), UpdateSource::TickerSnapshot, t);
                }
            })
        }))
        .collect();

    for writer in writers {
        let _ = writer.join();
    }
    done.store(true, Ordering::Release);
    let (samples, crossed, inconsistent) = reader.join().unwrap_or_default();

    let state = store.snapshot();
    let stats = store.stats();
    println!("final: bid={:?} ask={:?}", state.best_bid.quote(), state.best_ask.quote());
    println!(
        "updates: applied={} stale={} crossed={}",
        stats.applied, stats.rejected_stale, stats.rejected_crossed
    );
    println!("reader: samples={samples} crossed={crossed} inconsistent={inconsistent}");
}
