//! Decode and dispatch benchmarks.
//!
//! Run with: cargo bench -p bestquote-bench --bench dispatch

use bestquote_book::{BestQuoteStore, Instrument, Timestamp};
use bestquote_feed::{Dispatcher, FeedKind, decode_frame};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

const DEPTH: &str = r#"{"e":"depthUpdate","E":1700000000123,"s":"BTCUSDT","U":157,"u":160,"b":[["30000.00","0.5"],["29999.50","1.25"],["29999.00","0"]],"a":[["30000.50","0.30"],["30001.00","2.00"]]}"#;
const BOOK_TICKER: &str =
    r#"{"u":400900217,"s":"BTCUSDT","b":"30000.00","B":"31.21","a":"30000.50","A":"40.66"}"#;

fn bench_decode(c: &mut Criterion) {
    let instrument = Instrument::new("BTCUSDT");
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("depth", |b| {
        b.iter(|| black_box(decode_frame(FeedKind::Depth, black_box(DEPTH), &instrument)))
    });
    group.bench_function("book_ticker", |b| {
        b.iter(|| {
            black_box(decode_frame(
                FeedKind::BookTicker,
                black_box(BOOK_TICKER),
                &instrument,
            ))
        })
    });

    group.finish();
}

fn bench_decode_dispatch(c: &mut Criterion) {
    let instrument = Instrument::new("BTCUSDT");
    let mut group = c.benchmark_group("decode_dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("book_ticker", |b| {
        let dispatcher = Dispatcher::new(Arc::new(BestQuoteStore::new(instrument.clone())));
        let mut nanos = 0u64;
        b.iter(|| {
            nanos += 1;
            if let Ok(event) = decode_frame(FeedKind::BookTicker, BOOK_TICKER, &instrument) {
                black_box(dispatcher.dispatch(&event, Timestamp::from_nanos(nanos)));
            }
        })
    });

    group.bench_function("book_ticker_with_notifications", |b| {
        let (dispatcher, rx) =
            Dispatcher::with_notifications(Arc::new(BestQuoteStore::new(instrument.clone())), 1024);
        let mut nanos = 0u64;
        b.iter(|| {
            nanos += 1;
            if let Ok(event) = decode_frame(FeedKind::BookTicker, BOOK_TICKER, &instrument) {
                black_box(dispatcher.dispatch(&event, Timestamp::from_nanos(nanos)));
            }
            while rx.try_recv().is_ok() {}
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_decode_dispatch);
criterion_main!(benches);
