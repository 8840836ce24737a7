//! Multi-threaded writer/reader runs against one store.

use crate::latency::LatencyCollector;
use crate::workload::UpdateWorkload;
use bestquote_book::BestQuoteStore;
use hdrhistogram::CreationError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Result of a contention run.
#[derive(Debug)]
pub struct ContentionResult {
    /// Updates issued by all writers.
    pub updates: u64,
    /// Snapshots taken by all readers.
    pub snapshots: u64,
    /// Snapshots that showed a crossed book without a stale flag.
    pub inconsistent: u64,
    /// Wall time of the writers.
    pub duration: Duration,
    /// Per-update latency across writers.
    pub update_latency: LatencyCollector,
}

impl ContentionResult {
    /// Returns updates per second.
    #[must_use]
    pub fn updates_per_second(&self) -> f64 {
        self.updates as f64 / self.duration.as_secs_f64()
    }
}

/// Runs `writers` threads issuing `updates_per_writer` updates each while
/// `readers` threads snapshot the store until the writers finish.
///
/// # Errors
/// Returns the histogram creation error.
pub fn run_contended(
    store: Arc<BestQuoteStore>,
    writers: usize,
    readers: usize,
    updates_per_writer: usize,
) -> Result<ContentionResult, CreationError> {
    let done = Arc::new(AtomicBool::new(false));
    let mut update_latency = LatencyCollector::new()?;

    let reader_handles: Vec<_> = (0..readers)
        .map(|_| {
            let store = store.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let (mut snapshots, mut inconsistent) = (0u64, 0u64);
                while !done.load(Ordering::Acquire) {
                    if !store.snapshot().is_consistent() {
                        inconsistent += 1;
                    }
                    snapshots += 1;
                }
                (snapshots, inconsistent)
            })
        })
        .collect();

    let start = Instant::now();
    let writer_handles: Vec<_> = (0..writers)
        .map(|i| {
            let store = store.clone();
            let updates = UpdateWorkload::new(i as u64 + 1, 100.0, 0.01, 8).take(updates_per_writer);
            std::thread::spawn(move || -> Result<LatencyCollector, CreationError> {
                let mut latency = LatencyCollector::new()?;
                for u in updates {
                    latency.measure(|| store.update(u.side, u.quote, u.source, u.observed_at));
                }
                Ok(latency)
            })
        })
        .collect();

    let writer_results = join_then_stop(writer_handles, &done);
    let duration = start.elapsed();

    let (mut snapshots, mut inconsistent) = (0, 0);
    for handle in reader_handles {
        match handle.join() {
            Ok((s, i)) => {
                snapshots += s;
                inconsistent += i;
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    for result in writer_results {
        // A panicking writer is a bug in the store; surface it.
        match result {
            Ok(latency) => update_latency.merge(&latency?),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    Ok(ContentionResult {
        updates: (writers * updates_per_writer) as u64,
        snapshots,
        inconsistent,
        duration,
        update_latency,
    })
}

/// Joins every writer, then raises `done`.
///
/// `done` is raised even when writers failed or panicked, so readers
/// spinning on it always terminate.
fn join_then_stop<T>(
    writers: Vec<JoinHandle<T>>,
    done: &AtomicBool,
) -> Vec<std::thread::Result<T>> {
    let results = writers.into_iter().map(JoinHandle::join).collect();
    done.store(true, Ordering::Release);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use bestquote_book::Instrument;

    #[test]
    fn test_contended_run_stays_consistent() {
        let store = Arc::new(BestQuoteStore::new(Instrument::new("BTCUSDT")));
        let result = run_contended(store.clone(), 2, 2, 2_000).unwrap();

        assert_eq!(result.updates, 4_000);
        assert_eq!(result.update_latency.len(), 4_000);
        assert_eq!(result.inconsistent, 0);
        assert!(store.snapshot().is_consistent());
        assert!(format!("{result:?}").contains("update_latency: LatencyCollector"));
    }

    #[test]
    fn test_failed_writer_still_stops_readers() {
        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let done = done.clone();
            std::thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }
            })
        };

        let writers: Vec<JoinHandle<Result<(), &'static str>>> = vec![
            std::thread::spawn(|| Err("histogram")),
            std::thread::spawn(|| -> Result<(), &'static str> { panic!("writer failed") }),
            std::thread::spawn(|| Ok(())),
        ];
        let results = join_then_stop(writers, &done);

        assert!(done.load(Ordering::Acquire));
        assert!(reader.join().is_ok());
        assert!(matches!(results[0], Ok(Err("histogram"))));
        assert!(results[1].is_err());
        assert!(matches!(results[2], Ok(Ok(()))));
    }
}
