//! # BestQuote Bench
//!
//! Workload generation and latency measurement for BestQuote benchmarks.

pub mod contention;
pub mod latency;
pub mod workload;
