//! # BestQuote Book
//!
//! Concurrent best bid/ask state for a single instrument.
//!
//! This crate provides:
//! - Quote value types with an explicit unset state
//! - A per-instrument store safe under parallel producers and readers
//! - A pluggable merge policy for diff, ticker and polled updates
//! - Reconciliation of crossed books that fail to heal

pub mod error;
pub mod instruments;
pub mod policy;
pub mod quote;
pub mod reconcile;
pub mod store;

pub use error::QuoteError;
pub use instruments::{Instrument, StoreRegistry};
pub use policy::{Admission, MergeContext, MergePolicy, OppositeView, StandardPolicy};
pub use quote::{QuoteSide, QuoteSlot, Side, Timestamp, UpdateSource};
pub use reconcile::{Reconciler, ReconcilerConfig};
pub use store::{BestQuoteState, BestQuoteStore, LastUpdated, StaleFlags, StoreStats, UpdateOutcome};
