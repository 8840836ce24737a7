//! Instrument definitions and the per-instrument store registry.

use crate::store::BestQuoteStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Instrument definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instrument {
    /// Venue symbol, upper case (e.g. `BTCUSDT`).
    pub symbol: String,
}

impl Instrument {
    /// Creates an instrument, upper-casing the symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_ascii_uppercase(),
        }
    }

    /// Returns true if `symbol` names this instrument, ignoring case.
    #[must_use]
    pub fn matches(&self, symbol: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(symbol)
    }
}

/// One store per tracked instrument, keyed by symbol.
///
/// Supporting another instrument means registering another store; stores
/// never share state.
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Arc<BestQuoteStore>>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the store for an instrument, creating it on first use.
    pub fn get_or_create(&self, instrument: &Instrument) -> Arc<BestQuoteStore> {
        if let Some(store) = self.stores.read().get(&instrument.symbol) {
            return Arc::clone(store);
        }
        let mut stores = self.stores.write();
        let store = stores
            .entry(instrument.symbol.clone())
            .or_insert_with(|| {
                tracing::info!("Tracking best quote for {}", instrument.symbol);
                Arc::new(BestQuoteStore::new(instrument.clone()))
            });
        Arc::clone(store)
    }

    /// Gets a store by symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Arc<BestQuoteStore>> {
        self.stores
            .read()
            .get(&symbol.to_ascii_uppercase())
            .map(Arc::clone)
    }

    /// Removes a store; readers still holding it keep a detached copy.
    pub fn remove(&self, symbol: &str) -> Option<Arc<BestQuoteStore>> {
        let removed = self.stores.write().remove(&symbol.to_ascii_uppercase());
        if removed.is_some() {
            tracing::info!("Stopped tracking {}", symbol);
        }
        removed
    }

    /// Returns all tracked symbols.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.stores.read().keys().cloned().collect()
    }

    /// Returns the number of tracked instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    /// Returns true if no instrument is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
