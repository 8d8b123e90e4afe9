use crate::core::instrument::{InstrumentHandle, InstrumentState};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Symbol to instrument map owned by a session.
#[derive(Default)]
pub struct InstrumentRegistry {
    instruments: RwLock<HashMap<String, InstrumentHandle>>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<InstrumentHandle> {
        self.instruments.read().get(symbol).cloned()
    }

    /// Returns the tracked instrument, building it first if the symbol is new.
    /// The flag is true when a new entry was created.
    pub fn get_or_insert_with(
        &self,
        symbol: &str,
        make: impl FnOnce() -> InstrumentState,
    ) -> (InstrumentHandle, bool) {
        if let Some(existing) = self.get(symbol) {
            return (existing, false);
        }
        let mut map = self.instruments.write();
        if let Some(existing) = map.get(symbol) {
            return (existing.clone(), false);
        }
        let handle = Arc::new(make());
        map.insert(symbol.to_string(), handle.clone());
        (handle, true)
    }

    pub fn all(&self) -> Vec<InstrumentHandle> {
        self.instruments.read().values().cloned().collect()
    }
}
