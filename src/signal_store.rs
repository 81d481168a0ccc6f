// =============================================================================
// Signal Store: latest Signal per asset
// =============================================================================
//
// Sole owner of the asset -> Signal mapping. Each write is an independent
// upsert of one key under a short write lock (never held across an await),
// so concurrent per-asset tasks can only ever replace their own entry. The
// last completed write for an asset wins; no history is kept.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::types::Signal;

#[derive(Debug, Default)]
pub struct SignalStore {
    signals: RwLock<HashMap<String, Signal>>,
    /// Bumped on every upsert; the WebSocket feed watches it.
    version: AtomicU64,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the signal for `signal.asset_id`. Returns the
    /// previous signal for that asset, if any.
    pub fn upsert(&self, signal: Signal) -> Option<Signal> {
        let prev = self
            .signals
            .write()
            .insert(signal.asset_id.clone(), signal);
        self.version.fetch_add(1, Ordering::SeqCst);
        prev
    }

    pub fn get(&self, asset_id: &str) -> Option<Signal> {
        self.signals.read().get(asset_id).cloned()
    }

    /// Every stored signal, ordered by asset id.
    pub fn all(&self) -> Vec<Signal> {
        let mut out: Vec<Signal> = self.signals.read().values().cloned().collect();
        out.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        out
    }

    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
