use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Read access to committed state. Shared by every worker, never written during a round.
pub trait CommittedState: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
}

/// What contract code reads and writes through.
pub trait StateAccessor {
    fn get(&mut self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value);
}

#[derive(Default)]
pub struct MemoryState {
    inner: RwLock<BTreeMap<String, Value>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.inner.write().insert(key.to_string(), value);
    }

    /// Applies a finalized block's writes. Only the component that owns finalization
    /// calls this.
    pub fn commit<I: IntoIterator<Item = (String, Value)>>(&self, writes: I) {
        let mut inner = self.inner.write();
        for (key, value) in writes {
            inner.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl CommittedState for MemoryState {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }
}

/// Per worker view of state: committed state, overlaid with the pending writes of earlier
/// calls on this worker, overlaid with the writes of the current call.
pub struct PendingState {
    committed: Arc<dyn CommittedState>,
    /// Writes of earlier successful calls, not committed
    cache: HashMap<String, Value>,
    /// Scratch of the current call
    reads: BTreeSet<String>,
    writes: BTreeMap<String, Value>,
}

impl PendingState {
    pub fn new(committed: Arc<dyn CommittedState>) -> Self {
        Self {
            committed,
            cache: HashMap::new(),
            reads: BTreeSet::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Ends the current call keeping its writes in the overlay. Returns what it read and
    /// wrote.
    pub fn finish_call(&mut self) -> (BTreeSet<String>, BTreeMap<String, Value>) {
        let reads = std::mem::take(&mut self.reads);
        let writes = std::mem::take(&mut self.writes);
        for (key, value) in &writes {
            self.cache.insert(key.clone(), value.clone());
        }
        (reads, writes)
    }

    /// Ends the current call discarding its writes. Reads are still reported.
    pub fn abort_call(&mut self) -> BTreeSet<String> {
        self.writes.clear();
        std::mem::take(&mut self.reads)
    }

    pub fn purge(&mut self, keys: &BTreeSet<String>) {
        for key in keys {
            self.cache.remove(key);
        }
    }

    pub fn clear_scratch(&mut self) {
        self.reads.clear();
        self.writes.clear();
    }

    /// Forgets every pending write, leaving only committed state visible.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.clear_scratch();
    }

    pub fn pending_keys(&self) -> BTreeSet<String> {
        self.cache.keys().cloned().collect()
    }
}

impl StateAccessor for PendingState {
    fn get(&mut self, key: &str) -> Option<Value> {
        self.reads.insert(key.to_string());
        if let Some(value) = self.writes.get(key) {
            return Some(value.clone());
        }
        if let Some(value) = self.cache.get(key) {
            return Some(value.clone());
        }
        self.committed.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.writes.insert(key.to_string(), value);
    }
}
