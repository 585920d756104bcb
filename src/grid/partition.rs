use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::entry::{CacheObject, CacheVersion, DumpEntry};
use crate::grid::resolver::{ConflictResolver, Resolution};

/// Live state of one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValue {
    pub value: CacheObject,
    pub version: CacheVersion,
    pub conflict_version: Option<CacheVersion>,
    pub expire_time: Option<i64>,
}

impl StoredValue {
    pub fn new(value: CacheObject, version: CacheVersion) -> Self {
        Self {
            value,
            version,
            conflict_version: None,
            expire_time: None,
        }
    }

    // Version that decides between concurrent writers.
    pub fn effective_version(&self) -> CacheVersion {
        self.conflict_version.unwrap_or(self.version)
    }

    fn to_entry(&self, cache_id: i32, partition: u32, key: CacheObject) -> DumpEntry {
        DumpEntry {
            cache_id,
            partition,
            key,
            value: Some(self.value.clone()),
            version: self.version,
            conflict_version: self.conflict_version,
            expire_time: self.expire_time,
        }
    }
}

#[derive(Default)]
struct PartitionState {
    entries: BTreeMap<CacheObject, StoredValue>,
    // Keys mutated while a capture is draining, per capture.
    changelogs: HashMap<u64, BTreeSet<CacheObject>>,
}

impl PartitionState {
    fn record_change(&mut self, key: &CacheObject) {
        for changelog in self.changelogs.values_mut() {
            changelog.insert(key.clone());
        }
    }
}

/// One copy of a cache partition held by a node.
pub struct Partition {
    cache_id: i32,
    id: u32,
    state: Mutex<PartitionState>,
    next_capture: AtomicU64,
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("cache_id", &self.cache_id)
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

impl Partition {
    pub fn new(cache_id: i32, id: u32) -> Self {
        Self {
            cache_id,
            id,
            state: Mutex::new(PartitionState::default()),
            next_capture: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn cache_id(&self) -> i32 {
        self.cache_id
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &CacheObject) -> Option<StoredValue> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn put(&self, key: CacheObject, value: StoredValue) -> Option<StoredValue> {
        let mut state = self.state.lock();
        state.record_change(&key);
        state.entries.insert(key, value)
    }

    /// Store a replicated write, asking resolver when the key already holds a value.
    /// Return whether the new value was applied.
    pub fn put_conflict(
        &self,
        key: CacheObject,
        value: StoredValue,
        resolver: &dyn ConflictResolver,
    ) -> bool {
        let mut state = self.state.lock();

        if let Some(old) = state.entries.get(&key) {
            if resolver.resolve(&key, old, &value) == Resolution::UseOld {
                return false;
            }
        }

        state.record_change(&key);
        state.entries.insert(key, value);
        true
    }

    pub fn remove(&self, key: &CacheObject) -> Option<StoredValue> {
        let mut state = self.state.lock();
        let old = state.entries.remove(key);
        if old.is_some() {
            state.record_change(key);
        }
        old
    }

    /// Current rows in key order.
    pub fn entries(&self) -> Vec<DumpEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(k, v)| v.to_entry(self.cache_id, self.id, k.clone()))
            .collect()
    }

    /// Begin a consistent cut of this partition.
    pub fn capture(self: &Arc<Self>) -> Capture {
        let capture_id = self.next_capture.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        let keys: Vec<CacheObject> = state.entries.keys().cloned().collect();
        state.changelogs.insert(capture_id, BTreeSet::new());
        drop(state);

        Capture {
            partition: Arc::clone(self),
            capture_id,
            pending: keys.into_iter(),
            drained: HashSet::new(),
            finished: false,
        }
    }

    fn release(&self, capture_id: u64) -> BTreeSet<CacheObject> {
        self.state
            .lock()
            .changelogs
            .remove(&capture_id)
            .unwrap_or_default()
    }
}

/// Consistent cut over one partition.
///
/// Iterating drains the keys present when the capture began, each read at its latest state.
/// `finish` adds keys that appeared while draining. Every key is yielded at most once.
pub struct Capture {
    partition: Arc<Partition>,
    capture_id: u64,
    pending: std::vec::IntoIter<CacheObject>,
    drained: HashSet<CacheObject>,
    finished: bool,
}

impl Capture {
    pub fn partition(&self) -> u32 {
        self.partition.id
    }

    /// Stop recording mutations and return the latest state of changed keys not drained yet.
    /// Keys inserted and removed while draining yield nothing.
    pub fn finish(mut self) -> Vec<DumpEntry> {
        self.finished = true;

        let p = &self.partition;
        let mut state = p.state.lock();
        let changelog = state.changelogs.remove(&self.capture_id).unwrap_or_default();

        let mut reconciled = Vec::new();
        for key in changelog {
            if self.drained.contains(&key) {
                continue;
            }
            if let Some(stored) = state.entries.get(&key) {
                reconciled.push(stored.to_entry(p.cache_id, p.id, key));
            }
        }
        reconciled
    }
}

impl Iterator for Capture {
    type Item = DumpEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for key in self.pending.by_ref() {
            let stored = self.partition.get(&key);
            // Removed since the cut began.
            let stored = match stored {
                Some(stored) => stored,
                None => continue,
            };
            let entry = stored.to_entry(self.partition.cache_id, self.partition.id, key.clone());
            self.drained.insert(key);
            return Some(entry);
        }
        None
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if !self.finished {
            self.partition.release(self.capture_id);
        }
    }
}
