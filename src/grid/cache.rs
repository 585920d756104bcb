use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::entry::{CacheObject, CacheVersion};
use crate::grid::affinity::Affinity;
use crate::grid::partition::{Partition, StoredValue};
use crate::grid::resolver::ConflictResolver;

/// Stable id of a cache (and of its group) derived from its name.
pub fn cache_id(name: &str) -> i32 {
    let mut h = crc32fast::Hasher::new();
    h.update(name.as_bytes());
    h.finalize() as i32
}

/// Cache settings, persisted next to the partitions of a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfiguration {
    pub name: String,
    pub partitions: u32,
    pub backups: u32,
}

impl CacheConfiguration {
    pub const DEFAULT_PARTITIONS: u32 = 32;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: CacheConfiguration::DEFAULT_PARTITIONS,
            backups: 0,
        }
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = std::cmp::max(partitions, 1);
        self
    }

    pub fn with_backups(mut self, backups: u32) -> Self {
        self.backups = backups;
        self
    }

    pub fn cache_id(&self) -> i32 {
        cache_id(&self.name)
    }
}

// Hands out versions for local writes.
#[derive(Debug)]
pub(crate) struct VersionSource {
    topology_version: u32,
    cluster_id: u8,
    order: AtomicU64,
}

impl VersionSource {
    pub(crate) fn new(topology_version: u32, cluster_id: u8) -> Self {
        Self {
            topology_version,
            cluster_id,
            order: AtomicU64::new(1),
        }
    }

    pub(crate) fn next(&self, node_order: u32) -> CacheVersion {
        CacheVersion {
            topology_version: self.topology_version,
            order: self.order.fetch_add(1, Ordering::SeqCst),
            node_order,
            cluster_id: self.cluster_id,
        }
    }
}

/// A cache spread over the cluster nodes. Writes go to every owner of the key's partition.
pub struct GridCache {
    config: CacheConfiguration,
    id: i32,
    affinity: Arc<dyn Affinity>,
    nodes: Vec<String>,
    // node -> partition -> copy.
    copies: BTreeMap<String, BTreeMap<u32, Arc<Partition>>>,
    versions: Arc<VersionSource>,
    resolver: Arc<dyn ConflictResolver>,
}

impl std::fmt::Debug for GridCache {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("GridCache")
            .field("config", &self.config)
            .field("id", &self.id)
            .field("affinity", &self.affinity)
            .finish()
    }
}

impl GridCache {
    pub(crate) fn new(
        config: CacheConfiguration,
        affinity: Arc<dyn Affinity>,
        nodes: Vec<String>,
        versions: Arc<VersionSource>,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        let id = config.cache_id();

        let copies = nodes
            .iter()
            .map(|node| {
                let owned = affinity
                    .owned_partitions(node, &nodes)
                    .into_iter()
                    .map(|p| (p, Arc::new(Partition::new(id, p))))
                    .collect();
                (node.clone(), owned)
            })
            .collect();

        Self {
            config,
            id,
            affinity,
            nodes,
            copies,
            versions,
            resolver,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn config(&self) -> &CacheConfiguration {
        &self.config
    }

    pub fn affinity(&self) -> &Arc<dyn Affinity> {
        &self.affinity
    }

    pub fn partition_of(&self, key: &CacheObject) -> u32 {
        self.affinity.partition(key)
    }

    pub fn local_partition(&self, node: &str, partition: u32) -> Option<Arc<Partition>> {
        self.copies.get(node)?.get(&partition).cloned()
    }

    pub fn put(&self, key: CacheObject, value: CacheObject) {
        self.write(key, value, None, None)
    }

    pub fn put_expiring(&self, key: CacheObject, value: CacheObject, expire_time: i64) {
        self.write(key, value, None, Some(expire_time))
    }

    /// Apply a write replicated from another cluster carrying its own version.
    pub fn put_conflict(&self, key: CacheObject, value: CacheObject, conflict_version: CacheVersion) {
        self.write(key, value, Some(conflict_version), None)
    }

    pub fn remove(&self, key: &CacheObject) -> Option<CacheObject> {
        let partition = self.partition_of(key);
        let mut removed = None;
        for copy in self.owner_copies(partition) {
            if let Some(old) = copy.remove(key) {
                removed.get_or_insert(old.value);
            }
        }
        removed
    }

    // Read from the primary copy.
    pub fn get(&self, key: &CacheObject) -> Option<CacheObject> {
        let partition = self.partition_of(key);
        self.owner_copies(partition)
            .first()
            .and_then(|copy| copy.get(key))
            .map(|stored| stored.value)
    }

    pub fn size(&self) -> usize {
        (0..self.affinity.partitions())
            .filter_map(|p| self.owner_copies(p).into_iter().next())
            .map(|copy| copy.len())
            .sum()
    }

    fn write(
        &self,
        key: CacheObject,
        value: CacheObject,
        conflict_version: Option<CacheVersion>,
        expire_time: Option<i64>,
    ) {
        let partition = self.partition_of(&key);
        let owners = self.affinity.owners(partition, &self.nodes);
        let node_order = owners
            .first()
            .and_then(|primary| self.nodes.iter().position(|n| n == primary))
            .map(|i| i as u32 + 1)
            .unwrap_or(0);

        let stored = StoredValue {
            value,
            version: self.versions.next(node_order),
            conflict_version,
            expire_time,
        };

        for copy in self.owner_copies(partition) {
            if conflict_version.is_some() {
                copy.put_conflict(key.clone(), stored.clone(), self.resolver.as_ref());
            } else {
                copy.put(key.clone(), stored.clone());
            }
        }
    }

    fn owner_copies(&self, partition: u32) -> Vec<Arc<Partition>> {
        self.affinity
            .owners(partition, &self.nodes)
            .iter()
            .filter_map(|node| self.local_partition(node, partition))
            .collect()
    }
}
