//! Per partition content and version hashes, compared between copies.
//!
//! Hashes fold per entry checksums with a wrapping add so they do not depend
//! on the order entries were written in.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{info, warn, Result};
use crate::core::entry::{CacheObject, CacheVersion, DumpEntry};
use crate::core::reader::{Dump, DumpConsumer, DumpIterator, DumpReader};
use crate::grid::{CacheConfiguration, Cluster};

/// Hashes of one partition copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionHash {
    pub part_hash: i32,
    pub part_ver_hash: i32,
    pub size: u64,
}

impl PartitionHash {
    pub fn update(&mut self, entry: &DumpEntry) {
        // Tombstones are never dumped, live data may still hold none.
        let value = match &entry.value {
            Some(value) => value,
            None => return,
        };

        let mut h = crc32fast::Hasher::new();
        update_object(&mut h, &entry.key);
        update_object(&mut h, value);
        self.part_hash = self.part_hash.wrapping_add(h.finalize() as i32);

        let mut h = crc32fast::Hasher::new();
        update_version(&mut h, &entry.version);
        if let Some(conflict) = &entry.conflict_version {
            update_version(&mut h, conflict);
        }
        self.part_ver_hash = self.part_ver_hash.wrapping_add(h.finalize() as i32);

        self.size += 1;
    }

    pub fn of<'a>(entries: impl IntoIterator<Item = &'a DumpEntry>) -> Self {
        let mut hash = PartitionHash::default();
        entries.into_iter().for_each(|e| hash.update(e));
        hash
    }

    // Same data and same history.
    fn matches(&self, other: &PartitionHash) -> bool {
        self.part_hash == other.part_hash && self.part_ver_hash == other.part_ver_hash
    }
}

fn update_object(h: &mut crc32fast::Hasher, obj: &CacheObject) {
    h.update(&[obj.type_tag()]);
    h.update(&(obj.len() as u32).to_be_bytes());
    h.update(obj.bytes());
}

fn update_version(h: &mut crc32fast::Hasher, version: &CacheVersion) {
    h.update(&version.topology_version.to_be_bytes());
    h.update(&version.order.to_be_bytes());
    h.update(&version.node_order.to_be_bytes());
    h.update(&[version.cluster_id]);
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionKey {
    pub group_id: i32,
    pub group_name: String,
    pub partition: u32,
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PartitionKey [grpId={}, grpName={}, partId={}]",
            self.group_id, self.group_name, self.partition
        )
    }
}

/// A partition whose copies disagree.
#[derive(Debug, Clone)]
pub struct PartitionConflict {
    pub key: PartitionKey,
    // (where the copy lives, its hashes)
    pub copies: Vec<(String, PartitionHash)>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub partitions: u64,
    pub conflicts: Vec<PartitionConflict>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    fn from_copies(copies: BTreeMap<PartitionKey, Vec<(String, PartitionHash)>>) -> Self {
        let mut report = CheckReport::default();
        for (key, copies) in copies {
            report.partitions += 1;
            let diverged = copies
                .split_first()
                .map(|(first, rest)| rest.iter().any(|(_, h)| !h.matches(&first.1)))
                .unwrap_or(false);
            if diverged {
                report.conflicts.push(PartitionConflict { key, copies });
            }
        }
        report
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            writeln!(
                f,
                "The check procedure has finished, no conflicts have been found."
            )?;
            return writeln!(f);
        }

        writeln!(
            f,
            "The check procedure has failed, conflict partitions has been found: [hashConflicts={}]",
            self.conflicts.len()
        )?;
        for conflict in self.conflicts.iter() {
            writeln!(f, "Conflict partition: {}", conflict.key)?;
            writeln!(f, "Partition instances: [")?;
            for (source, hash) in conflict.copies.iter() {
                writeln!(
                    f,
                    "  PartitionHashRecord [consistentId={}, size={}, partHash={}, partVerHash={}]",
                    source, hash.size, hash.part_hash, hash.part_ver_hash
                )?;
            }
            writeln!(f, "]")?;
        }
        writeln!(f)
    }
}

// Collects the hash of every (node, group, partition) of a dump.
#[derive(Default)]
struct HashCollector {
    // (key, node) -> hash
    hashes: Mutex<BTreeMap<(PartitionKey, String), PartitionHash>>,
}

impl DumpConsumer for HashCollector {
    fn on_partition(
        &self,
        node: &str,
        group: &CacheConfiguration,
        partition: u32,
        entries: DumpIterator,
    ) -> Result<()> {
        let mut hash = PartitionHash::default();
        for entry in entries {
            hash.update(&entry?);
        }

        let key = PartitionKey {
            group_id: group.cache_id(),
            group_name: group.name.clone(),
            partition,
        };
        self.hashes.lock().insert((key, node.to_owned()), hash);
        Ok(())
    }
}

impl HashCollector {
    fn into_hashes(self) -> BTreeMap<(PartitionKey, String), PartitionHash> {
        self.hashes.into_inner()
    }
}

/// Runs consistency checks with a bounded number of threads.
pub struct Checker {
    thread_count: usize,
}

impl Checker {
    pub fn new(thread_count: usize) -> Self {
        Self {
            thread_count: std::cmp::max(thread_count, 1),
        }
    }

    /// Compare every copy of each partition inside one dump.
    pub async fn check(&self, dump: Dump) -> Result<CheckReport> {
        let name = dump.name();
        let hashes = self.collect(dump).await?;

        let mut copies: BTreeMap<PartitionKey, Vec<(String, PartitionHash)>> = BTreeMap::new();
        for ((key, node), hash) in hashes {
            copies.entry(key).or_default().push((node, hash));
        }

        let report = CheckReport::from_copies(copies);
        log_report(&name, &report);
        Ok(report)
    }

    /// Compare two dumps partition by partition.
    /// Each side is represented by the first node, in name order, holding the partition.
    pub async fn compare(&self, dump: Dump, other: Dump) -> Result<CheckReport> {
        let (name, other_name) = (dump.name(), other.name());
        let left = first_copies(self.collect(dump).await?);
        let right = first_copies(self.collect(other).await?);

        let mut copies: BTreeMap<PartitionKey, Vec<(String, PartitionHash)>> = BTreeMap::new();
        for key in left.keys().chain(right.keys()) {
            if copies.contains_key(key) {
                continue;
            }
            let side = |hashes: &BTreeMap<PartitionKey, (String, PartitionHash)>, dump: &str| {
                match hashes.get(key) {
                    Some((node, hash)) => (format!("{}/{}", dump, node), *hash),
                    None => (dump.to_owned(), PartitionHash::default()),
                }
            };
            copies.insert(
                key.clone(),
                vec![side(&left, name.as_str()), side(&right, other_name.as_str())],
            );
        }

        let report = CheckReport::from_copies(copies);
        log_report(&format!("{} vs {}", name, other_name), &report);
        Ok(report)
    }

    /// Compare a dump against the primary copies of the live cluster.
    pub async fn compare_with_live(&self, dump: Dump, cluster: &Cluster) -> Result<CheckReport> {
        let name = dump.name();

        let mut groups: BTreeMap<i32, CacheConfiguration> = BTreeMap::new();
        for node in dump.nodes_directories() {
            for config in dump.cache_configs(node) {
                groups.entry(config.cache_id()).or_insert_with(|| config.clone());
            }
        }

        let dumped = first_copies(self.collect(dump).await?);

        let mut copies: BTreeMap<PartitionKey, Vec<(String, PartitionHash)>> = BTreeMap::new();
        for config in groups.values() {
            let cache = match cluster.cache(&config.name) {
                Some(cache) => cache,
                None => {
                    warn!("Cache of the dump is not present in the cluster [name={}]", config.name);
                    continue;
                }
            };

            for partition in 0..config.partitions {
                let key = PartitionKey {
                    group_id: config.cache_id(),
                    group_name: config.name.clone(),
                    partition,
                };

                let dump_side = match dumped.get(&key) {
                    Some((node, hash)) => (format!("{}/{}", name, node), *hash),
                    None => (name.clone(), PartitionHash::default()),
                };

                let owners = cache.affinity().owners(partition, cluster.nodes());
                let live_side = match owners
                    .first()
                    .and_then(|primary| cache.local_partition(primary, partition).map(|p| (primary, p)))
                {
                    Some((primary, copy)) => (
                        format!("live/{}", primary),
                        PartitionHash::of(copy.entries().iter()),
                    ),
                    None => ("live".to_owned(), PartitionHash::default()),
                };

                copies.insert(key, vec![dump_side, live_side]);
            }
        }

        let report = CheckReport::from_copies(copies);
        log_report(&format!("{} vs live", name), &report);
        Ok(report)
    }

    async fn collect(&self, dump: Dump) -> Result<BTreeMap<(PartitionKey, String), PartitionHash>> {
        let collector = Arc::new(HashCollector::default());
        DumpReader::new(dump, self.thread_count)
            .run(Arc::clone(&collector) as Arc<dyn DumpConsumer>)
            .await?;

        Ok(match Arc::try_unwrap(collector) {
            Ok(collector) => collector.into_hashes(),
            Err(shared) => shared.hashes.lock().clone(),
        })
    }
}

fn first_copies(
    hashes: BTreeMap<(PartitionKey, String), PartitionHash>,
) -> BTreeMap<PartitionKey, (String, PartitionHash)> {
    let mut first = BTreeMap::new();
    // Keys iterate in (partition, node name) order, the first insert wins.
    for ((key, node), hash) in hashes {
        first.entry(key).or_insert((node, hash));
    }
    first
}

fn log_report(name: &str, report: &CheckReport) {
    if report.is_clean() {
        info!(
            "Check finished [dump={}, partitions={}, conflicts=0]",
            name, report.partitions
        );
    } else {
        warn!(
            "Check found conflicts [dump={}, partitions={}, conflicts={}]",
            name,
            report.partitions,
            report.conflicts.len()
        );
    }
}
