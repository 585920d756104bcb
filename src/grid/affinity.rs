use std::fmt;

use crate::core::entry::CacheObject;

/// Assigns keys to partitions and partitions to nodes.
pub trait Affinity: Send + Sync + fmt::Debug {
    fn partitions(&self) -> u32;

    fn partition(&self, key: &CacheObject) -> u32;

    // Primary first, then backups.
    fn owners(&self, partition: u32, nodes: &[String]) -> Vec<String>;

    fn owned_partitions(&self, node: &str, nodes: &[String]) -> Vec<u32> {
        (0..self.partitions())
            .filter(|p| self.owners(*p, nodes).iter().any(|owner| owner == node))
            .collect()
    }
}

/// Hashes keys onto partitions and spreads partitions round-robin over nodes.
#[derive(Debug, Clone)]
pub struct HashAffinity {
    partitions: u32,
    backups: u32,
}

impl HashAffinity {
    pub fn new(partitions: u32, backups: u32) -> Self {
        Self {
            partitions: std::cmp::max(partitions, 1),
            backups,
        }
    }
}

impl Affinity for HashAffinity {
    fn partitions(&self) -> u32 {
        self.partitions
    }

    fn partition(&self, key: &CacheObject) -> u32 {
        let mut h = crc32fast::Hasher::new();
        h.update(&[key.type_tag()]);
        h.update(key.bytes());
        h.finalize() % self.partitions
    }

    fn owners(&self, partition: u32, nodes: &[String]) -> Vec<String> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let copies = std::cmp::min(self.backups as usize + 1, nodes.len());
        (0..copies)
            .map(|i| nodes[(partition as usize + i) % nodes.len()].clone())
            .collect()
    }
}
