#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gridump::core::Dump;
use gridump::grid::{CacheConfiguration, Cluster, GridCache};
use gridump::{CacheObject, DumpEntry};

pub const CACHE_NAME: &str = "cache-a";

pub fn temp_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(gridump::config::env::LOG_DIRECTIVE)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

pub fn node_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("node-{}", i)).collect()
}

/// Cluster of n nodes with one integer cache of 0..keys.
pub fn cluster_with_keys(nodes: usize, backups: u32, keys: i32) -> (Cluster, Arc<GridCache>) {
    let cluster = Cluster::new(node_names(nodes));
    let cache = cluster
        .create_cache(
            CacheConfiguration::new(CACHE_NAME)
                .with_partitions(8)
                .with_backups(backups),
        )
        .unwrap();
    for i in 0..keys {
        cache.put(CacheObject::int(i), CacheObject::int(i));
    }
    (cluster, cache)
}

/// First count integer keys, after skip, that map to partition.
pub fn partition_keys(cache: &GridCache, partition: u32, count: usize, skip: i32) -> Vec<i32> {
    (skip..)
        .filter(|k| cache.partition_of(&CacheObject::int(*k)) == partition)
        .take(count)
        .collect()
}

/// Every entry of every node, group and partition.
pub fn read_all(dump: &Dump) -> Vec<(String, DumpEntry)> {
    let mut entries = Vec::new();
    for node in dump.nodes_directories() {
        for config in dump.cache_configs(node) {
            for part in dump.partitions(node, config.cache_id()).unwrap() {
                for entry in dump.iterator(node, config.cache_id(), part).unwrap() {
                    entries.push((node.clone(), entry.unwrap()));
                }
            }
        }
    }
    entries
}

/// Partition artifacts below dir.
pub fn artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            found.extend(artifacts(&path));
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with("part-"))
        {
            found.push(path);
        }
    }
    found.sort();
    found
}

pub fn total_size(paths: &[PathBuf]) -> u64 {
    paths.iter().map(|p| fs::metadata(p).unwrap().len()).sum()
}
