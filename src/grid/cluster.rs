use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{info, ErrorKind, Result};
use crate::grid::affinity::{Affinity, HashAffinity};
use crate::grid::cache::{CacheConfiguration, GridCache, VersionSource};
use crate::grid::resolver::{ConflictResolver, VersionConflictResolver};

/// In-process view of the cluster: member nodes and the caches spread over them.
pub struct Cluster {
    // Consistent ids in join order.
    nodes: Vec<String>,
    versions: Arc<VersionSource>,
    resolver: Arc<dyn ConflictResolver>,
    caches: RwLock<BTreeMap<String, Arc<GridCache>>>,
}

impl Cluster {
    pub const DEFAULT_TOPOLOGY_VERSION: u32 = 1;

    pub fn new<S: Into<String>>(nodes: impl IntoIterator<Item = S>) -> Self {
        Cluster::builder().nodes(nodes).build()
    }

    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::default()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn create_cache(&self, config: CacheConfiguration) -> Result<Arc<GridCache>> {
        let affinity = Arc::new(HashAffinity::new(config.partitions, config.backups));
        self.create_cache_with_affinity(config, affinity)
    }

    pub fn create_cache_with_affinity(
        &self,
        config: CacheConfiguration,
        affinity: Arc<dyn Affinity>,
    ) -> Result<Arc<GridCache>> {
        let mut caches = self.caches.write();
        if caches.contains_key(&config.name) {
            return Err(ErrorKind::Internal(format!("cache {} already exists", config.name)).into());
        }

        info!(
            "Create cache {} partitions={} backups={}",
            config.name, config.partitions, config.backups
        );

        let name = config.name.clone();
        let cache = Arc::new(GridCache::new(
            config,
            affinity,
            self.nodes.clone(),
            Arc::clone(&self.versions),
            Arc::clone(&self.resolver),
        ));
        caches.insert(name, Arc::clone(&cache));

        Ok(cache)
    }

    pub fn destroy_cache(&self, name: &str) -> Option<Arc<GridCache>> {
        self.caches.write().remove(name)
    }

    pub fn cache(&self, name: &str) -> Option<Arc<GridCache>> {
        self.caches.read().get(name).cloned()
    }

    // Ordered by name.
    pub fn caches(&self) -> Vec<Arc<GridCache>> {
        self.caches.read().values().cloned().collect()
    }
}

#[derive(Default)]
pub struct ClusterBuilder {
    nodes: Vec<String>,
    topology_version: Option<u32>,
    cluster_id: u8,
    resolver: Option<Arc<dyn ConflictResolver>>,
}

impl ClusterBuilder {
    pub fn nodes<S: Into<String>>(mut self, nodes: impl IntoIterator<Item = S>) -> Self {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn topology_version(mut self, topology_version: u32) -> Self {
        self.topology_version = Some(topology_version);
        self
    }

    pub fn cluster_id(mut self, cluster_id: u8) -> Self {
        self.cluster_id = cluster_id;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Cluster {
        Cluster {
            nodes: self.nodes,
            versions: Arc::new(VersionSource::new(
                self.topology_version
                    .unwrap_or(Cluster::DEFAULT_TOPOLOGY_VERSION),
                self.cluster_id,
            )),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(VersionConflictResolver)),
            caches: RwLock::new(BTreeMap::new()),
        }
    }
}
