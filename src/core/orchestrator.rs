use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing_futures::Instrument;

use crate::common::{debug, error, info, warn, Error, ErrorKind, Result, Time};
use crate::core::layout::DumpLayout;
use crate::core::lock::StripedLock;
use crate::core::writer::{PartitionWriter, WriterStats};
use crate::error::IoContext;
use crate::grid::{Cluster, GridCache, Partition};
use crate::marshaller::MappingFileStore;

/// What to dump.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    pub name: String,
    // None means every cache of the cluster.
    pub groups: Option<Vec<String>>,
    // None falls back to the orchestrator default.
    pub compress: Option<bool>,
}

impl DumpRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: None,
            compress: None,
        }
    }

    pub fn groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }
}

/// Outcome of a finished dump.
#[derive(Debug, Clone)]
pub struct DumpSummary {
    pub name: String,
    pub path: PathBuf,
    pub nodes: Vec<String>,
    pub groups: Vec<String>,
    // Requested but unknown groups.
    pub skipped_groups: Vec<String>,
    pub partitions: u64,
    pub entries: u64,
    pub started_at: Time,
    pub finished_at: Time,
}

/// Creates dumps of cluster caches.
///
/// Every node directory carries a lock marker until all of its partitions are closed.
/// A failed or cancelled creation leaves the markers behind for crash recovery.
pub struct Orchestrator {
    root_dir: PathBuf,
    thread_count: usize,
    compress: bool,
    locks: Arc<StripedLock>,
    registry: Option<MappingFileStore>,
}

impl Orchestrator {
    pub fn new(root_dir: impl Into<PathBuf>, thread_count: usize) -> Self {
        Self {
            root_dir: root_dir.into(),
            thread_count: std::cmp::max(thread_count, 1),
            compress: false,
            locks: Arc::new(StripedLock::default()),
            registry: None,
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    // Type mappings are copied into every dump.
    pub fn with_registry(mut self, registry: MappingFileStore) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub async fn create_dump(&self, cluster: &Cluster, request: DumpRequest) -> Result<DumpSummary> {
        self.create_dump_until(cluster, request, std::future::pending::<()>())
            .await
    }

    /// Create a dump, giving up when cancel completes first.
    pub async fn create_dump_until(
        &self,
        cluster: &Cluster,
        request: DumpRequest,
        cancel: impl Future<Output = ()>,
    ) -> Result<DumpSummary> {
        let span = tracing::info_span!("dump", name = %request.name);
        self.create(cluster, request, cancel).instrument(span).await
    }

    async fn create(
        &self,
        cluster: &Cluster,
        request: DumpRequest,
        cancel: impl Future<Output = ()>,
    ) -> Result<DumpSummary> {
        let started_at = Utc::now();

        validate_name(&request.name)?;
        let (groups, skipped_groups) = resolve_groups(cluster, &request)?;

        let layout = DumpLayout::new(&self.root_dir, &request.name);
        let compress = request.compress.unwrap_or(self.compress);

        let tasks = self.plan(cluster, &groups, &layout, &request.name, compress);
        let mut nodes: Vec<String> = Vec::new();
        for task in tasks.iter() {
            if !nodes.contains(&task.node) {
                nodes.push(task.node.clone());
            }
        }
        if nodes.is_empty() {
            return Err(Error::rejected("No node owns a partition of the requested caches"));
        }

        info!(
            "Start dump [name={}, groups={:?}, nodes={:?}, partitions={}, compress={}]",
            request.name,
            groups.iter().map(|g| g.name()).collect::<Vec<_>>(),
            nodes,
            tasks.len(),
            compress
        );

        self.prepare_dirs(&layout, &nodes, &groups)?;

        if let Some(registry) = &self.registry {
            registry.copy_to(&layout.marshaller_dir())?;
        }

        let partitions = tasks.len() as u64;
        let entries = self.run_tasks(tasks, &request.name, cancel).await?;

        for node in nodes.iter() {
            self.unlock(&layout, node)?;
        }

        let finished_at = Utc::now();
        info!(
            "Dump created [name={}, partitions={}, entries={}, elapsed={}ms]",
            request.name,
            partitions,
            entries,
            (finished_at - started_at).num_milliseconds()
        );

        Ok(DumpSummary {
            name: request.name,
            path: layout.dump_dir().to_path_buf(),
            nodes,
            groups: groups.iter().map(|g| g.name().to_owned()).collect(),
            skipped_groups,
            partitions,
            entries,
            started_at,
            finished_at,
        })
    }

    fn plan(
        &self,
        cluster: &Cluster,
        groups: &[Arc<GridCache>],
        layout: &DumpLayout,
        name: &str,
        compress: bool,
    ) -> Vec<PartitionTask> {
        let nodes = cluster.nodes();
        let mut tasks = Vec::new();

        for node in nodes {
            for cache in groups {
                for p in cache.affinity().owned_partitions(node, nodes) {
                    let partition = match cache.local_partition(node, p) {
                        Some(partition) => partition,
                        None => continue,
                    };
                    tasks.push(PartitionTask {
                        dump_name: name.to_owned(),
                        node: node.clone(),
                        path: layout.partition_file(node, cache.name(), p, compress),
                        compress,
                        partition,
                        locks: Arc::clone(&self.locks),
                    });
                }
            }
        }
        tasks
    }

    fn prepare_dirs(
        &self,
        layout: &DumpLayout,
        nodes: &[String],
        groups: &[Arc<GridCache>],
    ) -> Result<()> {
        let dump_dir = layout.dump_dir();
        let _guard = self.locks.lock(dump_dir);

        fs::create_dir_all(&self.root_dir).with_path(&self.root_dir)?;
        match fs::create_dir(dump_dir) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Error::rejected(format!(
                    "Dump with the name already exists [name={}, path={}]",
                    dump_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    dump_dir.display()
                )));
            }
            Err(err) => return Err(Error::io_path(dump_dir, err)),
        }

        for node in nodes {
            let node_dir = layout.node_dir(node);
            fs::create_dir_all(&node_dir).with_path(&node_dir)?;

            let lock_file = layout.lock_file(node);
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_file)
                .with_path(&lock_file)?;

            for cache in groups {
                let cache_dir = layout.cache_dir(node, cache.name());
                fs::create_dir_all(&cache_dir).with_path(&cache_dir)?;

                let descriptor = layout.cache_data_file(node, cache.name());
                let config = serde_json::to_vec_pretty(cache.config())?;
                fs::write(&descriptor, config).with_path(&descriptor)?;
            }
        }
        Ok(())
    }

    fn unlock(&self, layout: &DumpLayout, node: &str) -> Result<()> {
        let lock_file = layout.lock_file(node);
        let _guard = self.locks.lock(&layout.node_dir(node));
        fs::remove_file(&lock_file).with_path(&lock_file)
    }

    // Return number of written entries.
    async fn run_tasks(
        &self,
        tasks: Vec<PartitionTask>,
        name: &str,
        cancel: impl Future<Output = ()>,
    ) -> Result<u64> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(Semaphore::new(self.thread_count));
        let mut running = JoinSet::new();

        for task in tasks {
            let semaphore = Arc::clone(&semaphore);
            let cancelled = Arc::clone(&cancelled);
            running.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::from(ErrorKind::Internal(e.to_string())))?;
                tokio::task::spawn_blocking(move || task.run(&cancelled)).await?
            });
        }

        let outcome = tokio::select! {
            res = join_all(&mut running) => Some(res),
            _ = cancel => None,
        };

        match outcome {
            Some(Ok(entries)) => Ok(entries),
            Some(Err(err)) => {
                cancelled.store(true, Ordering::SeqCst);
                drain(&mut running).await;
                error!("Dump failed, directory stays locked [name={}]: {}", name, err);
                Err(err)
            }
            None => {
                cancelled.store(true, Ordering::SeqCst);
                drain(&mut running).await;
                warn!("Dump cancelled, directory stays locked [name={}]", name);
                Err(ErrorKind::Cancelled {
                    name: name.to_owned(),
                }
                .into())
            }
        }
    }
}

async fn join_all(running: &mut JoinSet<Result<WriterStats>>) -> Result<u64> {
    let mut entries = 0;
    while let Some(res) = running.join_next().await {
        entries += res??.entries;
    }
    Ok(entries)
}

async fn drain(running: &mut JoinSet<Result<WriterStats>>) {
    while running.join_next().await.is_some() {}
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::rejected(format!("Invalid dump name [name={}]", name)));
    }
    Ok(())
}

fn resolve_groups(
    cluster: &Cluster,
    request: &DumpRequest,
) -> Result<(Vec<Arc<GridCache>>, Vec<String>)> {
    let mut skipped = Vec::new();

    let groups = match &request.groups {
        None => cluster.caches(),
        Some(names) => {
            let mut found: Vec<Arc<GridCache>> = Vec::new();
            for name in names {
                match cluster.cache(name) {
                    Some(cache) => {
                        if !found.iter().any(|c| c.name() == cache.name()) {
                            found.push(cache);
                        }
                    }
                    None => skipped.push(name.clone()),
                }
            }
            found
        }
    };

    if !skipped.is_empty() {
        warn!(
            "Unknown cache groups will not be included in snapshot [grps={:?}]",
            skipped
        );
    }

    if groups.is_empty() {
        return Err(Error::rejected(match request.groups {
            None => "No cache group defined in cluster",
            Some(_) => "None of the requested cache groups exist",
        }));
    }

    Ok((groups, skipped))
}

// Capture of one partition copy into one artifact.
struct PartitionTask {
    dump_name: String,
    node: String,
    path: PathBuf,
    compress: bool,
    partition: Arc<Partition>,
    locks: Arc<StripedLock>,
}

impl PartitionTask {
    fn run(self, cancelled: &AtomicBool) -> Result<WriterStats> {
        let mut writer = PartitionWriter::open(&self.path, self.compress, Arc::clone(&self.locks));

        let res = self.drain(&mut writer, cancelled).and_then(|_| writer.close());
        match res {
            Ok(stats) => {
                debug!(
                    "Partition dumped [node={}, cacheId={}, part={}, entries={}, bytes={}]",
                    self.node,
                    self.partition.cache_id(),
                    self.partition.id(),
                    stats.entries,
                    stats.record_bytes
                );
                Ok(stats)
            }
            Err(err) => {
                if !matches!(err.kind(), ErrorKind::Cancelled { .. }) {
                    if let Err(discard_err) = writer.discard() {
                        warn!("Failed to remove partial artifact: {}", discard_err);
                    }
                }
                Err(err)
            }
        }
    }

    fn drain(&self, writer: &mut PartitionWriter, cancelled: &AtomicBool) -> Result<()> {
        let mut capture = self.partition.capture();

        for entry in capture.by_ref() {
            if cancelled.load(Ordering::SeqCst) {
                return Err(ErrorKind::Cancelled {
                    name: self.dump_name.clone(),
                }
                .into());
            }
            writer.append(&entry)?;
        }

        for entry in capture.finish() {
            writer.append(&entry)?;
        }
        Ok(())
    }
}
