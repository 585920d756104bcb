//! Read access to a completed dump.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::common::{debug, info, Error, ErrorKind, Result};
use crate::core::entry::DumpEntry;
use crate::core::layout::{filepath, parse_partition_file_name, DumpLayout};
use crate::core::record::{self, MAX_RECORD_BYTES, MIN_RECORD_BYTES};
use crate::error::IoContext;
use crate::grid::CacheConfiguration;
use crate::marshaller::MappingFileStore;

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// A completed dump directory.
#[derive(Debug)]
pub struct Dump {
    layout: DumpLayout,
    nodes: Vec<String>,
    // node -> descriptors sorted by cache name.
    configs: BTreeMap<String, Vec<CacheConfiguration>>,
}

impl Dump {
    /// Open a dump. Fails when any node directory still carries the lock marker
    /// or when no node directory is left.
    pub fn open(dump_dir: impl Into<PathBuf>) -> Result<Self> {
        let layout = DumpLayout::from_dump_dir(dump_dir);
        let db_dir = layout.db_dir();

        let mut nodes = Vec::new();
        for entry in fs::read_dir(&db_dir).with_path(&db_dir)? {
            let entry = entry.with_path(&db_dir)?;
            if !entry.file_type().with_path(entry.path())?.is_dir() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name == filepath::MARSHALLER_DIR {
                continue;
            }
            if layout.lock_file(&name).exists() {
                return Err(ErrorKind::IncompleteDump { path: entry.path() }.into());
            }
            nodes.push(name);
        }
        nodes.sort();

        if nodes.is_empty() {
            return Err(Error::rejected(format!(
                "Dump has no node directories, it was discarded or never finished: {}",
                layout.dump_dir().display()
            )));
        }

        let mut configs = BTreeMap::new();
        for node in nodes.iter() {
            configs.insert(node.clone(), read_cache_configs(&layout.node_dir(node))?);
        }

        debug!(
            "Open dump {} [nodes={:?}]",
            layout.dump_dir().display(),
            nodes
        );

        Ok(Self {
            layout,
            nodes,
            configs,
        })
    }

    pub fn path(&self) -> &Path {
        self.layout.dump_dir()
    }

    pub fn name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn nodes_directories(&self) -> &[String] {
        &self.nodes
    }

    pub fn cache_configs(&self, node: &str) -> &[CacheConfiguration] {
        self.configs.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cache_config(&self, node: &str, group_id: i32) -> Option<&CacheConfiguration> {
        self.cache_configs(node)
            .iter()
            .find(|c| c.cache_id() == group_id)
    }

    /// Partitions with an artifact, ascending.
    pub fn partitions(&self, node: &str, group_id: i32) -> Result<Vec<u32>> {
        let config = self.group(node, group_id)?;
        let cache_dir = self.layout.cache_dir(node, &config.name);

        let mut partitions = Vec::new();
        for entry in fs::read_dir(&cache_dir).with_path(&cache_dir)? {
            let entry = entry.with_path(&cache_dir)?;
            if let Some((partition, _)) = entry
                .file_name()
                .to_str()
                .and_then(parse_partition_file_name)
            {
                partitions.push(partition);
            }
        }
        partitions.sort_unstable();
        partitions.dedup();
        Ok(partitions)
    }

    /// Entries of one partition in file order.
    /// A partition without artifact yields nothing.
    pub fn iterator(&self, node: &str, group_id: i32, partition: u32) -> Result<DumpIterator> {
        let config = self.group(node, group_id)?;

        let raw = self
            .layout
            .partition_file(node, &config.name, partition, false);
        if raw.exists() {
            return DumpIterator::open(raw, false);
        }
        let compressed = self
            .layout
            .partition_file(node, &config.name, partition, true);
        if compressed.exists() {
            return DumpIterator::open(compressed, true);
        }
        Ok(DumpIterator::empty(raw))
    }

    /// Type registry copied into the dump, if any.
    pub fn type_registry(&self) -> Option<MappingFileStore> {
        let dir = self.layout.marshaller_dir();
        if dir.is_dir() {
            Some(MappingFileStore::open(dir))
        } else {
            None
        }
    }

    fn group(&self, node: &str, group_id: i32) -> Result<&CacheConfiguration> {
        self.cache_config(node, group_id).ok_or_else(|| {
            Error::rejected(format!(
                "Unknown cache group [grpId={}, node={}]",
                group_id, node
            ))
        })
    }
}

fn read_cache_configs(node_dir: &Path) -> Result<Vec<CacheConfiguration>> {
    let mut configs = Vec::new();

    for entry in fs::read_dir(node_dir).with_path(node_dir)? {
        let entry = entry.with_path(node_dir)?;
        let is_cache_dir = entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with(filepath::CACHE_DIR_PREFIX))
            .unwrap_or(false);
        if !is_cache_dir || !entry.file_type().with_path(entry.path())?.is_dir() {
            continue;
        }

        let descriptor = entry.path().join(filepath::CACHE_DATA_FILENAME);
        let bytes = fs::read(&descriptor).with_path(&descriptor)?;
        let config: CacheConfiguration = serde_json::from_slice(&bytes).map_err(|err| {
            Error::corrupted(0, format!("invalid cache descriptor: {}", err)).located(&descriptor, 0)
        })?;
        configs.push(config);
    }

    configs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(configs)
}

/// Single pass sequence of the entries of one partition artifact.
///
/// After the first error the iterator is exhausted.
pub struct DumpIterator {
    path: PathBuf,
    source: Option<Box<dyn Read + Send>>,
    compressed: bool,
    // Offset of the next record in the decoded stream.
    offset: u64,
    buf: Vec<u8>,
}

impl DumpIterator {
    fn open(path: PathBuf, compressed: bool) -> Result<Self> {
        let f = File::open(&path).with_path(&path)?;
        let reader = BufReader::with_capacity(READ_BUFFER_BYTES, f);
        let source: Box<dyn Read + Send> = if compressed {
            Box::new(lz4_flex::frame::FrameDecoder::new(reader))
        } else {
            Box::new(reader)
        };

        Ok(Self {
            path,
            source: Some(source),
            compressed,
            offset: 0,
            buf: Vec::new(),
        })
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            source: None,
            compressed: false,
            offset: 0,
            buf: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Fill buf with the next record. Ok(false) at a clean end of stream.
    fn read_record(&mut self) -> Result<bool> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Ok(false),
        };

        let mut len = [0u8; 4];
        let n = read_full(source, &mut len).map_err(|err| self.read_error(err, 0))?;
        if n == 0 {
            return Ok(false);
        }
        if n < len.len() {
            return Err(Error::corrupted(0, "truncated record length").located(&self.path, self.offset));
        }

        let record_bytes = u32::from_be_bytes(len) as usize;
        if !(MIN_RECORD_BYTES..=MAX_RECORD_BYTES).contains(&record_bytes) {
            return Err(
                Error::corrupted(0, format!("invalid record length {}", record_bytes))
                    .located(&self.path, self.offset),
            );
        }

        self.buf.clear();
        self.buf.extend_from_slice(&len);
        self.buf.resize(record_bytes, 0);

        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Ok(false),
        };
        let res = source.read_exact(&mut self.buf[len.len()..]);
        res.map_err(|err| self.read_error(err, len.len() as u64))?;
        Ok(true)
    }

    fn read_error(&self, err: io::Error, record_offset: u64) -> Error {
        let from_codec = err
            .get_ref()
            .map(|inner| inner.is::<lz4_flex::frame::Error>())
            .unwrap_or(false);

        let corrupted = match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::corrupted(record_offset, "truncated record"),
            io::ErrorKind::InvalidData => Error::corrupted(record_offset, err.to_string()),
            _ if self.compressed && from_codec => {
                Error::corrupted(record_offset, format!("compressed stream: {}", err))
            }
            _ => return Error::io_path(&self.path, err),
        };
        corrupted.located(&self.path, self.offset)
    }
}

impl Iterator for DumpIterator {
    type Item = Result<DumpEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(false) => {
                self.source = None;
                None
            }
            Ok(true) => match record::decode(&self.buf) {
                Ok((n, entry)) => {
                    self.offset += n as u64;
                    Some(Ok(entry))
                }
                Err(err) => {
                    self.source = None;
                    Some(Err(err.located(&self.path, self.offset)))
                }
            },
            Err(err) => {
                self.source = None;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for DumpIterator {}

// Read until buf is full or the stream ends. Return read bytes.
fn read_full(src: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Receives the content of a dump from a [`DumpReader`].
pub trait DumpConsumer: Send + Sync {
    fn on_cache_configs(&self, _node: &str, _configs: &[CacheConfiguration]) -> Result<()> {
        Ok(())
    }

    /// Called once per partition artifact, possibly from several threads at once.
    fn on_partition(
        &self,
        node: &str,
        group: &CacheConfiguration,
        partition: u32,
        entries: DumpIterator,
    ) -> Result<()>;
}

/// Walks every partition of a dump with a bounded number of threads.
pub struct DumpReader {
    dump: Arc<Dump>,
    thread_count: usize,
}

impl DumpReader {
    pub fn new(dump: Dump, thread_count: usize) -> Self {
        Self {
            dump: Arc::new(dump),
            thread_count: std::cmp::max(thread_count, 1),
        }
    }

    pub fn dump(&self) -> &Dump {
        &self.dump
    }

    /// Feed every partition to consumer. Stops on the first error.
    /// Return number of visited partitions.
    pub async fn run(&self, consumer: Arc<dyn DumpConsumer>) -> Result<u64> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut running = JoinSet::new();

        let partitions = match self.schedule(&consumer, &stop, &mut running) {
            Ok(partitions) => partitions,
            Err(err) => {
                stop_all(&stop, &mut running).await;
                return Err(err);
            }
        };

        while let Some(res) = running.join_next().await {
            if let Err(err) = res.map_err(Error::from).and_then(|r| r) {
                stop_all(&stop, &mut running).await;
                return Err(err);
            }
        }

        info!(
            "Dump read [name={}, partitions={}]",
            self.dump.name(),
            partitions
        );
        Ok(partitions)
    }

    fn schedule(
        &self,
        consumer: &Arc<dyn DumpConsumer>,
        stop: &Arc<AtomicBool>,
        running: &mut JoinSet<Result<()>>,
    ) -> Result<u64> {
        let semaphore = Arc::new(Semaphore::new(self.thread_count));
        let mut partitions = 0;

        for node in self.dump.nodes_directories() {
            let configs = self.dump.cache_configs(node);
            consumer.on_cache_configs(node, configs)?;

            for config in configs {
                for partition in self.dump.partitions(node, config.cache_id())? {
                    partitions += 1;

                    let dump = Arc::clone(&self.dump);
                    let consumer = Arc::clone(consumer);
                    let semaphore = Arc::clone(&semaphore);
                    let stop = Arc::clone(stop);
                    let node = node.clone();
                    let config = config.clone();

                    running.spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| Error::from(ErrorKind::Internal(e.to_string())))?;
                        tokio::task::spawn_blocking(move || {
                            if stop.load(Ordering::SeqCst) {
                                return Ok(());
                            }
                            let entries = dump.iterator(&node, config.cache_id(), partition)?;
                            consumer.on_partition(&node, &config, partition, entries)
                        })
                        .await?
                    });
                }
            }
        }

        Ok(partitions)
    }
}

// Tasks not yet started skip their partition.
async fn stop_all(stop: &AtomicBool, running: &mut JoinSet<Result<()>>) {
    stop.store(true, Ordering::SeqCst);
    while running.join_next().await.is_some() {}
}
