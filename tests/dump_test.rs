use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;

use gridump::core::layout::parse_partition_file_name;
use gridump::core::record::HEADER_BYTES;
use gridump::core::{
    recover, Checker, Dump, DumpConsumer, DumpIterator, DumpLayout, DumpReader, DumpRequest,
    Orchestrator,
};
use gridump::grid::{
    cache_id, CacheConfiguration, Cluster, ConflictResolver, Resolution, StoredValue,
};
use gridump::marshaller::{MappingFileStore, ObjectRenderer, PLATFORM_DEFAULT};
use gridump::{CacheObject, CacheVersion, ErrorKind};

mod common;

use common::CACHE_NAME;

#[test]
fn dump_and_read_back() {
    common::init_tracing();

    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(2, 0, 1000);

        let summary = Orchestrator::new(root.path(), 4)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        assert_eq!(summary.entries, 1000);
        assert_eq!(summary.groups, vec![CACHE_NAME]);
        assert!(summary.skipped_groups.is_empty());
        assert!(summary.finished_at >= summary.started_at);

        let dump = Dump::open(&summary.path).unwrap();
        assert_eq!(dump.nodes_directories(), &["node-0", "node-1"]);
        assert_eq!(dump.cache_configs("node-0")[0].name, CACHE_NAME);

        let mut keys: Vec<i32> = common::read_all(&dump)
            .into_iter()
            .map(|(_, e)| {
                assert_eq!(e.key, e.value.clone().unwrap());
                e.key.as_i32().unwrap()
            })
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..1000).collect::<Vec<_>>());
    })
}

#[test]
fn empty_partitions_leave_no_artifact() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let cluster = Cluster::new(common::node_names(1));
        let cache = cluster
            .create_cache(CacheConfiguration::new(CACHE_NAME).with_partitions(16))
            .unwrap();
        for k in common::partition_keys(&cache, 3, 5, 0) {
            cache.put(CacheObject::int(k), CacheObject::int(k));
        }

        let summary = Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        let artifacts = common::artifacts(&summary.path);
        assert_eq!(artifacts.len(), 1);

        let dump = Dump::open(&summary.path).unwrap();
        let id = cache_id(CACHE_NAME);
        assert_eq!(dump.partitions("node-0", id).unwrap(), vec![3]);
        assert_eq!(dump.iterator("node-0", id, 0).unwrap().count(), 0);
        assert_eq!(dump.iterator("node-0", id, 3).unwrap().count(), 5);
    })
}

#[test]
fn reject_when_no_cache() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let dump_root = root.path().join("dumps");
        let cluster = Cluster::new(common::node_names(1));

        let err = Orchestrator::new(&dump_root, 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap_err();

        assert!(err.is_rejected());
        assert!(err.to_string().contains("No cache group defined in cluster"));
        assert!(!dump_root.exists());
    })
}

#[test]
fn unknown_groups_skipped() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(1, 0, 10);
        let orchestrator = Orchestrator::new(root.path(), 2);

        let summary = orchestrator
            .create_dump(
                &cluster,
                DumpRequest::new("dump").groups([CACHE_NAME, "non-existing-group"]),
            )
            .await
            .unwrap();
        assert_eq!(summary.groups, vec![CACHE_NAME]);
        assert_eq!(summary.skipped_groups, vec!["non-existing-group"]);
        assert_eq!(summary.entries, 10);

        let err = orchestrator
            .create_dump(
                &cluster,
                DumpRequest::new("dump2").groups(["non-existing-group"]),
            )
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert!(!root.path().join("dump2").exists());
    })
}

#[test]
fn duplicate_name_rejected() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(1, 0, 10);
        let orchestrator = Orchestrator::new(root.path(), 2);

        let summary = orchestrator
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();
        let err = orchestrator
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap_err();

        assert!(err.is_rejected());
        assert!(err.to_string().contains("Dump with the name already exists"));
        assert_eq!(common::read_all(&Dump::open(&summary.path).unwrap()).len(), 10);
    })
}

#[test]
fn unready_dump_cleared() {
    common::init_tracing();

    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(2, 0, 100);

        Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        // Crash while node-1 was still writing.
        let layout = DumpLayout::new(root.path(), "dump");
        fs::write(layout.lock_file("node-1"), b"").unwrap();

        let err = Dump::open(layout.dump_dir()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IncompleteDump { .. }));

        let report = recover(root.path()).unwrap();
        assert_eq!(report.discarded, vec![layout.node_dir("node-1")]);
        assert!(!layout.node_dir("node-1").exists());
        assert!(layout.node_dir("node-0").exists());

        assert!(recover(root.path()).unwrap().discarded.is_empty());

        let dump = Dump::open(layout.dump_dir()).unwrap();
        assert_eq!(dump.nodes_directories(), &["node-0"]);
    })
}

#[test]
fn cancelled_dump_is_recovered() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(1, 0, 100);

        let err = Orchestrator::new(root.path(), 1)
            .create_dump_until(&cluster, DumpRequest::new("dump"), async {})
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Cancelled { .. }));

        let layout = DumpLayout::new(root.path(), "dump");
        assert!(layout.lock_file("node-0").exists());
        assert!(Dump::open(layout.dump_dir()).is_err());

        let report = recover(root.path()).unwrap();
        assert_eq!(report.discarded, vec![layout.node_dir("node-0")]);
        assert_eq!(report.removed_dumps, vec![layout.dump_dir().to_path_buf()]);
        assert!(!layout.dump_dir().exists());

        // The name is free again.
        let summary = Orchestrator::new(root.path(), 1)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();
        let dump = Dump::open(&summary.path).unwrap();
        assert_eq!(common::read_all(&dump).len(), 100);
    })
}

#[test]
fn dump_without_nodes_rejected() {
    let root = common::temp_dir();
    let layout = DumpLayout::new(root.path(), "dump");
    fs::create_dir_all(layout.marshaller_dir()).unwrap();

    let err = Dump::open(layout.dump_dir()).unwrap_err();
    assert!(err.is_rejected());
}

#[test]
fn corrupted_record_detected() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(1, 0, 100);

        let summary = Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump").compress(false))
            .await
            .unwrap();

        let artifacts = common::artifacts(&summary.path);
        let corrupted = artifacts[0].clone();
        let (corrupted_part, compressed) = parse_partition_file_name(
            corrupted.file_name().unwrap().to_str().unwrap(),
        )
        .unwrap();
        assert!(!compressed);

        let mut bytes = fs::read(&corrupted).unwrap();
        for b in bytes[HEADER_BYTES..HEADER_BYTES + 5].iter_mut() {
            *b ^= 0xff;
        }
        fs::write(&corrupted, bytes).unwrap();

        let dump = Dump::open(&summary.path).unwrap();
        let id = cache_id(CACHE_NAME);

        let mut it = dump.iterator("node-0", id, corrupted_part).unwrap();
        let err = it.next().unwrap().unwrap_err();
        assert!(err.is_data_corrupted());
        match err.kind() {
            ErrorKind::DataCorrupted { path, offset, .. } => {
                assert_eq!(path.as_deref(), Some(corrupted.as_path()));
                assert_eq!(*offset, 0);
            }
            kind => panic!("unexpected {:?}", kind),
        }
        assert!(it.next().is_none());

        let mut intact = 0;
        for part in dump.partitions("node-0", id).unwrap() {
            if part == corrupted_part {
                continue;
            }
            for entry in dump.iterator("node-0", id, part).unwrap() {
                entry.unwrap();
                intact += 1;
            }
        }
        assert!(intact > 0);
    })
}

#[test]
fn check_clean_dump() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(3, 1, 200);

        let summary = Orchestrator::new(root.path(), 4)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        let report = Checker::new(4)
            .check(Dump::open(&summary.path).unwrap())
            .await
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.partitions, 8);
        assert_eq!(
            report.to_string(),
            "The check procedure has finished, no conflicts have been found.\n\n"
        );
    })
}

#[test]
fn check_finds_diverged_backup() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, cache) = common::cluster_with_keys(2, 1, 100);

        let corrupted_part = 1;
        let corrupted_key = common::partition_keys(&cache, corrupted_part, 1, 0)[0];
        let key = CacheObject::int(corrupted_key);
        cache.put(key.clone(), CacheObject::int(corrupted_key));

        // Same version, different value on the backup only.
        let owners = cache.affinity().owners(corrupted_part, cluster.nodes());
        let backup = cache.local_partition(&owners[1], corrupted_part).unwrap();
        let stored = backup.get(&key).unwrap();
        backup.put(
            key,
            StoredValue {
                value: CacheObject::int(corrupted_key + 1),
                ..stored
            },
        );

        let summary = Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();
        let report = Checker::new(2)
            .check(Dump::open(&summary.path).unwrap())
            .await
            .unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.conflicts.len(), 1);

        let out = report.to_string();
        assert!(out.contains(&format!(
            "Conflict partition: PartitionKey [grpId={}, grpName={}, partId={}]",
            cache_id(CACHE_NAME),
            CACHE_NAME,
            corrupted_part
        )));
        assert_eq!(out.matches("partVerHash=").count(), 2);

        let copies = &report.conflicts[0].copies;
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[0].1.part_ver_hash, copies[1].1.part_ver_hash);
        assert_ne!(copies[0].1.part_hash, copies[1].1.part_hash);
    })
}

#[test]
fn raw_and_compressed_hold_same_entries() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let cluster = Cluster::new(common::node_names(1));
        let cache = cluster
            .create_cache(CacheConfiguration::new(CACHE_NAME).with_partitions(4))
            .unwrap();
        for i in 0..1000 {
            cache.put(
                CacheObject::int(i),
                CacheObject::string(format!("{}{}", "value-".repeat(10), i)),
            );
        }

        let orchestrator = Orchestrator::new(root.path(), 2);
        let raw = orchestrator
            .create_dump(&cluster, DumpRequest::new("raw").compress(false))
            .await
            .unwrap();
        let zip = orchestrator
            .create_dump(&cluster, DumpRequest::new("zip").compress(true))
            .await
            .unwrap();

        let raw_files = common::artifacts(&raw.path);
        let zip_files = common::artifacts(&zip.path);
        assert!(raw_files.iter().all(|p| p.to_string_lossy().ends_with(".dump")));
        assert!(zip_files.iter().all(|p| p.to_string_lossy().ends_with(".dump.zip")));
        assert!(common::total_size(&zip_files) < common::total_size(&raw_files));

        let mut raw_entries: Vec<_> = common::read_all(&Dump::open(&raw.path).unwrap())
            .into_iter()
            .map(|(_, e)| e)
            .collect();
        let mut zip_entries: Vec<_> = common::read_all(&Dump::open(&zip.path).unwrap())
            .into_iter()
            .map(|(_, e)| e)
            .collect();
        raw_entries.sort_by(|a, b| a.key.cmp(&b.key));
        zip_entries.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(raw_entries.len(), 1000);
        assert_eq!(raw_entries, zip_entries);

        let report = Checker::new(2)
            .compare(
                Dump::open(&raw.path).unwrap(),
                Dump::open(&zip.path).unwrap(),
            )
            .await
            .unwrap();
        assert!(report.is_clean());
    })
}

#[test]
fn conflict_versions_preserved() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, cache) = common::cluster_with_keys(1, 0, 0);

        for k in 0..100 {
            cache.put_conflict(
                CacheObject::int(k),
                CacheObject::int(k),
                CacheVersion::new(42, k as u64, 13, 31),
            );
        }

        let summary = Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        let entries = common::read_all(&Dump::open(&summary.path).unwrap());
        assert_eq!(entries.len(), 100);
        for (_, entry) in entries {
            let k = entry.key.as_i32().unwrap();
            assert_eq!(
                entry.conflict_version,
                Some(CacheVersion::new(42, k as u64, 13, 31))
            );
        }
    })
}

#[test]
fn expire_time_preserved() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, cache) = common::cluster_with_keys(1, 0, 0);
        cache.put_expiring(CacheObject::int(1), CacheObject::int(1), 1_700_000_000_000);
        cache.put(CacheObject::int(2), CacheObject::int(2));

        let summary = Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        let mut entries: Vec<_> = common::read_all(&Dump::open(&summary.path).unwrap())
            .into_iter()
            .map(|(_, e)| (e.key.as_i32().unwrap(), e.expire_time))
            .collect();
        entries.sort();
        assert_eq!(entries, vec![(1, Some(1_700_000_000_000)), (2, None)]);
    })
}

#[test]
fn no_duplicates_under_concurrent_writes() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, cache) = common::cluster_with_keys(1, 0, 1000);

        let stop = Arc::new(AtomicBool::new(false));
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    while !stop.load(Ordering::Relaxed) {
                        let k = rng.gen_range(0..2000);
                        if k >= 1000 && rng.gen_bool(0.3) {
                            cache.remove(&CacheObject::int(k));
                        } else {
                            cache.put(CacheObject::int(k), CacheObject::int(rng.gen()));
                        }
                    }
                })
            })
            .collect();

        let summary = Orchestrator::new(root.path(), 4)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        stop.store(true, Ordering::Relaxed);
        for w in writers {
            w.join().unwrap();
        }

        let entries = common::read_all(&Dump::open(&summary.path).unwrap());
        let mut seen = BTreeSet::new();
        for (_, entry) in entries.iter() {
            let k = entry.key.as_i32().unwrap();
            assert!(seen.insert(k), "key {} dumped twice", k);
            assert!((0..2000).contains(&k));
            assert_eq!(entry.partition, cache.partition_of(&entry.key));
        }
        assert!((0..1000).all(|k| seen.contains(&k)));
        assert_eq!(summary.entries, entries.len() as u64);
    })
}

#[test]
fn compare_with_live_cluster() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, cache) = common::cluster_with_keys(2, 1, 100);

        let summary = Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        let checker = Checker::new(2);
        let report = checker
            .compare_with_live(Dump::open(&summary.path).unwrap(), &cluster)
            .await
            .unwrap();
        assert!(report.is_clean());

        cache.put(CacheObject::int(5), CacheObject::int(500));
        let report = checker
            .compare_with_live(Dump::open(&summary.path).unwrap(), &cluster)
            .await
            .unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(
            report.conflicts[0].key.partition,
            cache.partition_of(&CacheObject::int(5))
        );
    })
}

#[test]
fn type_registry_copied_into_dump() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let work = common::temp_dir();
        let registry = MappingFileStore::with_work_dir(work.path()).unwrap();
        registry
            .write_mapping(PLATFORM_DEFAULT, 77, "org.example.User")
            .unwrap();

        let (cluster, cache) = common::cluster_with_keys(1, 0, 0);
        cache.put(CacheObject::int(1), CacheObject::binary(77, &[1, 2, 3]));

        let summary = Orchestrator::new(root.path(), 2)
            .with_registry(registry)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        let dump = Dump::open(&summary.path).unwrap();
        assert_eq!(dump.nodes_directories(), &["node-0"]);

        let copied = dump.type_registry().unwrap();
        assert_eq!(
            copied.type_name(PLATFORM_DEFAULT, 77).unwrap(),
            "org.example.User"
        );

        let (_, entry) = common::read_all(&dump).remove(0);
        let rendered = ObjectRenderer::new(Some(&copied))
            .render(entry.value.as_ref().unwrap())
            .unwrap();
        assert_eq!(rendered["type"], "org.example.User");
    })
}

#[derive(Default)]
struct CountingConsumer {
    configs: AtomicU64,
    entries: AtomicU64,
}

impl DumpConsumer for CountingConsumer {
    fn on_cache_configs(&self, _node: &str, configs: &[CacheConfiguration]) -> gridump::Result<()> {
        self.configs.fetch_add(configs.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    fn on_partition(
        &self,
        _node: &str,
        _group: &CacheConfiguration,
        _partition: u32,
        entries: DumpIterator,
    ) -> gridump::Result<()> {
        for entry in entries {
            entry?;
            self.entries.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[test]
fn dump_reader_visits_every_partition() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(2, 1, 100);

        let summary = Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();
        let artifacts = common::artifacts(&summary.path);

        let consumer = Arc::new(CountingConsumer::default());
        let reader = DumpReader::new(Dump::open(&summary.path).unwrap(), 3);
        let partitions = reader
            .run(Arc::clone(&consumer) as Arc<dyn DumpConsumer>)
            .await
            .unwrap();

        assert_eq!(partitions, artifacts.len() as u64);
        assert_eq!(consumer.configs.load(Ordering::SeqCst), 2);
        // Every key is held by a primary and a backup.
        assert_eq!(consumer.entries.load(Ordering::SeqCst), 200);

        let mut bytes = fs::read(&artifacts[0]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&artifacts[0], bytes).unwrap();

        let err = DumpReader::new(Dump::open(&summary.path).unwrap(), 3)
            .run(Arc::new(CountingConsumer::default()))
            .await
            .unwrap_err();
        assert!(err.is_data_corrupted());
    })
}

// Fails on the configs of the second node while first-node partitions are in flight.
#[derive(Default)]
struct FailingConsumer {
    active: AtomicU64,
    visited: AtomicU64,
}

impl DumpConsumer for FailingConsumer {
    fn on_cache_configs(&self, node: &str, _configs: &[CacheConfiguration]) -> gridump::Result<()> {
        if node == "node-1" {
            return Err(ErrorKind::Internal("consumer refused node-1".into()).into());
        }
        Ok(())
    }

    fn on_partition(
        &self,
        _node: &str,
        _group: &CacheConfiguration,
        _partition: u32,
        entries: DumpIterator,
    ) -> gridump::Result<()> {
        self.active.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        let n = entries.count() as u64;
        self.visited.fetch_add(n, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn dump_reader_waits_for_started_partitions_on_error() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let (cluster, _cache) = common::cluster_with_keys(2, 1, 100);

        let summary = Orchestrator::new(root.path(), 2)
            .create_dump(&cluster, DumpRequest::new("dump"))
            .await
            .unwrap();

        let consumer = Arc::new(FailingConsumer::default());
        let err = DumpReader::new(Dump::open(&summary.path).unwrap(), 2)
            .run(Arc::clone(&consumer) as Arc<dyn DumpConsumer>)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Internal(_)));

        assert_eq!(consumer.active.load(Ordering::SeqCst), 0);
        let visited = consumer.visited.load(Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(consumer.visited.load(Ordering::SeqCst), visited);
    })
}

// Prefers the write from the data center with the lower cluster id.
#[derive(Debug)]
struct LowestClusterWins;

impl ConflictResolver for LowestClusterWins {
    fn resolve(&self, _key: &CacheObject, old: &StoredValue, new: &StoredValue) -> Resolution {
        if new.effective_version().cluster_id < old.effective_version().cluster_id {
            Resolution::UseNew
        } else {
            Resolution::UseOld
        }
    }
}

#[test]
fn conflicting_data_center_writes() {
    tokio_test::block_on(async move {
        let root = common::temp_dir();
        let east = CacheVersion::new(1, 10, 1, 2);
        let west = CacheVersion::new(1, 10, 1, 3);
        let key = CacheObject::int(7);
        let value = CacheObject::string("same-value");

        // Default resolver keeps the greater version.
        let greatest = Cluster::builder().nodes(["node-0"]).cluster_id(1).build();
        let cache = greatest.create_cache(CacheConfiguration::new(CACHE_NAME)).unwrap();
        cache.put_conflict(key.clone(), value.clone(), east);
        cache.put_conflict(key.clone(), value.clone(), west);

        // Same writes in reverse order, resolved towards the lower cluster id.
        let lowest = Cluster::builder()
            .nodes(["node-0"])
            .cluster_id(1)
            .resolver(Arc::new(LowestClusterWins))
            .build();
        let cache = lowest.create_cache(CacheConfiguration::new(CACHE_NAME)).unwrap();
        cache.put_conflict(key.clone(), value.clone(), west);
        cache.put_conflict(key.clone(), value.clone(), east);

        let orchestrator = Orchestrator::new(root.path(), 2);
        let first = orchestrator
            .create_dump(&greatest, DumpRequest::new("greatest"))
            .await
            .unwrap();
        let second = orchestrator
            .create_dump(&lowest, DumpRequest::new("lowest"))
            .await
            .unwrap();

        let first = Dump::open(&first.path).unwrap();
        let second = Dump::open(&second.path).unwrap();

        let (_, kept) = common::read_all(&first).remove(0);
        assert_eq!(kept.key, key);
        assert_eq!(kept.conflict_version, Some(west));
        let (_, kept) = common::read_all(&second).remove(0);
        assert_eq!(kept.conflict_version, Some(east));

        let checker = Checker::new(2);
        assert!(checker
            .compare_with_live(Dump::open(first.path()).unwrap(), &greatest)
            .await
            .unwrap()
            .is_clean());

        let report = checker.compare(first, second).await.unwrap();
        assert_eq!(report.conflicts.len(), 1);
        let conflict = &report.conflicts[0];
        assert_eq!(conflict.key.group_id, cache_id(CACHE_NAME));
        assert_eq!(conflict.key.partition, cache.partition_of(&key));

        let left = conflict.copies[0].1;
        let right = conflict.copies[1].1;
        assert_eq!(left.part_hash, right.part_hash);
        assert_ne!(left.part_ver_hash, right.part_ver_hash);
        assert_eq!(left.size, 1);
        assert_eq!(right.size, 1);
    })
}
