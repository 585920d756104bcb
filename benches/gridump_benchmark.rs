use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use gridump::core::{record, Dump, DumpRequest, Orchestrator};
use gridump::grid::{CacheConfiguration, Cluster};
use gridump::{CacheObject, CacheVersion, DumpEntry};

pub fn codec(c: &mut Criterion) {
    const NUM_ENTRY: i32 = 1000;

    let entries = (0..NUM_ENTRY)
        .map(|i| {
            DumpEntry::new(
                1,
                0,
                CacheObject::string(format!("key-{}", i)),
                CacheObject::byte_array(vec![i as u8; 128]),
                CacheVersion::new(1, i as u64, 1, 0),
            )
        })
        .collect::<Vec<DumpEntry>>();

    c.bench_function("encode", |b| {
        let mut buf = Vec::with_capacity(1024 * 256);
        b.iter(|| {
            buf.clear();
            for entry in entries.iter() {
                record::encode_to(entry, &mut buf).unwrap();
            }
        });
    });

    let mut encoded = Vec::new();
    for entry in entries.iter() {
        record::encode_to(entry, &mut encoded).unwrap();
    }

    c.bench_function("decode", |b| {
        b.iter(|| {
            let mut src = encoded.as_slice();
            while !src.is_empty() {
                let (n, _) = record::decode(src).unwrap();
                src = &src[n..];
            }
        });
    });
}

pub fn dump(c: &mut Criterion) {
    const NUM_KEY: i32 = 10_000;

    let rt = rt();
    let cluster = Cluster::new(["node-0"]);
    let cache = cluster
        .create_cache(CacheConfiguration::new("bench").with_partitions(16))
        .unwrap();
    for i in 0..NUM_KEY {
        cache.put(
            CacheObject::int(i),
            CacheObject::string(format!("value-{}", i)),
        );
    }

    for compress in [false, true] {
        let name = if compress { "dump_compressed" } else { "dump_raw" };

        c.bench_function(name, |b| {
            b.iter_batched(
                || tempfile::tempdir().unwrap(),
                |root| {
                    rt.block_on(async {
                        let summary = Orchestrator::new(root.path(), num_cpus::get())
                            .create_dump(&cluster, DumpRequest::new("bench").compress(compress))
                            .await
                            .unwrap();

                        let dump = Dump::open(&summary.path).unwrap();
                        for node in dump.nodes_directories() {
                            for config in dump.cache_configs(node) {
                                for part in dump.partitions(node, config.cache_id()).unwrap() {
                                    for entry in dump.iterator(node, config.cache_id(), part).unwrap() {
                                        entry.unwrap();
                                    }
                                }
                            }
                        }
                    });
                    root
                },
                BatchSize::PerIteration,
            );
        });
    }
}

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

criterion_group!(benches, codec, dump);
criterion_main!(benches);
