//! Performance benchmarks for store writes and snapshot merges

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use readsync::storage::queries::*;
use readsync::sync::merge_snapshot;
use readsync::types::*;
use readsync::Storage;

fn record(i: usize, timestamp: i64, device: &str) -> ProgressRecord {
    ProgressRecord::new(
        format!("doc-{:06}", i),
        (i % 500).to_string(),
        (i % 100) as f64 / 100.0,
        timestamp,
        device,
        device,
    )
}

fn fill(path: &Path, count: usize, timestamp: i64, device: &str) -> Storage {
    let storage = Storage::open_path(path.to_str().unwrap(), StorageMode::CloudSafe).unwrap();
    storage
        .with_transaction(|conn| {
            for i in 0..count {
                write_progress(conn, &record(i, timestamp, device))?;
            }
            Ok(())
        })
        .unwrap();
    storage
}

fn bench_write(c: &mut Criterion) {
    let storage = Storage::open_in_memory().unwrap();

    let mut group = c.benchmark_group("progress_write");
    group.throughput(Throughput::Elements(1));

    let mut i = 0usize;
    group.bench_function("upsert", |b| {
        b.iter(|| {
            i += 1;
            storage
                .with_connection(|conn| write_progress(conn, &record(i % 1000, i as i64, "bench")))
                .unwrap()
        })
    });

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_snapshot");

    for size in [100usize, 1_000, 10_000] {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("local.sqlite3");
        let remote = dir.path().join("remote.sqlite3");
        drop(fill(&local, size / 2, 1_000, "local"));
        drop(fill(&remote, size, 2_000, "remote"));

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("newer_remote", size), &size, |b, _| {
            b.iter(|| merge_snapshot(black_box(&local), black_box(&remote)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_merge);
criterion_main!(benches);
