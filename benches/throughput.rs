//! Throughput benchmarks for LumenKV
//!
//! Commands run against a real database in a temporary directory, so the
//! numbers include locking and log encoding. Most groups use the `Never`
//! fsync policy to measure the engine rather than the disk.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use lumenkv::{AofFsync, Config, Database, Persistence, SetOptions, ZAddOptions};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn open(fsync: AofFsync) -> (TempDir, Arc<Database>) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(
        Config::new()
            .data_dir(dir.path())
            .db_name("bench")
            .persistence(Persistence::Aof)
            .aof_fsync(fsync)
            .singleton(false),
    )
    .unwrap();
    (dir, db)
}

/// SET with and without a synced log
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    let (_dir, db) = open(AofFsync::Never);
    let options = SetOptions::default();
    group.bench_function("set_buffered_log", |b| {
        let mut i = 0u64;
        b.iter(|| {
            db.set(&format!("key:{}", i), "small_value", &options).unwrap();
            i += 1;
        });
    });

    let value = "x".repeat(1024);
    group.bench_function("set_1kb_buffered_log", |b| {
        let mut i = 0u64;
        b.iter(|| {
            db.set(&format!("key:{}", i), &value, &options).unwrap();
            i += 1;
        });
    });

    let (_synced_dir, synced) = open(AofFsync::Always);
    group.sample_size(20);
    group.bench_function("set_fsync_always", |b| {
        let mut i = 0u64;
        b.iter(|| {
            synced.set(&format!("key:{}", i), "small_value", &options).unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// GET hits and misses
fn bench_get(c: &mut Criterion) {
    let (_dir, db) = open(AofFsync::Never);
    let pairs: Vec<(String, String)> = (0..100_000)
        .map(|i| (format!("key:{}", i), format!("value:{}", i)))
        .collect();
    db.mset(&pairs).unwrap();

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(db.get(&format!("key:{}", i % 100_000)).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(db.get(&format!("missing:{}", i)).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Push/pop on a list and ZADD/ZRANGE on a sorted set
fn bench_containers(c: &mut Criterion) {
    let (_dir, db) = open(AofFsync::Never);
    let mut group = c.benchmark_group("containers");
    group.throughput(Throughput::Elements(1));

    group.bench_function("rpush_lpop", |b| {
        b.iter(|| {
            db.rpush("queue", &["job"]).unwrap();
            black_box(db.lpop("queue").unwrap());
        });
    });

    group.bench_function("zadd", |b| {
        let mut i = 0u64;
        b.iter(|| {
            db.zadd("board", &[(format!("m:{}", i % 10_000), i as f64)], ZAddOptions::default())
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("zrange_top_10", |b| {
        b.iter(|| {
            black_box(db.zrevrange_withscores("board", 0, 9).unwrap());
        });
    });

    group.finish();
}

/// INCR on one hot key and on many keys
fn bench_incr(c: &mut Criterion) {
    let (_dir, db) = open(AofFsync::Never);
    let mut group = c.benchmark_group("incr");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_counter", |b| {
        b.iter(|| {
            black_box(db.incr("counter").unwrap());
        });
    });

    group.bench_function("multiple_counters", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(db.incr(&format!("counter:{}", i % 1000)).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Four threads sharing one database
fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.sample_size(20);

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let (_dir, db) = open(AofFsync::Never);
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let db = Arc::clone(&db);
                    thread::spawn(move || {
                        let options = SetOptions::default();
                        for i in 0..2_000 {
                            let key = format!("key:{}:{}", t, i);
                            db.set(&key, "value", &options).unwrap();
                            db.get(&key).unwrap();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
            black_box(db.dbsize().unwrap());
        });
    });

    group.finish();
}

/// Snapshot of a 50k-key database
fn bench_snapshot(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(
        Config::new()
            .data_dir(dir.path())
            .db_name("snap")
            .persistence(Persistence::Rdb)
            .singleton(false),
    )
    .unwrap();
    let pairs: Vec<(String, String)> = (0..50_000)
        .map(|i| (format!("key:{}", i), format!("value:{}", i)))
        .collect();
    db.mset(&pairs).unwrap();

    let mut group = c.benchmark_group("snapshot");
    group.sample_size(10);
    group.bench_function("save_50k_keys", |b| {
        b.iter(|| {
            black_box(db.save().unwrap());
        });
    });
    group.finish();
}

/// KEYS pattern matching
fn bench_keys(c: &mut Criterion) {
    let (_dir, db) = open(AofFsync::Never);
    for i in 0..1_000 {
        db.mset(&[
            (format!("user:{}", i), "user_data".to_string()),
            (format!("session:{}", i), "session_data".to_string()),
            (format!("cache:{}", i), "cache_data".to_string()),
        ])
        .unwrap();
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| {
            black_box(db.keys("user:*").unwrap());
        });
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| {
            black_box(db.keys("*").unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_containers,
    bench_incr,
    bench_concurrent,
    bench_snapshot,
    bench_keys,
);

criterion_main!(benches);
