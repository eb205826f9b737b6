// Summary store benchmarks.
//
// Run with: cargo bench
//
// | Operation              | Description                                  |
// |------------------------|----------------------------------------------|
// | update_summary         | Write one summary and mark its parent stale  |
// | mark_stale             | Mark an existing record stale                |
// | get_stale_issues (1k)  | Read the backlog from 1000 stale records     |
// | stats (10k)            | Counts over 10000 records                    |

use aisummary::model::IssueKey;
use aisummary::storage::SqliteStorage;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Once;
use std::time::Instant;
use tempfile::TempDir;
use tracing::info;

fn key(i: usize) -> IssueKey {
    IssueKey::parse(&format!("BENCH-{}", i + 1)).expect("valid bench key")
}

/// Every tenth issue is an epic holding the nine issues after it.
fn parent_of(i: usize) -> Option<IssueKey> {
    (i % 10 != 0).then(|| key(i - i % 10))
}

fn init_bench_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = aisummary::logging::init_logging(0, true, None);
    });
}

fn log_bench_start(name: &str) -> Instant {
    info!("benchmark_start: {name}");
    Instant::now()
}

fn log_bench_end(name: &str, started_at: Instant) {
    info!("benchmark_end: {name} duration={:?}", started_at.elapsed());
}

/// A file-backed store with `count` fresh summaries.
fn setup_store(count: usize) -> (TempDir, SqliteStorage) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut storage =
        SqliteStorage::open(&dir.path().join("bench.db")).expect("Failed to open db");
    for i in 0..count {
        storage
            .update_summary(&key(i), &format!("Summary of issue {i}"), parent_of(i).as_ref())
            .expect("Failed to write summary");
    }
    (dir, storage)
}

fn bench_update_summary(c: &mut Criterion) {
    init_bench_logging();
    let started = log_bench_start("update_summary");
    let mut group = c.benchmark_group("update_summary");

    let (_dir, mut storage) = setup_store(100);
    let mut i = 0usize;
    group.bench_function("with_parent", |b| {
        b.iter(|| {
            i = (i + 1) % 100;
            storage
                .update_summary(
                    black_box(&key(i)),
                    "Refreshed summary text",
                    parent_of(i).as_ref(),
                )
                .expect("Failed to write summary");
        });
    });

    group.finish();
    log_bench_end("update_summary", started);
}

fn bench_mark_stale(c: &mut Criterion) {
    init_bench_logging();
    let started = log_bench_start("mark_stale");
    let mut group = c.benchmark_group("mark_stale");

    let (_dir, mut storage) = setup_store(100);
    let mut i = 0usize;
    group.bench_function("existing", |b| {
        b.iter(|| {
            i = (i + 1) % 100;
            storage
                .mark_stale(black_box(&key(i)), false)
                .expect("Failed to mark stale");
        });
    });

    group.finish();
    log_bench_end("mark_stale", started);
}

fn bench_stale_backlog(c: &mut Criterion) {
    init_bench_logging();
    let started = log_bench_start("get_stale_issues");
    let mut group = c.benchmark_group("get_stale_issues");

    for count in [100usize, 1_000] {
        let (_dir, mut storage) = setup_store(count);
        for i in 0..count {
            storage
                .mark_stale(&key(i), false)
                .expect("Failed to mark stale");
        }
        group.throughput(Throughput::Elements(count as u64));
        for limit in [0usize, 10] {
            group.bench_with_input(
                BenchmarkId::new(format!("limit_{limit}"), count),
                &limit,
                |b, &limit| {
                    b.iter(|| {
                        black_box(
                            storage
                                .get_stale_issues(limit)
                                .expect("Failed to read backlog"),
                        )
                    });
                },
            );
        }
    }

    group.finish();
    log_bench_end("get_stale_issues", started);
}

fn bench_stats(c: &mut Criterion) {
    init_bench_logging();
    let started = log_bench_start("stats");
    let mut group = c.benchmark_group("stats");
    group.sample_size(20);

    let (_dir, storage) = setup_store(10_000);
    group.bench_function("10k", |b| {
        b.iter(|| black_box(storage.stats().expect("Failed to read stats")));
    });

    group.finish();
    log_bench_end("stats", started);
}

criterion_group!(
    benches,
    bench_update_summary,
    bench_mark_stale,
    bench_stale_backlog,
    bench_stats
);
criterion_main!(benches);
