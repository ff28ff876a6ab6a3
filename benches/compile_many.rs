//! Benchmarks the Workspace Engine's full-compile and incremental-recompile
//! paths against synthetic multi-package modules, using [`MockBackend`] as
//! the compiler seam so the numbers reflect this crate's own orchestration
//! (dependency graph, interface cache, task pool, disk cache) rather than
//! any particular real-language frontend.
//!
//! One `criterion` group per scenario, package count varied across
//! `bench_function`s within a group, fixtures generated fresh per iteration.

use std::path::PathBuf;

use cjls_core::{CacheConfig, DiskCache, EngineConfig, WorkspaceEngine};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn backend() -> Box<dyn cjls_core::CompileBackend> {
    Box::new(cjls_core::MockBackend)
}

/// Writes a module with `package_count` packages, each declaring one class
/// that extends the previous package's class, so compilation has a real
/// (linear) dependency chain to walk rather than `package_count` isolated
/// units.
fn write_chained_module(root: &std::path::Path, package_count: usize) -> PathBuf {
    std::fs::write(root.join("cjpm.toml"), "moduleName = \"bench\"\n").unwrap();
    let src = root.join("src");
    for i in 0..package_count {
        let dir = src.join(format!("pkg{i}"));
        std::fs::create_dir_all(&dir).unwrap();
        let body = if i == 0 {
            "public class Base {\n    public func value(): Int64 {\n        return 0\n    }\n}\n".to_string()
        } else {
            format!(
                "import bench.pkg{prev}\npublic class Base <: Base {{\n    public func value(): Int64 {{\n        return 0\n    }}\n}}\n",
                prev = i - 1
            )
        };
        std::fs::write(dir.join("main.cj"), body).unwrap();
    }
    root.to_path_buf()
}

fn full_compile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_compile");
    group.sample_size(10);
    for &count in &[4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let dir = tempfile::tempdir().unwrap();
                    write_chained_module(dir.path(), count);
                    dir
                },
                |dir| {
                    let engine = WorkspaceEngine::open(dir.path(), backend(), EngineConfig::default()).unwrap();
                    let _ = engine.package_count().unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn incremental_recompile_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    write_chained_module(dir.path(), 32);
    let engine = WorkspaceEngine::open(dir.path(), backend(), EngineConfig::default()).unwrap();
    let leaf_file = dir.path().join("src/pkg0/main.cj");

    let mut group = c.benchmark_group("incremental_recompile");
    group.sample_size(20);
    group.bench_function("edit_root_package", |b| {
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            let value = if toggle { 1 } else { 0 };
            let contents = format!(
                "public class Base {{\n    public func value(): Int64 {{\n        return {value}\n    }}\n}}\n"
            );
            engine.on_file_changed(&leaf_file, contents).unwrap();
        });
    });
    group.finish();
}

/// Measures how much a warm disk cache saves on a cold-process reopen: the
/// setup phase runs a real `open` (populating the on-disk interface blobs
/// and shards) and confirms the cache root actually holds a blob for the
/// root package before the clock starts, then the timed portion reopens a
/// fresh `WorkspaceEngine` against the same root and relies entirely on the
/// cache hit instead of recompiling.
fn disk_cache_warm_reopen_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("disk_cache_warm_reopen");
    group.sample_size(10);
    for &count in &[4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let dir = tempfile::tempdir().unwrap();
                    write_chained_module(dir.path(), count);
                    {
                        let _warm_up = WorkspaceEngine::open(dir.path(), backend(), EngineConfig::default()).unwrap();
                    }
                    let pkg_dir = dir.path().join("src/pkg0");
                    let hash = DiskCache::sources_hash(&[(pkg_dir.join("main.cj"), std::fs::read_to_string(pkg_dir.join("main.cj")).unwrap())]);
                    let cache = DiskCache::new(CacheConfig::resolve(dir.path(), None).root);
                    assert!(cache.load_interface_blob(&pkg_dir, &hash).is_some(), "warm-up should have populated the disk cache");
                    dir
                },
                |dir| {
                    let engine = WorkspaceEngine::open(dir.path(), backend(), EngineConfig::default()).unwrap();
                    let _ = engine.package_count().unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    full_compile_benchmark,
    incremental_recompile_benchmark,
    disk_cache_warm_reopen_benchmark
);
criterion_main!(benches);
