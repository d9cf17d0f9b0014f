use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fuzzdex::core::config::Config;
use fuzzdex::core::store::Store;
use fuzzdex::index::index::Index;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

/// Deterministic lowercase words
fn make_words(count: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.gen_range(4..12);
            (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect()
        })
        .collect()
}

fn bench_config(path: std::path::PathBuf, parallel: bool) -> Config {
    Config {
        shard_initial_size: 16 * 1024 * 1024,
        shard_size_limit: Some(16 * 1024 * 1024),
        query_cache_size: 0,
        parallel_search: parallel,
        ..Config::with_path(path)
    }
}

/// Benchmark inserting into a fresh index
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for count in [100, 1000].iter() {
        let words = make_words(*count, 1);
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                let dir = tempdir().unwrap();
                let config = bench_config(dir.path().to_path_buf(), false);
                let mut index = Index::open(dir.path().join("index"), &config).unwrap();
                for word in &words {
                    index.insert(black_box(word)).unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark fuzzy search per edit budget, sequential and on rayon
fn bench_search(c: &mut Criterion) {
    let words = make_words(20_000, 2);
    let queries = make_words(50, 3);

    let mut group = c.benchmark_group("search");
    for parallel in [false, true] {
        let dir = tempdir().unwrap();
        let store = Store::create(bench_config(dir.path().join("store"), parallel), false).unwrap();
        store.insert_batch(&words).unwrap();

        for k in 0..=2 {
            let name = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(name, k), &k, |b, &k| {
                b.iter(|| {
                    for query in &queries {
                        let _ = store.search(black_box(query), k, true).unwrap();
                    }
                });
            });
        }
    }
    group.finish();
}

/// Benchmark the single-trie walk against the split search
fn bench_split_vs_full(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let config = bench_config(dir.path().to_path_buf(), false);
    let mut index = Index::open(dir.path().join("index"), &config).unwrap();
    for word in make_words(20_000, 4) {
        index.insert(&word).unwrap();
    }
    let query = b"fuzzysearch";

    let mut group = c.benchmark_group("split_vs_full");
    group.bench_function("full_walk_k2", |b| {
        b.iter(|| {
            index
                .forward()
                .search(black_box(query), fuzzdex::core::types::EditBudget::within(2), false)
                .unwrap()
        });
    });
    group.bench_function("split_k2", |b| {
        b.iter(|| index.search(black_box(query), 2, false).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search, bench_split_vs_full);
criterion_main!(benches);
