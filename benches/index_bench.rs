//! Benchmarks for the Chairside indexing and caching core
//!
//! Run with: cargo bench

use chairside::cache::{CacheManager, CleanupConfig, CleanupPriority};
use chairside::index::{IndexEngine, SearchOptions};
use chairside::query::{FilterEngine, RecordFilter, SortBy, SortOrder};
use chairside::records::{expense_search_text, Expense};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_expenses(count: usize) -> Vec<Expense> {
    let categories = ["supplies", "lab", "equipment", "rent", "utilities"];
    let words = ["composite", "crown", "gloves", "autoclave", "anesthetic", "wrench"];
    (0..count)
        .map(|i| {
            let month = (i % 12) + 1;
            let day = (i % 28) + 1;
            Expense::new(i as u64, format!("2024-{month:02}-{day:02}"))
                .category(categories[i % categories.len()])
                .amount(((i * 37) % 20000) as f64 + 0.5)
                .paid(i % 3 != 0)
                .description(format!(
                    "{} {} order {}",
                    words[i % words.len()],
                    words[(i / 7) % words.len()],
                    i
                ))
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for size in [100, 1000, 10000] {
        let records = bench_expenses(size);

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("update_data_{}", size), |b| {
            b.iter(|| {
                IndexEngine::with_records(black_box(records.clone()), expense_search_text)
            })
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_search");

    let engine = IndexEngine::with_records(bench_expenses(10000), expense_search_text);

    group.bench_function("token_search", |b| {
        let options = SearchOptions::default();
        b.iter(|| engine.search(black_box("composite crown"), &options))
    });

    group.bench_function("fuzzy_search", |b| {
        let options = SearchOptions::default().fuzzy();
        b.iter(|| engine.search(black_box("compsite"), &options))
    });

    group.bench_function("exact_search", |b| {
        let options = SearchOptions::default().exact();
        b.iter(|| engine.search(black_box("autoclave anesthetic"), &options))
    });

    group.finish();
}

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");

    let engine = FilterEngine::new(bench_expenses(10000), expense_search_text);

    group.bench_function("category_paid_sorted", |b| {
        let filter = RecordFilter::new()
            .category("supplies")
            .paid(true)
            .sort(SortBy::Amount, SortOrder::Desc);
        b.iter(|| engine.apply_filters(black_box(&filter)))
    });

    group.bench_function("search_term_conjunction", |b| {
        let filter = RecordFilter::new().search("composite crown");
        b.iter(|| engine.apply_filters(black_box(&filter)))
    });

    group.bench_function("paginated", |b| {
        let filter = RecordFilter::new().category("lab");
        b.iter(|| engine.paginate_filters(black_box(&filter), 3, 25))
    });

    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    group.bench_function("record_usage_1000", |b| {
        let manager = CacheManager::default();
        let value = bench_expenses(1);
        b.iter(|| {
            for i in 0..1000 {
                manager.record_usage(&format!("bench-{i}"), black_box(&value));
            }
        })
    });

    group.bench_function("cleanup_1000_over_ceiling_100", |b| {
        let config = CleanupConfig {
            max_items: 100,
            max_age: chrono::Duration::seconds(3600),
            priority: CleanupPriority::Lru,
        };
        let keys: Vec<String> = (0..1000).map(|i| format!("bench-{i}")).collect();
        b.iter(|| {
            let manager = CacheManager::default();
            for key in &keys {
                manager.record_usage(key, &42u32);
            }
            manager.cleanup_keys(black_box(&keys), &config, Utc::now())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_search, bench_filters, bench_cache);
criterion_main!(benches);
