// Write performance benchmarks for the Depositor

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use depositor::{BatchHeader, DocStatus, Depositor, MemoryStorage, Options, Row, SortKeyQuery};
use serde_json::{json, Map};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

const START_SEQ: &str = "20201113222500000000";

fn rows(count: u64, first_age: u64) -> Vec<Row> {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            let height: u32 = rng.random_range(150..200);
            serde_json::from_value(json!({
                "id": i,
                "_AGE": first_age + i,
                "first_name": format!("first-{:08}", rng.random::<u32>()),
                "height": height,
            }))
            .unwrap()
        })
        .collect()
}

fn depositor_on(storage: Arc<MemoryStorage>, size_limit: u64) -> Depositor {
    let mut depositor = Depositor::with_storage(storage, Options::default().size_limit(size_limit)).unwrap();
    depositor.set_current_topic_table("bench", "aged_data").unwrap();
    let header = BatchHeader::table("bench", "aged_data", START_SEQ, Map::new()).with_aged(true);
    depositor.add_document(&header, &[]).unwrap();
    depositor
}

fn benchmark_chunked_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_batch");

    for size in [100u64, 1000, 10000].iter() {
        let payload = rows(*size, 2);
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let depositor = depositor_on(Arc::new(MemoryStorage::new()), 64 * 1024);
                let batch = BatchHeader::data("bench", "aged_data").with_ages(2, Some(size + 1));
                black_box(depositor.add_document(&batch, &payload).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_small_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("small_batches");

    for count in [100u64, 1000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let temp_dir = TempDir::new().unwrap();
                let mut depositor = Depositor::open(temp_dir.path(), Options::default()).unwrap();
                depositor.set_current_topic_table("bench", "aged_data").unwrap();
                let header = BatchHeader::table("bench", "aged_data", START_SEQ, Map::new()).with_aged(true);
                depositor.add_document(&header, &[]).unwrap();

                for age in 2..count + 2 {
                    let batch = BatchHeader::data("bench", "aged_data").with_ages(age, None);
                    depositor.add_document(&batch, &rows(1, age)).unwrap();
                }
                black_box(&depositor);
            });
        });
    }

    group.finish();
}

fn benchmark_level_one_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("level_one_merge");

    for count in [10u64, 100].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_with_setup(
                || {
                    let depositor = depositor_on(Arc::new(MemoryStorage::new()), 1 << 20);
                    for age in 2..count + 2 {
                        let batch = BatchHeader::data("bench", "aged_data").with_ages(age, None);
                        let mut group_rows = rows(10, 0);
                        for row in &mut group_rows {
                            row.insert("_AGE".into(), json!(age));
                        }
                        depositor.add_document(&batch, &group_rows).unwrap();
                    }
                    depositor.seal_tail(1).unwrap();
                    depositor
                },
                |depositor| {
                    let query = SortKeyQuery::new().status(&[DocStatus::Initial]).min_close_level(1);
                    let anchor = depositor.get_stream_by_sort_key(&query).unwrap().next().unwrap().unwrap();
                    let doc = depositor.get_header_from_ref(&anchor).unwrap();
                    assert!(depositor.merge_documents(doc.merge_key(), 1).unwrap());
                },
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_chunked_batch,
    benchmark_small_batches,
    benchmark_level_one_merge
);
criterion_main!(benches);
