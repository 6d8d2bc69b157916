use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Value};
use tandem_core::memory::MemoryDocument;
use tandem_core::prelude::*;

fn bench_local_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("SyncMap");
    group.throughput(Throughput::Elements(1));

    group.bench_function("local_set", |b| {
        let doc = MemoryDocument::new();
        let map = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        // A second replica so every write also fans out to a remote mirror.
        let _peer = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let mut n = 0u64;

        b.iter(|| {
            n += 1;
            map.set(black_box("counter"), json!(n)).unwrap();
        })
    });

    group.bench_function("remote_add_delete", |b| {
        let doc = MemoryDocument::new();
        let mirror = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let remote = doc.open_session().root();

        b.iter(|| {
            remote.set("k", Prelim::Json(json!({"x": 1}))).unwrap();
            remote.delete("k").unwrap();
            black_box(mirror.len());
        })
    });

    group.finish();
}

fn bench_populate(c: &mut Criterion) {
    let mut group = c.benchmark_group("SyncMap");
    let doc = MemoryDocument::new();
    let root = doc.open_session().root();
    for i in 0..1_000 {
        root.set(&format!("key-{i}"), Prelim::Json(json!(i))).unwrap();
    }
    group.throughput(Throughput::Elements(1_000));

    group.bench_function("populate_1k", |b| {
        b.iter(|| {
            let map = SyncMap::<Value>::new(root.clone()).unwrap();
            black_box(map.len());
        })
    });

    group.finish();
}

fn bench_text_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("SyncString");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_remove", |b| {
        let doc = MemoryDocument::new();
        let BackendValue::Text(handle) = doc
            .open_session()
            .root()
            .set("t", Prelim::Text("collaborative text".into()))
            .unwrap()
        else {
            panic!("expected text");
        };
        let text = SyncString::new(handle).unwrap();

        b.iter(|| {
            text.insert(black_box(5), "ü").unwrap();
            text.remove(5, 6).unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_local_set, bench_populate, bench_text_edits);
criterion_main!(benches);
