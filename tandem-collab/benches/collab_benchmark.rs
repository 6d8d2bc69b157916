use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Value};
use tandem_collab::{CollaboratorRegistry, SyncMessage, YrsConfig, YrsDocument};
use tandem_core::memory::MemoryDocument;
use tandem_core::prelude::*;

fn bench_message_encode(c: &mut Criterion) {
    let update = vec![0u8; 64];

    c.bench_function("update_encode_64B", |b| {
        b.iter(|| {
            let msg = SyncMessage::Update(black_box(update.clone()));
            black_box(msg.encode().unwrap());
        })
    });

    let encoded = SyncMessage::Update(update.clone()).encode().unwrap();
    c.bench_function("update_decode_64B", |b| {
        b.iter(|| black_box(SyncMessage::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_presence_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("CollaboratorRegistry");
    group.throughput(Throughput::Elements(2));

    group.bench_function("join_leave", |b| {
        let doc = MemoryDocument::new();
        let registry = CollaboratorRegistry::new(Rc::new(doc.open_session())).unwrap();
        let info = CollaboratorInfo::new("u1", "s1", "Ada", "");

        b.iter(|| {
            doc.join(info.clone());
            doc.leave("s1");
            black_box(registry.len());
        })
    });

    group.finish();
}

fn bench_yrs_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("YrsDocument");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_ship_apply", |b| {
        let a = YrsDocument::with_config(&YrsConfig::for_testing(1));
        let remote = YrsDocument::with_config(&YrsConfig::for_testing(2));
        let local = SyncMap::<Value>::new(a.root()).unwrap();
        let mirror = SyncMap::<Value>::new(remote.root()).unwrap();
        let mut n = 0u64;

        b.iter(|| {
            n += 1;
            local.set("counter", json!(n)).unwrap();
            for update in a.drain_local_updates() {
                remote.apply_remote_update(&update).unwrap();
            }
            black_box(mirror.get("counter"));
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_message_encode,
    bench_presence_churn,
    bench_yrs_round_trip
);
criterion_main!(benches);
