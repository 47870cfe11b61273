//! Registry throughput benchmark.
//!
//! Measures direct registry reads/writes, batch sizes, and the cost of a full
//! call routed through the in-process bus using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use propbus::bus::{Bus, LocalBus, MethodCall};
use propbus::{AttributeRegistry, FieldDescriptor, ObjectPath, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const IFACE: &str = "com.example.Bench";

fn record(fields: usize) -> Vec<FieldDescriptor> {
    (0..fields)
        .map(|i| FieldDescriptor::new(format!("Field{}", i), i as i32).tag("writeable,emit"))
        .collect()
}

fn bench_get_set(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = AttributeRegistry::new(&record(16)).unwrap();

    c.bench_function("get", |b| {
        b.iter(|| rt.block_on(async { registry.get(IFACE, black_box("Field7")).await.unwrap() }));
    });
    c.bench_function("set", |b| {
        b.iter(|| {
            rt.block_on(async {
                registry
                    .set(IFACE, black_box("Field7"), Value::from(42i32))
                    .await
                    .unwrap()
            })
        });
    });
}

fn bench_set_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let batch_sizes: &[usize] = &[1, 8, 64];

    let mut group = c.benchmark_group("set_batch");
    for &size in batch_sizes {
        let registry = AttributeRegistry::new(&record(size)).unwrap();
        let values: BTreeMap<String, Value> = (0..size)
            .map(|i| (format!("Field{}", i), Value::from(-(i as i32))))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &values, |b, v| {
            b.iter(|| {
                rt.block_on(async {
                    registry
                        .set_batch(IFACE, Vec::new(), black_box(v.clone()))
                        .await
                        .unwrap()
                })
            });
        });
    }
    group.finish();
}

fn bench_bus_call(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = LocalBus::default();
    let path = ObjectPath::new("/com/example/Bench").unwrap();
    rt.block_on(async {
        let registry = Arc::new(AttributeRegistry::new(&record(16)).unwrap());
        let handle: Arc<dyn Bus> = Arc::new(bus.clone());
        registry.export(handle, path.clone()).await.unwrap();
    });

    c.bench_function("bus_get_all_16", |b| {
        b.iter(|| {
            rt.block_on(async {
                bus.call(MethodCall::get_all(black_box(path.clone()), IFACE))
                    .await
                    .unwrap()
            })
        });
    });
}

criterion_group!(benches, bench_get_set, bench_set_batch, bench_bus_call);
criterion_main!(benches);
