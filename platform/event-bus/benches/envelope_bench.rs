use criterion::{criterion_group, criterion_main, Criterion};
use event_bus::EventEnvelope;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct SamplePayload {
    order_id: String,
    total_price: f64,
    line_count: u32,
}

fn sample_payload() -> SamplePayload {
    SamplePayload {
        order_id: "order-00000000-0000-0000-0000-000000000000".to_string(),
        total_price: 129.99,
        line_count: 3,
    }
}

fn bench_construct(c: &mut Criterion) {
    c.bench_function("envelope_construct", |b| {
        b.iter(|| EventEnvelope::new("tenant-1".to_string(), "orders".to_string(), sample_payload()))
    });
}

fn bench_roundtrip(c: &mut Criterion) {
    let envelope = EventEnvelope::new("tenant-1".to_string(), "orders".to_string(), sample_payload());
    c.bench_function("envelope_serialize_deserialize_roundtrip", |b| {
        b.iter(|| {
            let json = serde_json::to_vec(&envelope).unwrap();
            let _: EventEnvelope<SamplePayload> = serde_json::from_slice(&json).unwrap();
        })
    });
}

criterion_group!(benches, bench_construct, bench_roundtrip);
criterion_main!(benches);
