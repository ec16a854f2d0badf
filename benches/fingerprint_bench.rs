//! Performance benchmarks for the provenance registry.
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use provenance_registry::crypto::{compute_fingerprint, fingerprint_reader};
use provenance_registry::domain::OwnerId;
use provenance_registry::infra::{InMemoryProofStore, StoragePolicy, TieredProofStore};
use provenance_registry::ledger::MemoryLedger;
use provenance_registry::resolver::{OwnershipResolver, RegisterRequest};

/// Deterministic pseudo-random content
fn content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8).collect()
}

/// Benchmark in-memory fingerprinting across upload sizes
fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [1024usize, 64 * 1024, 1024 * 1024, 16 * 1024 * 1024].iter() {
        let data = content(*size);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("in_memory", size), &data, |b, data| {
            b.iter(|| black_box(compute_fingerprint(data)));
        });
        group.bench_with_input(BenchmarkId::new("streamed", size), &data, |b, data| {
            b.iter(|| black_box(fingerprint_reader(std::io::Cursor::new(data)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark an ownership check against a warm in-memory tier
fn bench_check_ownership(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let store = TieredProofStore::primary_only(
        StoragePolicy::production(),
        Arc::new(InMemoryProofStore::new()),
    );
    let resolver = OwnershipResolver::new(Arc::new(store), Arc::new(MemoryLedger::for_tests()));

    let registered = content(256 * 1024);
    rt.block_on(async {
        resolver
            .register_proof(RegisterRequest {
                content: registered.clone(),
                content_type: "audio/mpeg".into(),
                filename: "bench.mp3".into(),
                requester: OwnerId::new("alice"),
                content_id: None,
            })
            .await
            .unwrap();
    });

    let owner = OwnerId::new("alice");
    let stranger = OwnerId::new("bob");

    c.bench_function("check_ownership_owner", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(resolver.check_ownership(&registered, &owner).await.unwrap()) });
    });

    c.bench_function("check_ownership_other", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(resolver.check_ownership(&registered, &stranger).await.unwrap())
        });
    });
}

criterion_group!(benches, bench_fingerprint, bench_check_ownership);
criterion_main!(benches);
