//! Criterion micro-benchmarks for raw registry operations.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use ptrack_core::Address;
use ptrack_registry::{PointerRegistry, RegistryConfig, ViolationPolicy};

fn registry() -> PointerRegistry {
    PointerRegistry::new(RegistryConfig::new().with_policy(ViolationPolicy::Propagate))
}

fn bench_register_release(c: &mut Criterion) {
    c.bench_function("register_release_1k", |b| {
        b.iter(|| {
            let mut reg = registry();
            for i in 1..=1024usize {
                let id = reg.register(Address::from(i * 16)).unwrap();
                reg.increment_by_id(id).unwrap();
                reg.decrement_by_id(id).unwrap();
                reg.mark_deleted_by_id(id).unwrap();
            }
            black_box(reg.record_count())
        });
    });
}

fn bench_reuse(c: &mut Criterion) {
    c.bench_function("address_reuse_1k", |b| {
        b.iter(|| {
            let mut reg = registry();
            let address = Address::from(0x1000);
            for _ in 0..1024 {
                let id = reg.register(address).unwrap();
                reg.mark_deleted_by_id(id).unwrap();
            }
            black_box(reg.current_id(address))
        });
    });
}

fn bench_audit(c: &mut Criterion) {
    let mut reg = registry();
    for i in 1..=10_000usize {
        let id = reg.register(Address::from(i * 16)).unwrap();
        if i % 2 == 0 {
            reg.mark_deleted_by_id(id).unwrap();
        }
    }
    c.bench_function("audit_10k", |b| {
        b.iter(|| black_box(reg.audit()));
    });
}

criterion_group!(benches, bench_register_release, bench_reuse, bench_audit);
criterion_main!(benches);
