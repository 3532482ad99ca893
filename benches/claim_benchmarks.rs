// Copyright 2025 Cowboy AI, LLC.

use cim_domain_registry::{
    BuyerInfo, ClaimKind, EngineConfig, IdentityRef, InMemoryEventPublisher,
    InMemoryRegistryStore, LineItem, LineItemId, Registry, RegistryDraft, RegistryId,
    RegistryStore, ReservationEngine,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn setup_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn seeded(items: usize, requested: u32) -> (ReservationEngine, RegistryId, Vec<LineItemId>) {
    let store = InMemoryRegistryStore::new();
    let registry = Registry::new(IdentityRef::new("owner"), RegistryDraft::titled("Bench")).unwrap();
    let registry_id = registry.id;
    store.create_registry(registry).await.unwrap();

    let mut ids = Vec::with_capacity(items);
    for n in 0..items {
        let item = LineItem::new(format!("sku-{n}"), requested).unwrap();
        ids.push(item.id);
        store.add_item(&registry_id, item).await.unwrap();
    }
    let engine = ReservationEngine::new(
        Arc::new(store),
        Arc::new(InMemoryEventPublisher::new()),
        EngineConfig::default(),
    );
    (engine, registry_id, ids)
}

fn benchmark_single_claim(c: &mut Criterion) {
    let rt = setup_runtime();

    c.bench_function("claim_uncontended", |b| {
        b.iter_batched(
            || rt.block_on(seeded(2, 1_000)),
            |(engine, registry_id, items)| {
                rt.block_on(async {
                    let record = engine
                        .submit_claim(
                            &registry_id,
                            &items[0],
                            1,
                            BuyerInfo::guest("Ana", "ana@example.com"),
                            ClaimKind::Reserved,
                        )
                        .await
                        .unwrap();
                    black_box(record);
                })
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn benchmark_contended_claims(c: &mut Criterion) {
    let rt = setup_runtime();
    let mut group = c.benchmark_group("claim_contended");

    for claimants in [8usize, 32, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(claimants),
            &claimants,
            |b, &claimants| {
                b.iter_batched(
                    || rt.block_on(seeded(2, (claimants / 2) as u32)),
                    |(engine, registry_id, items)| {
                        rt.block_on(async {
                            let handles: Vec<_> = (0..claimants)
                                .map(|n| {
                                    let engine = engine.clone();
                                    let item_id = items[0];
                                    tokio::spawn(async move {
                                        engine
                                            .submit_claim(
                                                &registry_id,
                                                &item_id,
                                                1,
                                                BuyerInfo::guest(
                                                    format!("Guest {n}"),
                                                    "guest@example.com",
                                                ),
                                                ClaimKind::Purchased,
                                            )
                                            .await
                                    })
                                })
                                .collect();
                            for handle in handles {
                                let _ = black_box(handle.await.unwrap());
                            }
                        })
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn benchmark_spread_claims(c: &mut Criterion) {
    let rt = setup_runtime();

    c.bench_function("claim_spread_over_items", |b| {
        b.iter_batched(
            || rt.block_on(seeded(16, 4)),
            |(engine, registry_id, items)| {
                rt.block_on(async {
                    let handles: Vec<_> = items
                        .iter()
                        .map(|item_id| {
                            let engine = engine.clone();
                            let item_id = *item_id;
                            tokio::spawn(async move {
                                engine
                                    .submit_claim(
                                        &registry_id,
                                        &item_id,
                                        2,
                                        BuyerInfo::guest("Ana", "ana@example.com"),
                                        ClaimKind::Reserved,
                                    )
                                    .await
                            })
                        })
                        .collect();
                    for handle in handles {
                        black_box(handle.await.unwrap().unwrap());
                    }
                })
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    benchmark_single_claim,
    benchmark_contended_claims,
    benchmark_spread_claims
);
criterion_main!(benches);
