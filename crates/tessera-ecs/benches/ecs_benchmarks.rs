//! World throughput benchmarks.
//!
//! - Steady-state query reads on a 10K-entity world.
//! - Seeded entity churn (create, add, remove, destroy) followed by one
//!   refresh per frame, comparing the incremental query cache against a
//!   full sweep.
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use tessera_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TAGS: [&str; 3] = ["frozen", "visible", "enemy"];

fn components() -> Vec<Component> {
    vec![
        Component::with_schema(
            "position",
            Schema::new()
                .with("x", NumericType::F32)
                .with("y", NumericType::F32),
        ),
        Component::with_schema(
            "velocity",
            Schema::new()
                .with("dx", NumericType::F32)
                .with("dy", NumericType::F32),
        ),
        Component::tag(TAGS[0]),
        Component::tag(TAGS[1]),
        Component::tag(TAGS[2]),
    ]
}

/// A world of `count` entities with position and velocity, a third of them
/// frozen.
fn populated_world(count: usize) -> (World, QueryId, Vec<Entity>) {
    let mut world = World::new(components(), WorldConfig::with_capacity(count * 2)).unwrap();
    let moving = world
        .register_query(Query::new().all(["position", "velocity"]).none(["frozen"]))
        .unwrap();
    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let e = world.create_entity().unwrap();
        world
            .add_component_with(e, "position", &[("x", i as f64)])
            .unwrap();
        world
            .add_component_with(e, "velocity", &[("dx", 1.0)])
            .unwrap();
        if i % 3 == 0 {
            world.add_component(e, "frozen").unwrap();
        }
        entities.push(e);
    }
    world.refresh();
    (world, moving, entities)
}

/// One frame of random structural churn over `entities`.
fn churn(world: &mut World, entities: &mut Vec<Entity>, rng: &mut Pcg32, ops: usize) {
    for _ in 0..ops {
        match rng.gen_range(0..4) {
            0 => {
                if let Ok(e) = world.create_entity() {
                    world.add_component(e, "position").unwrap();
                    entities.push(e);
                }
            }
            1 if !entities.is_empty() => {
                let e = entities.swap_remove(rng.gen_range(0..entities.len()));
                world.destroy_entity(e).unwrap();
            }
            2 if !entities.is_empty() => {
                let e = entities[rng.gen_range(0..entities.len())];
                world.add_component(e, TAGS[rng.gen_range(0..TAGS.len())]).unwrap();
            }
            _ if !entities.is_empty() => {
                let e = entities[rng.gen_range(0..entities.len())];
                world.remove_component(e, TAGS[rng.gen_range(0..TAGS.len())]).unwrap();
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_query_steady_state(c: &mut Criterion) {
    let (mut world, moving, _) = populated_world(10_000);
    c.bench_function("query_10k_steady_state", |b| {
        b.iter(|| {
            let count = world.query_entities(moving).unwrap().len();
            black_box(count);
            world.refresh();
        });
    });
}

fn bench_integrate_positions(c: &mut Criterion) {
    let (mut world, moving, _) = populated_world(10_000);
    let position = world.component_id("position").unwrap();
    let velocity = world.component_id("velocity").unwrap();
    c.bench_function("integrate_10k_positions", |b| {
        b.iter(|| {
            let entities: Vec<Entity> = world.query_entities(moving).unwrap().iter().copied().collect();
            let storage = world.storage_mut();
            for e in entities {
                let x = storage.read(position, e, 0).unwrap_or_default();
                let dx = storage.read(velocity, e, 0).unwrap_or_default();
                storage.write(position, e, 0, x + dx).unwrap();
            }
            world.refresh();
        });
    });
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn_then_query");
    for ops in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("incremental", ops), &ops, |b, &ops| {
            let (mut world, moving, mut entities) = populated_world(5_000);
            let mut rng = Pcg32::seed_from_u64(0x7e55e7a);
            b.iter(|| {
                churn(&mut world, &mut entities, &mut rng, ops);
                black_box(world.query_entities(moving).unwrap().len());
                world.refresh();
            });
        });
        group.bench_with_input(BenchmarkId::new("full_sweep", ops), &ops, |b, &ops| {
            let (mut world, moving, mut entities) = populated_world(5_000);
            let mut rng = Pcg32::seed_from_u64(0x7e55e7a);
            b.iter(|| {
                churn(&mut world, &mut entities, &mut rng, ops);
                let swept = world.queries().full_sweep(moving, world.archetypes()).unwrap();
                black_box(swept.len());
                world.refresh();
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_query_steady_state,
    bench_integrate_positions,
    bench_churn
);
criterion_main!(benches);
