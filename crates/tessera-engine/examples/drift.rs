//! Headless particle drift: spawn, integrate, expire and respawn particles
//! for a few simulated seconds, then print the state hash.
//!
//! Run with:
//!   RUST_LOG=tessera_ecs=debug cargo run --example drift -p tessera-engine

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tessera_engine::prelude::*;

const CATALOGUE: &str = r#"[
    {"name": "position",
     "schema": [{"name": "x", "type": "f32"}, {"name": "y", "type": "f32"}]},
    {"name": "velocity",
     "schema": [{"name": "dx", "type": "f32"}, {"name": "dy", "type": "f32"}]},
    {"name": "life",
     "schema": [{"name": "frames", "type": "u16", "default": 90}]},
    {"name": "heavy", "max_entities": 64}
]"#;

const PARTICLES: usize = 1_000;

fn integrate(world: &mut World, dt: f64) -> Result<(), EcsError> {
    let q = world.register_query(Query::new().all(["position", "velocity"]))?;
    let entities: Vec<Entity> = world.query_entities(q)?.iter().copied().collect();
    for e in entities {
        let gravity = if world.has_component(e, "heavy")? { -9.8 } else { 0.0 };
        let dy = world.get(e, "velocity", "dy")? + gravity * dt;
        world.set(e, "velocity", "dy", dy)?;
        let x = world.get(e, "position", "x")? + world.get(e, "velocity", "dx")? * dt;
        let y = world.get(e, "position", "y")? + dy * dt;
        world.set(e, "position", "x", x)?;
        world.set(e, "position", "y", y)?;
    }
    Ok(())
}

fn age(world: &mut World, _dt: f64) -> Result<(), EcsError> {
    let q = world.register_query(Query::new().all(["life"]))?;
    let entities: Vec<Entity> = world.query_entities(q)?.iter().copied().collect();
    for e in entities {
        let left = world.get(e, "life", "frames")?;
        if left <= 1.0 {
            world.destroy_entity(e)?;
        } else {
            world.set(e, "life", "frames", left - 1.0)?;
        }
    }
    Ok(())
}

fn spawn(world: &mut World, rng: &mut Pcg32) -> Result<(), EcsError> {
    let e = world.create_entity()?;
    world.add_component_with(
        e,
        "position",
        &[("x", rng.gen_range(-50.0..50.0)), ("y", rng.gen_range(-50.0..50.0))],
    )?;
    world.add_component_with(
        e,
        "velocity",
        &[("dx", rng.gen_range(-5.0..5.0)), ("dy", rng.gen_range(-5.0..5.0))],
    )?;
    world.add_component_with(e, "life", &[("frames", f64::from(rng.gen_range(30u16..120)))])?;
    if rng.gen_bool(0.1) {
        // Capped; a full heavy pool just leaves the particle light.
        match world.add_component(e, "heavy") {
            Ok(_) | Err(EcsError::ComponentCapacity { .. }) => {}
            Err(other) => return Err(other),
        }
    }
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let components = Component::catalogue_from_json(CATALOGUE)?;
    let world = World::new(components, WorldConfig::with_capacity(PARTICLES * 2))?;
    let mut frames = FrameLoop::new(world, FrameConfig::default())?;
    frames.add_system("integrate", integrate)?;
    frames.add_system_after("age", &["integrate"], age)?;

    let mut rng = Pcg32::seed_from_u64(0x7e55e7a);
    let heavy = frames
        .world_mut()
        .register_query(Query::new().all(["position", "heavy"]))?;

    for frame in 0..600u64 {
        while frames.world().entity_count() < PARTICLES {
            spawn(frames.world_mut(), &mut rng)?;
        }
        frames.tick()?;

        if frame % 120 == 0 {
            let took = frames.last_diagnostics().total_time;
            let world = frames.world_mut();
            let heavy_count = world.query_entities(heavy)?.len();
            println!(
                "frame {frame:>4}: {} live, {} heavy, {} archetypes, frame took {:?}",
                world.entity_count(),
                heavy_count,
                world.archetype_count(),
                took,
            );
        }
    }

    let purged = frames.world_mut().purge_empty_archetypes();
    println!(
        "simulated {:.1}s, purged {purged} empty archetypes, state hash {}",
        frames.sim_time(),
        frames.state_hash()?
    );
    Ok(())
}
