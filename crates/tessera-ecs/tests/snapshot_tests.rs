//! Integration tests for World buffer save/load.

use tessera_ecs::prelude::*;

// -- test components --------------------------------------------------------

fn catalogue() -> Vec<Component> {
    Component::catalogue_from_json(
        r#"[
            {"name": "position",
             "schema": [{"name": "x", "type": "f32"}, {"name": "y", "type": "f32"}]},
            {"name": "health",
             "schema": [{"name": "hp", "type": "u16", "default": 100}],
             "max_entities": 8},
            {"name": "frozen"}
        ]"#,
    )
    .unwrap()
}

fn setup_world() -> World {
    World::new(catalogue(), WorldConfig::with_capacity(64)).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn snapshot_empty_world() {
    let world = setup_world();
    let snapshot = world.save();
    // position: 2 * f32 * 64, health: u16 * 8.
    assert_eq!(snapshot.buffer.len(), 512 + 16);
    assert_eq!(snapshot.capacity, 64);

    let mut world2 = setup_world();
    world2.load(&snapshot).unwrap();
    assert_eq!(world2.storage().buffer(), world.storage().buffer());
}

#[test]
fn snapshot_restores_property_values() {
    let mut world = setup_world();
    let entities: Vec<Entity> = (0..10).map(|_| world.create_entity().unwrap()).collect();
    for (i, &e) in entities.iter().enumerate() {
        world
            .add_component_with(e, "position", &[("x", i as f64), ("y", -(i as f64))])
            .unwrap();
    }
    let snapshot = world.save();

    for &e in &entities {
        world.set(e, "position", "x", 999.0).unwrap();
    }
    world.load(&snapshot).unwrap();

    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(world.get(e, "position", "x").unwrap(), i as f64);
        assert_eq!(world.get(e, "position", "y").unwrap(), -(i as f64));
    }
}

#[test]
fn snapshot_survives_json() {
    let mut world = setup_world();
    let e = world.create_entity().unwrap();
    world.add_component_with(e, "position", &[("x", 4.25)]).unwrap();

    let json = world.save().to_json().unwrap();
    let restored = WorldSnapshot::from_json(&json).unwrap();

    let mut other = setup_world();
    let f = other.create_entity().unwrap();
    other.add_component(f, "position").unwrap();
    other.load(&restored).unwrap();
    assert_eq!(f.index(), e.index());
    assert_eq!(other.get(f, "position", "x").unwrap(), 4.25);
}

#[test]
fn load_leaves_structure_alone() {
    let mut world = setup_world();
    let e = world.create_entity().unwrap();
    world.add_component(e, "frozen").unwrap();
    let snapshot = world.save();

    world.remove_component(e, "frozen").unwrap();
    world.load(&snapshot).unwrap();
    assert!(!world.has_component(e, "frozen").unwrap());
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn rejected_load_keeps_live_buffer() {
    let mut world = setup_world();
    let e = world.create_entity().unwrap();
    world.add_component_with(e, "position", &[("x", 7.0)]).unwrap();

    let mut bad = world.save();
    bad.buffer.truncate(10);
    bad.buffer.fill(0xff);
    assert!(matches!(
        world.load(&bad),
        Err(EcsError::BufferSizeMismatch { .. })
    ));
    assert_eq!(world.get(e, "position", "x").unwrap(), 7.0);

    let small = World::new(catalogue(), WorldConfig::with_capacity(32)).unwrap();
    assert!(matches!(
        world.load(&small.save()),
        Err(EcsError::CapacityMismatch { expected: 64, actual: 32 })
    ));
}

#[test]
fn version_is_taken_from_config() {
    let config = WorldConfig {
        capacity: 64,
        version: "save-format-2".to_owned(),
    };
    let world = World::new(catalogue(), config).unwrap();
    let snapshot = world.save();
    assert_eq!(snapshot.version, "save-format-2");

    let mut default_world = setup_world();
    assert!(matches!(
        default_world.load(&snapshot),
        Err(EcsError::VersionMismatch { .. })
    ));
}
