//! Entity broadcast: observer discovery through the view-volume index,
//! packet selection, and stale-observation culling.

mod common;

use common::{join, set_input_position, set_input_rotation, test_world, Event};
use glam::{DVec3, Vec2};

#[test]
fn observers_learn_about_an_entity_before_any_movement() {
    let world = test_world();
    let (_a, a_inputs, a_eid) = join(&world, DVec3::new(0.0, 100.0, 0.0), 2);
    let (b, _b_inputs, _b_eid) = join(&world, DVec3::new(10.0, 100.0, 10.0), 2);
    world.tick(0);
    assert!(world.sees_entity(&b, a_eid));

    set_input_position(&a_inputs, DVec3::new(2.0, 100.0, 0.0));
    world.tick(1);

    let events = b.events();
    let add_idx = events
        .iter()
        .position(|e| *e == Event::AddPlayer(a_eid))
        .expect("add-player dispatched");
    let first_move = events.iter().position(|e| {
        matches!(e,
            Event::MovePos(eid, ..) | Event::MovePosRot(eid, ..) | Event::MoveRot(eid, ..)
            if *eid == a_eid
        )
    });
    let move_idx = first_move.expect("movement dispatched after the add");
    assert!(add_idx < move_idx, "add must precede movement");
}

#[test]
fn entities_never_hear_about_themselves() {
    let world = test_world();
    let (a, a_inputs, a_eid) = join(&world, DVec3::new(0.0, 100.0, 0.0), 2);
    world.tick(0);
    set_input_position(&a_inputs, DVec3::new(1.0, 100.0, 0.0));
    world.tick(1);

    for event in a.events() {
        match event {
            Event::AddPlayer(eid)
            | Event::MovePos(eid, ..)
            | Event::MovePosRot(eid, ..)
            | Event::MoveRot(eid, ..)
            | Event::RotateHead(eid, ..)
            | Event::TeleportEntity(eid, ..) => {
                assert_ne!(eid, a_eid, "player must not observe itself")
            }
            _ => {}
        }
    }
}

#[test]
fn packet_selection_follows_what_changed() {
    let world = test_world();
    let (_a, a_inputs, a_eid) = join(&world, DVec3::new(0.0, 100.0, 0.0), 2);
    let (b, _bi, _) = join(&world, DVec3::new(5.0, 100.0, 5.0), 2);
    world.tick(0);
    b.take_events();

    // Position only.
    set_input_position(&a_inputs, DVec3::new(0.5, 100.0, 0.0));
    world.tick(1);
    let events = b.take_events();
    assert!(events.contains(&Event::MovePos(a_eid, [2048, 0, 0], false)));
    assert!(!events.iter().any(|e| matches!(e, Event::RotateHead(..))));

    // Rotation only.
    set_input_rotation(&a_inputs, Vec2::new(90.0, 0.0));
    world.tick(2);
    let events = b.take_events();
    assert!(events.contains(&Event::MoveRot(a_eid, [64, 0], false)));
    assert!(events.contains(&Event::RotateHead(a_eid, 64)));

    // Both at once.
    {
        set_input_position(&a_inputs, DVec3::new(1.5, 100.0, 0.0));
        set_input_rotation(&a_inputs, Vec2::new(180.0, 10.0));
    }
    world.tick(3);
    let events = b.take_events();
    let both = events
        .iter()
        .any(|e| matches!(e, Event::MovePosRot(eid, ..) if *eid == a_eid));
    assert!(both, "combined packet expected");
    assert!(events.iter().any(|e| matches!(e, Event::RotateHead(a, -128) if *a == a_eid)));

    // No change, no packet.
    world.tick(4);
    assert!(b.take_events().is_empty());
}

#[test]
fn displacement_past_the_delta_range_teleports_the_entity() {
    let world = test_world();
    let (_a, a_inputs, a_eid) = join(&world, DVec3::new(0.0, 100.0, 0.0), 2);
    let (b, _bi, _) = join(&world, DVec3::new(5.0, 100.0, 5.0), 2);
    world.tick(0);
    b.take_events();

    let target = DVec3::new(12.0, 100.0, 0.0);
    set_input_position(&a_inputs, target);
    world.tick(1);
    let events = b.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::TeleportEntity(eid, pos, ..) if *eid == a_eid && *pos == target)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::MovePos(eid, ..) | Event::MovePosRot(eid, ..) if *eid == a_eid)));
}

#[test]
fn leaving_an_observer_view_culls_the_entity() {
    let world = test_world();
    let (_a, a_inputs, a_eid) = join(&world, DVec3::new(0.0, 100.0, 0.0), 2);
    let (b, _bi, _) = join(&world, DVec3::new(5.0, 100.0, 5.0), 2);
    world.tick(0);
    assert!(world.sees_entity(&b, a_eid));
    b.take_events();

    // 90 blocks east: outside b's 32-block view cube, below the speed cap.
    set_input_position(&a_inputs, DVec3::new(90.0, 100.0, 0.0));
    world.tick(1); // commit the move
    world.tick(2); // next player subtick culls
    assert!(!world.sees_entity(&b, a_eid));
    assert!(b.events().contains(&Event::RemoveEntities(vec![a_eid])));
}

#[test]
fn removing_a_player_notifies_its_observers() {
    let world = test_world();
    let (a, _ai, a_eid) = join(&world, DVec3::new(0.0, 100.0, 0.0), 2);
    let (b, _bi, _) = join(&world, DVec3::new(5.0, 100.0, 5.0), 2);
    world.tick(0);
    assert!(world.sees_entity(&b, a_eid));

    world.remove_player(&a);
    assert!(!world.sees_entity(&b, a_eid));
    assert!(b.events().contains(&Event::RemoveEntities(vec![a_eid])));
}
