use approx::assert_relative_eq;
use bevy::prelude::*;
use protocol::ability::{AbilityBootstrap, AbilityPhase};
use protocol::test_utils::{CharacterHandle, Loopback};
use protocol::*;

fn base_loadout() -> AbilityLoadout {
    AbilityLoadout::from_abilities([
        (SlotId::BASE_PRIMARY, "dash".into()),
        (SlotId::BASE_SECONDARY, "strong_jump".into()),
    ])
}

fn full_pool() -> ResourcePool {
    ResourcePool::new(100.0, 100.0, 0.0)
}

/// Two clients, one character owned by client 0, settled at t=0.
fn setup() -> (Loopback, CharacterHandle) {
    let mut lb = Loopback::new(2);
    let hero = lb.spawn_character(1, 0, full_pool(), base_loadout());
    lb.set_time(0.0);
    lb.update();
    (lb, hero)
}

fn client_ability(
    lb: &Loopback,
    hero: &CharacterHandle,
    client: usize,
    slot: SlotId,
) -> Option<AbilityInstance> {
    lb.clients[client]
        .world()
        .get::<AbilityController>(hero.clients[client])
        .and_then(|c| c.get(slot).cloned())
}

fn server_ability(lb: &Loopback, hero: &CharacterHandle, slot: SlotId) -> Option<AbilityInstance> {
    lb.server
        .world()
        .get::<AbilityController>(hero.server)
        .and_then(|c| c.get(slot).cloned())
}

fn client_pool(lb: &Loopback, hero: &CharacterHandle, client: usize) -> ResourcePool {
    lb.clients[client]
        .world()
        .get::<ResourcePool>(hero.clients[client])
        .cloned()
        .unwrap()
}

#[test]
fn dash_activation_round_trip() {
    let (mut lb, hero) = setup();

    lb.press(&hero, SlotId::BASE_PRIMARY);
    lb.update();
    assert_eq!(lb.sent.len(), 1, "Press should send exactly one request");
    assert_relative_eq!(lb.server_pool(&hero).mana, 70.0);
    let server_dash = server_ability(&lb, &hero, SlotId::BASE_PRIMARY).unwrap();
    assert_relative_eq!(server_dash.cooldown_end(), 3.0);

    lb.update();
    let dash = client_ability(&lb, &hero, 0, SlotId::BASE_PRIMARY).unwrap();
    assert!(!dash.is_ready());
    assert_relative_eq!(dash.cooldown_end(), 3.0);
    assert_relative_eq!(client_pool(&lb, &hero, 0).mana, 70.0);

    // Second attempt while cooling down: no traffic, no pool change.
    lb.set_time(1.0);
    lb.press(&hero, SlotId::BASE_PRIMARY);
    lb.update();
    lb.update();
    assert_eq!(lb.sent.len(), 1, "Cooling-down ability must not send a request");
    assert_relative_eq!(lb.server_pool(&hero).mana, 70.0);
    assert!(lb.drain_feedback(0).is_empty());
}

#[test]
fn insufficient_resource_is_rejected_by_server_only_for_owner() {
    let mut lb = Loopback::new(2);
    let mut loadout = base_loadout();
    loadout.assign(SlotId::POWER_UP_A, "supersonic_missile".into());
    let hero = lb.spawn_character(1, 0, full_pool(), loadout);
    lb.set_time(0.0);
    lb.update();

    // The client believes it can afford the missile; the server knows better.
    lb.clients[0]
        .world_mut()
        .get_mut::<ResourcePool>(hero.clients[0])
        .unwrap()
        .mana = 200.0;
    lb.hold_replication(true);

    lb.press(&hero, SlotId::POWER_UP_A);
    lb.update();
    assert_eq!(lb.sent.len(), 1);
    assert_relative_eq!(lb.server_pool(&hero).mana, 100.0);
    assert_eq!(lb.failures_delivered.len(), 1);
    assert_eq!(lb.failures_delivered[0].0, 0, "Failure goes to the owner");
    assert_eq!(
        lb.failures_delivered[0].1.reason,
        FailureReason::InsufficientResource
    );
    assert_eq!(lb.successes_delivered, 0);

    lb.update();
    let missile = client_ability(&lb, &hero, 0, SlotId::POWER_UP_A).unwrap();
    assert!(missile.is_ready(), "Rejection must not start a cooldown");
    assert_eq!(missile.phase(), AbilityPhase::Ready);
    let feedback = lb.drain_feedback(0);
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].reason(), Some(FailureReason::InsufficientResource));

    let observer = client_ability(&lb, &hero, 1, SlotId::POWER_UP_A).unwrap();
    assert!(observer.is_ready());
    assert!(lb.drain_feedback(1).is_empty());
}

#[test]
fn local_shortfall_sends_nothing() {
    let mut lb = Loopback::new(1);
    let mut loadout = base_loadout();
    loadout.assign(SlotId::POWER_UP_A, "supersonic_missile".into());
    let hero = lb.spawn_character(1, 0, full_pool(), loadout);
    lb.set_time(0.0);
    lb.update();

    lb.press(&hero, SlotId::POWER_UP_A);
    lb.update();
    assert!(lb.sent.is_empty());
    let feedback = lb.drain_feedback(0);
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].reason(), Some(FailureReason::InsufficientResource));
    assert_relative_eq!(lb.server_pool(&hero).mana, 100.0);
}

#[test]
fn every_observer_applies_success_in_same_step() {
    let (mut lb, hero) = setup();
    lb.press(&hero, SlotId::BASE_SECONDARY);
    lb.update();

    for client in 0..2 {
        let jump = client_ability(&lb, &hero, client, SlotId::BASE_SECONDARY).unwrap();
        assert!(jump.is_ready(), "No client activates before confirmation");
    }

    lb.update();
    for client in 0..2 {
        let jump = client_ability(&lb, &hero, client, SlotId::BASE_SECONDARY).unwrap();
        assert!(!jump.is_ready(), "Client {client} missed the confirmation");
        let velocity = lb.clients[client]
            .world()
            .get::<avian3d::prelude::LinearVelocity>(hero.clients[client])
            .unwrap();
        assert_relative_eq!(velocity.0.y, 12.0);
    }
}

#[test]
fn pool_only_drops_on_confirmed_success() {
    let (mut lb, hero) = setup();
    let mut expected = 100.0;
    for step in 0..12 {
        lb.set_time(step as f64 * 0.5);
        lb.press(&hero, SlotId::ALL[step % 2]);
        let before = lb.successes_delivered;
        lb.update();
        let confirmed = lb.successes_delivered - before;
        if confirmed > 0 {
            let slot = lb.sent.last().unwrap().slot;
            expected -= if slot == 0 { 30.0 } else { 20.0 };
        }
        assert_relative_eq!(lb.server_pool(&hero).mana, expected);
    }
    assert!(expected < 100.0);
}

#[test_log::test]
fn stale_power_up_request_is_rejected() {
    let (mut lb, hero) = setup();

    lb.server.world_mut().write_message(GrantPowerUp {
        entity: hero.server,
        slot: SlotId::POWER_UP_A,
        ability: "kinetic_shield".into(),
        duration: None,
    });
    lb.update();
    lb.update();
    let kinetic = client_ability(&lb, &hero, 0, SlotId::POWER_UP_A).unwrap();
    assert_eq!(kinetic.ability().as_str(), "kinetic_shield");
    let stale = kinetic.id();

    lb.set_time(2.0);
    lb.server.world_mut().write_message(RevokePowerUp {
        entity: hero.server,
        slot: SlotId::POWER_UP_A,
    });
    lb.update();
    lb.update();
    assert!(client_ability(&lb, &hero, 0, SlotId::POWER_UP_A).is_none());
    let table = lb.clients[0]
        .world()
        .get::<AbilitySlotTable>(hero.clients[0])
        .unwrap();
    assert!(table.descriptor(2).unwrap().is_empty());

    lb.set_time(2.5);
    lb.inject_request(UseAbility {
        entity: hero.net_id,
        slot: 2,
        instance: stale,
        request: RequestId(40),
    });
    lb.update();
    assert_eq!(lb.successes_delivered, 0);
    assert!(lb.failures_delivered.is_empty());
    assert_relative_eq!(lb.server_pool(&hero).mana, 100.0);

    // A different ability now sits in slot 2; the old id must not reach it.
    lb.server.world_mut().write_message(GrantPowerUp {
        entity: hero.server,
        slot: SlotId::POWER_UP_A,
        ability: "shield".into(),
        duration: None,
    });
    lb.update();
    lb.inject_request(UseAbility {
        entity: hero.net_id,
        slot: 2,
        instance: stale,
        request: RequestId(41),
    });
    lb.update();
    assert_eq!(lb.successes_delivered, 0);
    let shield = server_ability(&lb, &hero, SlotId::POWER_UP_A).unwrap();
    assert_ne!(shield.id(), stale);
    assert!(shield.is_ready());
    assert_relative_eq!(lb.server_pool(&hero).mana, 100.0);
}

#[test_log::test]
fn malformed_requests_are_dropped() {
    let (mut lb, hero) = setup();
    lb.inject_request(UseAbility {
        entity: hero.net_id,
        slot: 9,
        instance: AbilityInstanceId(1),
        request: RequestId(1),
    });
    lb.inject_request(UseAbility {
        entity: NetId(999),
        slot: 0,
        instance: AbilityInstanceId(1),
        request: RequestId(2),
    });
    lb.update();
    assert_eq!(lb.successes_delivered, 0);
    assert!(lb.failures_delivered.is_empty());
    assert_relative_eq!(lb.server_pool(&hero).mana, 100.0);
}

#[test]
fn repeated_delivery_applies_once() {
    let (mut lb, hero) = setup();
    let dash = server_ability(&lb, &hero, SlotId::BASE_PRIMARY).unwrap();
    let request = UseAbility {
        entity: hero.net_id,
        slot: 0,
        instance: dash.id(),
        request: RequestId(5),
    };
    lb.inject_request(request.clone());
    lb.inject_request(request);
    lb.update();
    assert_eq!(lb.successes_delivered, 1);
    assert!(lb.failures_delivered.is_empty());
    assert_relative_eq!(lb.server_pool(&hero).mana, 70.0);

    // The same verdict arriving twice on a client.
    let success = AbilitySucceeded {
        entity: hero.net_id,
        slot: SlotId::BASE_PRIMARY,
        instance: dash.id(),
        request: RequestId(5),
    };
    lb.clients[1].world_mut().write_message(success);
    lb.update();
    let observed = client_ability(&lb, &hero, 1, SlotId::BASE_PRIMARY).unwrap();
    assert_relative_eq!(observed.cooldown_end(), 3.0);
}

#[test_log::test]
fn failed_apply_returns_the_cost() {
    let (mut lb, hero) = setup();
    let dash_id = {
        let mut controller = lb
            .server
            .world_mut()
            .get_mut::<AbilityController>(hero.server)
            .unwrap();
        let dash = controller.get_mut(SlotId::BASE_PRIMARY).unwrap();
        let ctx = ActivationContext {
            now: 0.0,
            available: 100.0,
            speed: 0.0,
        };
        // Applied but its cooldown never started.
        dash.activate(RequestId(90), &ctx).unwrap();
        dash.id()
    };

    lb.inject_request(UseAbility {
        entity: hero.net_id,
        slot: 0,
        instance: dash_id,
        request: RequestId(6),
    });
    lb.update();
    assert_eq!(lb.successes_delivered, 0);
    assert_relative_eq!(lb.server_pool(&hero).mana, 100.0);
}

#[test]
fn late_replication_bootstraps_on_retry() {
    let mut lb = Loopback::new(1);
    lb.set_time(0.0);
    lb.hold_replication(true);
    let hero = lb.spawn_character(1, 0, full_pool(), base_loadout());
    lb.update();

    let client = hero.clients[0];
    assert!(lb.clients[0].world().get::<AbilityController>(client).is_none());
    let table = lb.clients[0].world().get::<AbilitySlotTable>(client).unwrap();
    for index in 0..table.slot_count() {
        let descriptor = table.descriptor(index).unwrap();
        assert_eq!(descriptor, &AbilityDescriptor::default());
        assert_eq!(table.remaining_cooldown(index, 0.0), 0.0);
    }

    lb.hold_replication(false);
    lb.replicate();
    lb.set_time(0.5);
    lb.update();
    let controller = lb.clients[0].world().get::<AbilityController>(client).unwrap();
    assert_eq!(controller.len(), 2);
    assert!(lb.clients[0].world().get::<AbilityBootstrap>(client).is_none());
    let server_ids: Vec<_> = lb
        .server
        .world()
        .get::<AbilityController>(hero.server)
        .unwrap()
        .iter()
        .map(|(slot, a)| (slot, a.id()))
        .collect();
    let client_ids: Vec<_> = controller.iter().map(|(slot, a)| (slot, a.id())).collect();
    assert_eq!(server_ids, client_ids, "Instance ids must agree across processes");
}

#[test]
fn unanswered_request_times_out() {
    let (mut lb, hero) = setup();
    let dash = client_ability(&lb, &hero, 0, SlotId::BASE_PRIMARY).unwrap();

    // The server never sees this one.
    lb.clients[0]
        .world_mut()
        .get_mut::<AbilityController>(hero.clients[0])
        .unwrap()
        .get_mut(SlotId::BASE_PRIMARY)
        .unwrap()
        .begin_request(RequestId(77), 0.0);
    assert!(!client_ability(&lb, &hero, 0, SlotId::BASE_PRIMARY)
        .unwrap()
        .can_activate(&ActivationContext {
            now: 0.0,
            available: 100.0,
            speed: 0.0
        }));

    lb.set_time(2.0);
    lb.update();
    let feedback = lb.drain_feedback(0);
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].kind, FeedbackKind::TimedOut);

    lb.press(&hero, SlotId::BASE_PRIMARY);
    lb.update();
    assert_eq!(lb.sent.last().map(|r| r.instance), Some(dash.id()));
}

#[test]
fn slot_table_tracks_cooldown_for_ui() {
    let (mut lb, hero) = setup();
    lb.press(&hero, SlotId::BASE_PRIMARY);
    lb.update();
    lb.update();

    lb.set_time(1.0);
    lb.update();
    let table = lb.clients[1]
        .world()
        .get::<AbilitySlotTable>(hero.clients[1])
        .unwrap();
    assert_relative_eq!(table.remaining_cooldown(0, 1.0), 2.0);
    assert!(!table.descriptor(0).unwrap().ready);

    lb.set_time(3.05);
    lb.update();
    let table = lb.clients[1]
        .world()
        .get::<AbilitySlotTable>(hero.clients[1])
        .unwrap();
    assert!(table.descriptor(0).unwrap().ready);
    assert_eq!(table.remaining_cooldown(0, 3.05), 0.0);
}
