use avian3d::prelude::*;
use bevy::prelude::*;
use lightyear::prelude::server::ClientOf;
use lightyear::prelude::{
    Connected, ControlledBy, MessageReceiver, NetworkTarget, RemoteId, Replicate, Server,
    ServerMultiMessageSender,
};
use protocol::*;

pub struct ServerGameplayPlugin;

impl Plugin for ServerGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(AbilityAuthorityPlugin);
        app.init_resource::<NetIdAllocator>();
        app.add_observer(handle_connected);
        app.add_systems(Startup, (spawn_ground, spawn_power_up_pads));
        app.add_systems(
            Update,
            (
                collect_power_ups.before(AbilitySystems::Loadout),
                receive_ability_requests.in_set(AbilitySystems::Input),
                broadcast_ability_outcomes.in_set(AbilitySystems::Resync),
            ),
        );
    }
}

/// Hands out [`NetId`]s in connection order, starting at 1.
#[derive(Resource, Debug)]
pub struct NetIdAllocator {
    next: u64,
}

impl Default for NetIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl NetIdAllocator {
    pub fn allocate(&mut self) -> NetId {
        let id = NetId(self.next);
        self.next += 1;
        id
    }
}

/// Standing on a ready pad grants its ability in a power-up slot.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct PowerUpPad {
    pub slot: SlotId,
    pub ability: AbilityId,
    pub duration: Option<f64>,
    pub radius: f32,
    pub rearm_after: f64,
    pub ready_at: f64,
}

/// Gameplay state of a freshly connected character, without networking or
/// physics.
pub fn character_components(
    net_id: NetId,
    position: Vec3,
    settings: &AbilitySettings,
) -> impl Bundle {
    (
        Name::new("Character"),
        net_id,
        CharacterMarker,
        Position(position),
        Rotation::default(),
        LinearVelocity::default(),
        settings.fallback_pool.clone(),
        AbilityLoadout::from_abilities(settings.fallback_loadout.iter().cloned()),
    )
}

fn spawn_position(index: u64) -> Vec3 {
    let angle = index as f32 * 5.0;
    Vec3::new(2.0 * angle.cos(), 1.0, 2.0 * angle.sin())
}

fn handle_connected(
    trigger: On<Add, Connected>,
    mut commands: Commands,
    mut allocator: ResMut<NetIdAllocator>,
    settings: Res<AbilitySettings>,
    remote_ids: Query<&RemoteId, With<ClientOf>>,
) {
    let client_entity = trigger.entity;
    let Ok(remote_id) = remote_ids.get(client_entity) else {
        return;
    };
    let net_id = allocator.allocate();
    info!("Client {} connected. Spawning character {net_id:?}.", remote_id.0);

    commands.spawn((
        character_components(net_id, spawn_position(net_id.0), &settings),
        Replicate::to_clients(NetworkTarget::All),
        ControlledBy {
            owner: client_entity,
            lifetime: Default::default(),
        },
        CharacterPhysicsBundle::default(),
    ));
}

fn spawn_ground(mut commands: Commands) {
    commands.spawn((
        Name::new("Ground"),
        RigidBody::Static,
        Collider::cuboid(100.0, 1.0, 100.0),
        Position(Vec3::new(0.0, -0.5, 0.0)),
    ));
}

fn spawn_power_up_pads(mut commands: Commands) {
    commands.spawn((
        Name::new("Kinetic Shield Pad"),
        Position(Vec3::new(8.0, 0.0, 0.0)),
        PowerUpPad {
            slot: SlotId::POWER_UP_A,
            ability: AbilityId::new("kinetic_shield"),
            duration: Some(20.0),
            radius: 1.5,
            rearm_after: 10.0,
            ready_at: 0.0,
        },
    ));
    commands.spawn((
        Name::new("Supersonic Missile Pad"),
        Position(Vec3::new(-8.0, 0.0, 0.0)),
        PowerUpPad {
            slot: SlotId::POWER_UP_B,
            ability: AbilityId::new("supersonic_missile"),
            duration: Some(15.0),
            radius: 1.5,
            rearm_after: 10.0,
            ready_at: 0.0,
        },
    ));
}

pub fn collect_power_ups(
    clock: Res<AbilityClock>,
    mut pads: Query<(&Position, &mut PowerUpPad)>,
    characters: Query<(Entity, &Position), With<CharacterMarker>>,
    mut grants: MessageWriter<GrantPowerUp>,
) {
    for (pad_position, mut pad) in &mut pads {
        if clock.now < pad.ready_at {
            continue;
        }
        let Some((entity, _)) = characters
            .iter()
            .find(|(_, position)| position.0.distance(pad_position.0) <= pad.radius)
        else {
            continue;
        };
        debug!("{entity:?} picked up {} at {:?}", pad.ability, pad_position.0);
        grants.write(GrantPowerUp {
            entity,
            slot: pad.slot,
            ability: pad.ability.clone(),
            duration: pad.duration,
        });
        pad.ready_at = clock.now + pad.rearm_after;
    }
}

/// Moves requests from client links into the authority. A request naming a
/// character its link does not control is dropped here.
fn receive_ability_requests(
    index: Res<NetIdIndex>,
    mut links: Query<(Entity, &mut MessageReceiver<UseAbility>), With<ClientOf>>,
    owners: Query<&ControlledBy>,
    mut requests: MessageWriter<UseAbility>,
) {
    for (link, mut receiver) in &mut links {
        for request in receiver.receive() {
            let owner = index
                .get(request.entity)
                .and_then(|entity| owners.get(entity).ok())
                .map(|controlled| controlled.owner);
            if owner.is_some_and(|owner| owner != link) {
                warn!(
                    "Dropping {:?} from {link:?}: it does not control {:?}",
                    request.request, request.entity
                );
                continue;
            }
            requests.write(request);
        }
    }
}

/// Successes go to every client, failures only to the owner.
fn broadcast_ability_outcomes(
    server: Single<&Server>,
    index: Res<NetIdIndex>,
    owners: Query<&ControlledBy>,
    remote_ids: Query<&RemoteId, With<ClientOf>>,
    mut succeeded: MessageReader<AbilitySucceeded>,
    mut failed: MessageReader<AbilityFailed>,
    mut sender: ServerMultiMessageSender,
) {
    let server_ref = server.into_inner();

    for outcome in succeeded.read() {
        if let Err(err) =
            sender.send::<_, AbilityChannel>(outcome, server_ref, &NetworkTarget::All)
        {
            error!("Failed to broadcast {:?}: {err:?}", outcome.request);
        }
    }

    for outcome in failed.read() {
        let peer = index
            .get(outcome.entity)
            .and_then(|entity| owners.get(entity).ok())
            .and_then(|controlled| remote_ids.get(controlled.owner).ok())
            .map(|remote_id| remote_id.0);
        let Some(peer) = peer else {
            warn!("No owner to tell about {:?} on {:?}", outcome.request, outcome.entity);
            continue;
        };
        if let Err(err) =
            sender.send::<_, AbilityChannel>(outcome, server_ref, &NetworkTarget::Single(peer))
        {
            error!("Failed to send {:?} to {peer}: {err:?}", outcome.request);
        }
    }
}
