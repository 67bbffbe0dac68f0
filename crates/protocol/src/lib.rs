use avian3d::prelude::*;
use bevy::platform::collections::HashMap;
use bevy::prelude::*;
use leafwing_input_manager::prelude::*;
use lightyear::prelude::*;
use serde::{Deserialize, Serialize};

pub mod ability;
pub mod clock;
pub mod resource;

pub use ability::{
    ability_action_to_slot, slot_to_ability_action, AbilityActivated, AbilityAuthorityPlugin,
    AbilityCatalog, AbilityCatalogPlugin, AbilityChannel, AbilityClientPlugin, AbilityController,
    AbilityDef, AbilityDescriptor, AbilityEffect, AbilityFailed, AbilityFeedback, AbilityId,
    AbilityInstance, AbilityInstanceId, AbilityKind, AbilityLoadout, AbilitySettings,
    AbilitySlotTable, AbilitySucceeded, AbilitySystems, ActivationContext, ActiveShield,
    FailureReason, FeedbackKind, GrantPowerUp, Missile, RequestId, RevokePowerUp,
    SharedAbilityPlugin, SlotError, SlotId, UseAbility,
};
pub use clock::{AbilityClock, AbilityClockPlugin};
pub use resource::{ResourcePool, ResourcePoolChanged};

pub const PROTOCOL_ID: u64 = 0;
pub const PRIVATE_KEY: [u8; 32] = [0; 32];
pub const FIXED_TIMESTEP_HZ: f64 = 64.0;

pub const CHARACTER_CAPSULE_RADIUS: f32 = 0.5;
pub const CHARACTER_CAPSULE_HEIGHT: f32 = 1.0;

/// One action per ability slot.
#[derive(Actionlike, Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash, Reflect)]
pub enum PlayerActions {
    Ability1,
    Ability2,
    Ability3,
    Ability4,
}

/// Network-stable identity of a character. Entity ids differ between server
/// and clients; every ability message names its character by this instead.
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub struct NetId(pub u64);

/// Maps [`NetId`] to the local entity. Kept current by observers.
#[derive(Resource, Default, Debug)]
pub struct NetIdIndex {
    entities: HashMap<NetId, Entity>,
}

impl NetIdIndex {
    pub fn get(&self, id: NetId) -> Option<Entity> {
        self.entities.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

pub fn index_net_id(trigger: On<Add, NetId>, ids: Query<&NetId>, mut index: ResMut<NetIdIndex>) {
    let Ok(id) = ids.get(trigger.entity) else {
        return;
    };
    if let Some(previous) = index.entities.insert(*id, trigger.entity) {
        if previous != trigger.entity {
            warn!("{id:?} moved from {previous:?} to {:?}", trigger.entity);
        }
    }
}

pub fn unindex_net_id(trigger: On<Remove, NetId>, ids: Query<&NetId>, mut index: ResMut<NetIdIndex>) {
    let Ok(id) = ids.get(trigger.entity) else {
        return;
    };
    if index.entities.get(id) == Some(&trigger.entity) {
        index.entities.remove(id);
    }
}

#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CharacterMarker;

/// The character this process controls. Client-only, never replicated.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct LocalPlayer;

#[derive(Bundle)]
pub struct CharacterPhysicsBundle {
    pub collider: Collider,
    pub rigid_body: RigidBody,
    pub locked_axes: LockedAxes,
    pub friction: Friction,
}

impl Default for CharacterPhysicsBundle {
    fn default() -> Self {
        Self {
            collider: Collider::capsule(CHARACTER_CAPSULE_RADIUS, CHARACTER_CAPSULE_HEIGHT),
            rigid_body: RigidBody::Dynamic,
            locked_axes: LockedAxes::ROTATION_LOCKED,
            friction: Friction::default(),
        }
    }
}

/// Registers the ability channel, messages and replicated components with
/// lightyear. Server and client both add it.
pub struct ProtocolPlugin;

impl Plugin for ProtocolPlugin {
    fn build(&self, app: &mut App) {
        app.add_channel::<AbilityChannel>(ChannelSettings {
            mode: ChannelMode::OrderedReliable(ReliableSettings::default()),
            ..default()
        })
        .add_direction(NetworkDirection::Bidirectional);

        app.register_message::<UseAbility>()
            .add_direction(NetworkDirection::ClientToServer);
        app.register_message::<AbilitySucceeded>()
            .add_direction(NetworkDirection::ServerToClient);
        app.register_message::<AbilityFailed>()
            .add_direction(NetworkDirection::ServerToClient);

        app.register_component::<NetId>();
        app.register_component::<Name>();
        app.register_component::<CharacterMarker>();
        app.register_component::<ResourcePool>();
        app.register_component::<AbilityLoadout>();
        app.register_component::<Position>();
        app.register_component::<Rotation>();
        app.register_component::<LinearVelocity>();
    }
}

/// Everything both binaries share: the lightyear protocol, the ability clock,
/// the catalog asset and physics. Role plugins are added on top.
pub struct SharedGameplayPlugin;

impl Plugin for SharedGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(ProtocolPlugin);
        app.add_plugins(AbilityClockPlugin);
        app.add_plugins(AbilityCatalogPlugin);

        app.add_plugins(
            PhysicsPlugins::default()
                .build()
                .disable::<PhysicsTransformPlugin>()
                .disable::<PhysicsInterpolationPlugin>()
                .disable::<IslandSleepingPlugin>(),
        );
    }
}

#[cfg(feature = "test_utils")]
pub mod test_utils;
