use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::resource::{self, ResourcePool, ResourcePoolChanged};
use crate::{AbilityClock, NetIdIndex, PlayerActions};

pub mod authority;
pub mod bootstrap;
pub mod catalog;
pub mod client;
pub mod cooldown;
pub mod effects;
pub mod instance;
pub mod loadout;
pub mod messages;
pub mod power_up;
pub mod slots;

pub use authority::authorize_ability_requests;
pub use bootstrap::{build_controller, AbilityBootstrap};
pub use catalog::{AbilityCatalog, AbilityCatalogPlugin, AbilityDef, AbilityKind};
pub use client::{apply_ability_outcomes, expire_pending_requests, gate_ability_input};
pub use effects::{ActiveShield, Missile, MissileHit, MISSILE_HIT_RADIUS};
pub use instance::{
    AbilityDescriptor, AbilityEffect, AbilityInstance, AbilityPhase, ActivationContext,
    ActivationError, ApplyError,
};
pub use loadout::{AbilityLoadout, LoadoutEntry};
pub use messages::{
    AbilityActivated, AbilityChannel, AbilityFailed, AbilityFeedback, AbilitySucceeded,
    FailureReason, FeedbackKind, UseAbility,
};
pub use power_up::{GrantPowerUp, PowerUpTimers, RevokePowerUp};
pub use cooldown::SlotResync;
pub use slots::{register_power_up, unregister_power_up, AbilityController, AbilitySlotTable};

/// Number of slots every character exposes: two base, two power-up.
pub const SLOT_COUNT: usize = 4;

pub const ABILITY_ACTIONS: [PlayerActions; SLOT_COUNT] = [
    PlayerActions::Ability1,
    PlayerActions::Ability2,
    PlayerActions::Ability3,
    PlayerActions::Ability4,
];

/// Catalog key of an ability definition, e.g. `"dash"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Reflect)]
#[serde(transparent)]
pub struct AbilityId(pub String);

impl AbilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AbilityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for AbilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable slot identifier. Always in `0..SLOT_COUNT`; deserializing an out of
/// range value fails instead of producing a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Reflect)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotId(u8);

impl SlotId {
    pub const BASE_PRIMARY: SlotId = SlotId(0);
    pub const BASE_SECONDARY: SlotId = SlotId(1);
    pub const POWER_UP_A: SlotId = SlotId(2);
    pub const POWER_UP_B: SlotId = SlotId(3);
    pub const ALL: [SlotId; SLOT_COUNT] = [
        Self::BASE_PRIMARY,
        Self::BASE_SECONDARY,
        Self::POWER_UP_A,
        Self::POWER_UP_B,
    ];

    pub fn new(index: u8) -> Result<Self, SlotError> {
        if usize::from(index) < SLOT_COUNT {
            Ok(Self(index))
        } else {
            Err(SlotError::OutOfRange(index))
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn is_power_up(self) -> bool {
        self.0 >= Self::POWER_UP_A.0
    }

    /// Input action that triggers this slot.
    pub fn action(self) -> PlayerActions {
        ABILITY_ACTIONS[self.index()]
    }
}

impl TryFrom<u8> for SlotId {
    type Error = SlotError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl From<SlotId> for u8 {
    fn from(slot: SlotId) -> Self {
        slot.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Identity of one ability instance within a character's loadout. A slot that
/// is reassigned always gets a fresh id, so a request naming the old id can
/// never land on the new occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
pub struct AbilityInstanceId(pub u32);

/// Client-chosen id of one activation attempt, echoed in the verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
pub struct RequestId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("slot index {0} is out of range")]
    OutOfRange(u8),
    #[error("{0} is a base slot")]
    NotPowerUpSlot(SlotId),
}

pub fn slot_to_ability_action(slot: SlotId) -> PlayerActions {
    slot.action()
}

pub fn ability_action_to_slot(action: &PlayerActions) -> Option<SlotId> {
    ABILITY_ACTIONS
        .iter()
        .position(|a| a == action)
        .map(|i| SlotId::ALL[i])
}

/// Tunables shared by server and clients.
#[derive(Resource, Clone, Debug)]
pub struct AbilitySettings {
    /// Seconds between slot-table resyncs.
    pub resync_interval: f64,
    /// Seconds a client waits for a verdict before giving up on a request.
    pub request_timeout: f64,
    pub bootstrap_retry_delay: f64,
    pub bootstrap_max_attempts: u32,
    /// Loadout applied when bootstrap runs out of attempts.
    pub fallback_loadout: Vec<(SlotId, AbilityId)>,
    pub fallback_pool: ResourcePool,
}

impl Default for AbilitySettings {
    fn default() -> Self {
        Self {
            resync_interval: 0.1,
            request_timeout: 2.0,
            bootstrap_retry_delay: 0.5,
            bootstrap_max_attempts: 3,
            fallback_loadout: vec![
                (SlotId::BASE_PRIMARY, AbilityId::new("dash")),
                (SlotId::BASE_SECONDARY, AbilityId::new("strong_jump")),
            ],
            fallback_pool: ResourcePool::new(100.0, 100.0, 5.0),
        }
    }
}

/// Per-frame ordering of ability systems. Chained in this order in `Update`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbilitySystems {
    /// Server-side loadout edits (power-ups).
    Loadout,
    Bootstrap,
    Cooldowns,
    /// Client input gate and request timeouts.
    Input,
    /// Server verdicts.
    Authorize,
    /// Client application of verdicts.
    Apply,
    Effects,
    Resync,
}

/// Systems and types every process runs: bootstrap, loadout reconciliation,
/// cooldown ticking, effects, slot-table resync.
pub struct SharedAbilityPlugin;

impl Plugin for SharedAbilityPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<UseAbility>()
            .add_message::<AbilitySucceeded>()
            .add_message::<AbilityFailed>()
            .add_message::<AbilityActivated>()
            .add_message::<AbilityFeedback>()
            .add_message::<ResourcePoolChanged>()
            .add_message::<GrantPowerUp>()
            .add_message::<RevokePowerUp>()
            .add_message::<MissileHit>();

        app.init_resource::<AbilityClock>()
            .init_resource::<AbilitySettings>()
            .init_resource::<NetIdIndex>()
            .init_resource::<SlotResync>();
        if !app.world().contains_resource::<AbilityCatalog>() {
            app.insert_resource(AbilityCatalog::builtin());
        }

        app.add_observer(crate::index_net_id)
            .add_observer(crate::unindex_net_id)
            .add_observer(bootstrap::begin_ability_bootstrap)
            .add_observer(bootstrap::cleanup_ability_controller);

        app.configure_sets(
            Update,
            (
                AbilitySystems::Loadout,
                AbilitySystems::Bootstrap,
                AbilitySystems::Cooldowns,
                AbilitySystems::Input,
                AbilitySystems::Authorize,
                AbilitySystems::Apply,
                AbilitySystems::Effects,
                AbilitySystems::Resync,
            )
                .chain(),
        );

        app.add_systems(
            Update,
            (
                (bootstrap::bootstrap_abilities, loadout::reconcile_loadout)
                    .chain()
                    .in_set(AbilitySystems::Bootstrap),
                cooldown::tick_cooldowns.in_set(AbilitySystems::Cooldowns),
                (
                    effects::apply_ability_effects,
                    effects::update_missiles,
                    effects::resolve_missile_hits,
                    effects::expire_shields,
                )
                    .chain()
                    .in_set(AbilitySystems::Effects),
                (
                    cooldown::resync_slot_tables,
                    resource::notify_resource_changes,
                )
                    .in_set(AbilitySystems::Resync),
            ),
        );
    }
}

/// Server role: authorizes requests, owns resource mutation and power-ups.
pub struct AbilityAuthorityPlugin;

impl Plugin for AbilityAuthorityPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<SharedAbilityPlugin>() {
            app.add_plugins(SharedAbilityPlugin);
        }
        app.add_systems(
            Update,
            (
                (
                    power_up::apply_power_up_grants,
                    power_up::apply_power_up_revocations,
                    power_up::expire_power_ups,
                )
                    .chain()
                    .in_set(AbilitySystems::Loadout),
                resource::regenerate_mana.in_set(AbilitySystems::Cooldowns),
                authorize_ability_requests.in_set(AbilitySystems::Authorize),
                effects::apply_missile_damage
                    .after(effects::resolve_missile_hits)
                    .in_set(AbilitySystems::Effects),
            ),
        );
    }
}

/// Client role: input gate, verdict application, request timeouts.
pub struct AbilityClientPlugin;

impl Plugin for AbilityClientPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<SharedAbilityPlugin>() {
            app.add_plugins(SharedAbilityPlugin);
        }
        app.add_systems(
            Update,
            (
                (gate_ability_input, expire_pending_requests).in_set(AbilitySystems::Input),
                apply_ability_outcomes.in_set(AbilitySystems::Apply),
            ),
        );
    }
}
