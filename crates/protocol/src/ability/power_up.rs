use bevy::platform::collections::HashMap;
use bevy::prelude::*;

use super::{AbilityCatalog, AbilityId, AbilityLoadout, SlotId, SLOT_COUNT};
use crate::AbilityClock;

/// Server request to place `ability` in a power-up slot, optionally for a
/// limited time.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct GrantPowerUp {
    pub entity: Entity,
    pub slot: SlotId,
    pub ability: AbilityId,
    pub duration: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Message)]
pub struct RevokePowerUp {
    pub entity: Entity,
    pub slot: SlotId,
}

/// Expiry time per slot for timed power-ups. Server-only.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct PowerUpTimers {
    expires_at: [Option<f64>; SLOT_COUNT],
}

impl PowerUpTimers {
    pub fn get(&self, slot: SlotId) -> Option<f64> {
        self.expires_at[slot.index()]
    }

    pub fn set(&mut self, slot: SlotId, expires_at: Option<f64>) {
        self.expires_at[slot.index()] = expires_at;
    }
}

pub fn apply_power_up_grants(
    clock: Res<AbilityClock>,
    catalog: Res<AbilityCatalog>,
    mut commands: Commands,
    mut grants: MessageReader<GrantPowerUp>,
    mut characters: Query<(&mut AbilityLoadout, Option<&mut PowerUpTimers>)>,
) {
    // Timers for characters that had none; inserted once after every grant
    // of the frame is applied.
    let mut new_timers: HashMap<Entity, PowerUpTimers> = HashMap::default();
    for grant in grants.read() {
        if !grant.slot.is_power_up() {
            warn!("Refusing power-up {} in base {}", grant.ability, grant.slot);
            continue;
        }
        if catalog.get(&grant.ability).is_none() {
            warn!("Refusing unknown power-up {}", grant.ability);
            continue;
        }
        let Ok((mut loadout, timers)) = characters.get_mut(grant.entity) else {
            warn!("Power-up for {:?} without a loadout", grant.entity);
            continue;
        };

        let instance = loadout.assign(grant.slot, grant.ability.clone());
        let expires_at = grant.duration.map(|d| clock.now + d);
        match timers {
            Some(mut timers) => timers.set(grant.slot, expires_at),
            None => new_timers
                .entry(grant.entity)
                .or_default()
                .set(grant.slot, expires_at),
        }
        info!(
            "{:?} gained {} in {} as {instance:?}",
            grant.entity, grant.ability, grant.slot
        );
    }
    for (entity, timers) in new_timers {
        commands.entity(entity).insert(timers);
    }
}

pub fn apply_power_up_revocations(
    mut revocations: MessageReader<RevokePowerUp>,
    mut characters: Query<(&mut AbilityLoadout, Option<&mut PowerUpTimers>)>,
) {
    for revoke in revocations.read() {
        if !revoke.slot.is_power_up() {
            warn!("Refusing to revoke base {} of {:?}", revoke.slot, revoke.entity);
            continue;
        }
        let Ok((mut loadout, timers)) = characters.get_mut(revoke.entity) else {
            continue;
        };
        if let Some(mut timers) = timers {
            timers.set(revoke.slot, None);
        }
        if let Some(entry) = loadout.clear(revoke.slot) {
            info!("{:?} lost {} from {}", revoke.entity, entry.ability, revoke.slot);
        }
    }
}

pub fn expire_power_ups(
    clock: Res<AbilityClock>,
    mut characters: Query<(Entity, &mut AbilityLoadout, &mut PowerUpTimers)>,
) {
    for (entity, mut loadout, mut timers) in &mut characters {
        for slot in [SlotId::POWER_UP_A, SlotId::POWER_UP_B] {
            let Some(expires_at) = timers.get(slot) else {
                continue;
            };
            if clock.now < expires_at {
                continue;
            }
            timers.set(slot, None);
            if let Some(entry) = loadout.clear(slot) {
                info!("{entity:?}: {} in {slot} expired", entry.ability);
            }
        }
    }
}
