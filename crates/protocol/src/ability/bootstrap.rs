//! Brings a freshly spawned character to a valid ability set.
//!
//! Replicated components can arrive over several frames, so the first look at
//! a new character may find no loadout or no resource pool. Bootstrap is a
//! small timer state machine: try now, retry after
//! [`AbilitySettings::bootstrap_retry_delay`], and after
//! [`AbilitySettings::bootstrap_max_attempts`] install the fallback set.

use bevy::prelude::*;

use super::{
    AbilityCatalog, AbilityController, AbilityLoadout, AbilitySettings, AbilitySlotTable, SlotId,
};
use crate::resource::ResourcePool;
use crate::{AbilityClock, CharacterMarker};

/// Present on a character until it has an [`AbilityController`].
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct AbilityBootstrap {
    pub attempts: u32,
    pub next_attempt_at: f64,
}

/// Builds a controller holding every slot of `loadout` the catalog knows.
pub fn build_controller(loadout: &AbilityLoadout, catalog: &AbilityCatalog) -> AbilityController {
    let mut controller = AbilityController::with_base(
        loadout.instantiate(SlotId::BASE_PRIMARY, catalog),
        loadout.instantiate(SlotId::BASE_SECONDARY, catalog),
    );
    for slot in [SlotId::POWER_UP_A, SlotId::POWER_UP_B] {
        if let Some(instance) = loadout.instantiate(slot, catalog) {
            // Power-up slots always accept a registration.
            let _ = controller.register_power_up(instance, slot);
        }
    }
    controller
}

/// The slot table exists from the first frame, reading as empty descriptors
/// until bootstrap completes.
pub fn begin_ability_bootstrap(
    trigger: On<Add, CharacterMarker>,
    clock: Res<AbilityClock>,
    mut commands: Commands,
) {
    commands.entity(trigger.entity).insert((
        AbilityBootstrap {
            attempts: 0,
            next_attempt_at: clock.now,
        },
        AbilitySlotTable::default(),
    ));
}

pub fn bootstrap_abilities(
    clock: Res<AbilityClock>,
    settings: Res<AbilitySettings>,
    catalog: Res<AbilityCatalog>,
    mut commands: Commands,
    mut pending: Query<(
        Entity,
        &mut AbilityBootstrap,
        &mut AbilitySlotTable,
        Option<&AbilityLoadout>,
        Has<ResourcePool>,
    )>,
) {
    for (entity, mut bootstrap, mut table, loadout, has_pool) in &mut pending {
        if clock.now < bootstrap.next_attempt_at {
            continue;
        }
        bootstrap.attempts += 1;

        let controller = loadout.map(|l| build_controller(l, &catalog));
        match controller {
            Some(controller) if has_pool && !controller.is_empty() => {
                debug!(
                    "{entity:?}: abilities ready after {} attempt(s)",
                    bootstrap.attempts
                );
                table.sync_from(&controller, clock.now);
                commands
                    .entity(entity)
                    .insert(controller)
                    .remove::<AbilityBootstrap>();
            }
            _ if bootstrap.attempts >= settings.bootstrap_max_attempts => {
                warn!(
                    "{entity:?}: no usable loadout after {} attempts, installing defaults",
                    bootstrap.attempts
                );
                let mut fallback_catalog = AbilityCatalog::builtin();
                fallback_catalog.abilities.extend(catalog.abilities.clone());

                // A usable loadout that arrived without its pool is kept.
                let mut entity_commands = commands.entity(entity);
                let kept = loadout
                    .map(|l| build_controller(l, &fallback_catalog))
                    .filter(|controller| !controller.is_empty());
                let controller = match kept {
                    Some(controller) => controller,
                    None => {
                        let fallback =
                            AbilityLoadout::from_abilities(settings.fallback_loadout.clone());
                        let controller = build_controller(&fallback, &fallback_catalog);
                        entity_commands.insert(fallback);
                        controller
                    }
                };
                table.sync_from(&controller, clock.now);
                entity_commands
                    .insert(controller)
                    .remove::<AbilityBootstrap>();
                if !has_pool {
                    entity_commands.insert(settings.fallback_pool.clone());
                }
            }
            _ => {
                debug!(
                    "{entity:?}: abilities not ready (loadout: {}, pool: {has_pool}), retrying",
                    loadout.is_some()
                );
                bootstrap.next_attempt_at = clock.now + settings.bootstrap_retry_delay;
            }
        }
    }
}

/// Empties the slot table when the controller goes, so readers never see
/// descriptors for instances that no longer exist.
pub fn cleanup_ability_controller(
    trigger: On<Remove, AbilityController>,
    mut characters: Query<(&mut AbilityController, Option<&mut AbilitySlotTable>)>,
) {
    let Ok((mut controller, table)) = characters.get_mut(trigger.entity) else {
        return;
    };
    let mut in_flight = 0;
    for (_, ability) in controller.iter_mut() {
        if ability.pending_request().is_some() {
            in_flight += 1;
        }
        ability.cleanup();
    }
    if let Some(mut table) = table {
        *table = AbilitySlotTable::default();
    }
    debug!(
        "{:?}: ability controller removed, {in_flight} request(s) dropped",
        trigger.entity
    );
}
