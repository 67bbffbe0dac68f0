use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::slots::{register_power_up, unregister_power_up};
use super::{
    AbilityCatalog, AbilityController, AbilityId, AbilityInstance, AbilityInstanceId,
    AbilitySlotTable, SlotId, SLOT_COUNT,
};
use crate::AbilityClock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadoutEntry {
    pub ability: AbilityId,
    pub instance: AbilityInstanceId,
}

/// Server-owned roster of which ability sits in which slot, replicated to
/// every client. Each process builds its own [`AbilityController`] from it.
#[derive(Component, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AbilityLoadout {
    entries: [Option<LoadoutEntry>; SLOT_COUNT],
    next_instance: u32,
}

impl AbilityLoadout {
    pub fn from_abilities(abilities: impl IntoIterator<Item = (SlotId, AbilityId)>) -> Self {
        let mut loadout = Self::default();
        for (slot, ability) in abilities {
            loadout.assign(slot, ability);
        }
        loadout
    }

    /// Puts `ability` in `slot` under a fresh instance id, replacing whatever
    /// was there.
    pub fn assign(&mut self, slot: SlotId, ability: AbilityId) -> AbilityInstanceId {
        self.next_instance = self.next_instance.wrapping_add(1);
        let instance = AbilityInstanceId(self.next_instance);
        self.entries[slot.index()] = Some(LoadoutEntry { ability, instance });
        instance
    }

    pub fn clear(&mut self, slot: SlotId) -> Option<LoadoutEntry> {
        self.entries[slot.index()].take()
    }

    pub fn get(&self, slot: SlotId) -> Option<&LoadoutEntry> {
        self.entries[slot.index()].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &LoadoutEntry)> {
        SlotId::ALL
            .into_iter()
            .zip(self.entries.iter())
            .filter_map(|(slot, e)| e.as_ref().map(|e| (slot, e)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// Builds the live instance for `slot`. `None` when the slot is empty or
    /// the catalog does not know the ability.
    pub fn instantiate(&self, slot: SlotId, catalog: &AbilityCatalog) -> Option<AbilityInstance> {
        let entry = self.get(slot)?;
        let def = catalog.get(&entry.ability)?;
        Some(AbilityInstance::new(
            entry.instance,
            entry.ability.clone(),
            def.clone(),
        ))
    }
}

/// Brings controllers in line with a changed loadout. Slots whose instance id
/// still matches keep their live state; the rest are rebuilt or cleared.
pub fn reconcile_loadout(
    clock: Res<AbilityClock>,
    catalog: Res<AbilityCatalog>,
    mut characters: Query<
        (
            Entity,
            &AbilityLoadout,
            &mut AbilityController,
            &mut AbilitySlotTable,
        ),
        Changed<AbilityLoadout>,
    >,
) {
    for (entity, loadout, mut controller, mut table) in &mut characters {
        for slot in SlotId::ALL {
            let wanted = loadout.get(slot).map(|e| e.instance);
            let current = controller.get(slot).map(AbilityInstance::id);
            if wanted == current {
                continue;
            }

            let replacement = loadout.instantiate(slot, &catalog);
            if let (Some(entry), None) = (loadout.get(slot), &replacement) {
                warn!(
                    "{entity:?}: ability {} in {slot} is not in the catalog",
                    entry.ability
                );
            }

            let previous = if !slot.is_power_up() {
                let previous = controller.replace_slot(slot, replacement);
                table.mirror_slot(slot, controller.get(slot), clock.now);
                Ok(previous)
            } else if let Some(instance) = replacement {
                register_power_up(&mut controller, &mut table, instance, slot, clock.now)
            } else {
                unregister_power_up(&mut controller, &mut table, slot, clock.now)
            };

            match previous {
                Ok(Some(mut old)) => {
                    debug!("{entity:?}: {slot} replaced {}", old.ability());
                    old.cleanup();
                }
                Ok(None) => {}
                Err(err) => error!("{entity:?}: loadout reconcile failed: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_issues_fresh_instance_ids() {
        let mut loadout = AbilityLoadout::default();
        let first = loadout.assign(SlotId::POWER_UP_A, AbilityId::new("shield"));
        let second = loadout.assign(SlotId::POWER_UP_A, AbilityId::new("shield"));
        assert_ne!(first, second, "Reassigning a slot must change its instance id");
        assert_eq!(loadout.get(SlotId::POWER_UP_A).unwrap().instance, second);
    }

    #[test]
    fn clear_empties_slot() {
        let mut loadout = AbilityLoadout::from_abilities([(SlotId::POWER_UP_B, "shield".into())]);
        assert!(!loadout.is_empty());
        let removed = loadout.clear(SlotId::POWER_UP_B).unwrap();
        assert_eq!(removed.ability, AbilityId::new("shield"));
        assert!(loadout.is_empty());
    }

    #[test]
    fn instantiate_skips_unknown_abilities() {
        let catalog = AbilityCatalog::builtin();
        let loadout = AbilityLoadout::from_abilities([
            (SlotId::BASE_PRIMARY, "dash".into()),
            (SlotId::BASE_SECONDARY, "teleport".into()),
        ]);
        assert!(loadout.instantiate(SlotId::BASE_PRIMARY, &catalog).is_some());
        assert!(loadout.instantiate(SlotId::BASE_SECONDARY, &catalog).is_none());
        assert!(loadout.instantiate(SlotId::POWER_UP_A, &catalog).is_none());
    }

    fn reconcile_app() -> (App, Entity) {
        let mut app = App::new();
        app.insert_resource(AbilityClock::default());
        app.insert_resource(AbilityCatalog::builtin());
        app.add_systems(Update, reconcile_loadout);

        let loadout = AbilityLoadout::from_abilities([
            (SlotId::BASE_PRIMARY, "dash".into()),
            (SlotId::BASE_SECONDARY, "strong_jump".into()),
        ]);
        let controller = crate::ability::build_controller(&loadout, &AbilityCatalog::builtin());
        let entity = app
            .world_mut()
            .spawn((loadout, controller, AbilitySlotTable::default()))
            .id();
        app.update();
        (app, entity)
    }

    #[test]
    fn power_up_added_to_loadout_reaches_controller_and_table() {
        let (mut app, entity) = reconcile_app();

        let id = app
            .world_mut()
            .get_mut::<AbilityLoadout>(entity)
            .unwrap()
            .assign(SlotId::POWER_UP_A, "kinetic_shield".into());
        app.update();

        let controller = app.world().get::<AbilityController>(entity).unwrap();
        assert_eq!(controller.get(SlotId::POWER_UP_A).map(|a| a.id()), Some(id));
        let table = app.world().get::<AbilitySlotTable>(entity).unwrap();
        assert_eq!(table.descriptor(2).unwrap().name, "Kinetic Shield");
    }

    #[test]
    fn unchanged_slots_keep_live_state() {
        let (mut app, entity) = reconcile_app();
        app.world_mut()
            .get_mut::<AbilityController>(entity)
            .unwrap()
            .get_mut(SlotId::BASE_PRIMARY)
            .unwrap()
            .start_cooldown(0.0);

        app.world_mut()
            .get_mut::<AbilityLoadout>(entity)
            .unwrap()
            .assign(SlotId::POWER_UP_B, "shield".into());
        app.update();

        let controller = app.world().get::<AbilityController>(entity).unwrap();
        assert!(
            !controller.get(SlotId::BASE_PRIMARY).unwrap().is_ready(),
            "Dash cooldown should survive an unrelated loadout change"
        );
    }

    #[test]
    fn cleared_power_up_leaves_controller() {
        let (mut app, entity) = reconcile_app();
        app.world_mut()
            .get_mut::<AbilityLoadout>(entity)
            .unwrap()
            .assign(SlotId::POWER_UP_A, "shield".into());
        app.update();
        app.world_mut()
            .get_mut::<AbilityLoadout>(entity)
            .unwrap()
            .clear(SlotId::POWER_UP_A);
        app.update();

        let controller = app.world().get::<AbilityController>(entity).unwrap();
        assert!(controller.get(SlotId::POWER_UP_A).is_none());
        let table = app.world().get::<AbilitySlotTable>(entity).unwrap();
        assert!(table.descriptor(2).unwrap().is_empty());
    }
}
