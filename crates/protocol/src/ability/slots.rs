use bevy::prelude::*;

use super::instance::{AbilityDescriptor, AbilityInstance};
use super::{AbilityInstanceId, RequestId, SlotError, SlotId, SLOT_COUNT};

/// Per-character ability owner. The only place live [`AbilityInstance`]s are
/// kept; everything else (the slot mirror, the UI) is derived from it.
///
/// Slots 0-1 hold base abilities fixed at construction, slots 2-3 hold
/// power-ups registered at runtime.
#[derive(Component, Clone, Debug, Default)]
pub struct AbilityController {
    slots: [Option<AbilityInstance>; SLOT_COUNT],
    next_request: u32,
}

impl AbilityController {
    pub fn with_base(primary: Option<AbilityInstance>, secondary: Option<AbilityInstance>) -> Self {
        Self {
            slots: [primary, secondary, None, None],
            next_request: 0,
        }
    }

    pub fn get(&self, slot: SlotId) -> Option<&AbilityInstance> {
        self.slots[slot.index()].as_ref()
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut AbilityInstance> {
        self.slots[slot.index()].as_mut()
    }

    /// Live instance in `slot`, only if it is still `instance`.
    pub fn get_matching_mut(
        &mut self,
        slot: SlotId,
        instance: AbilityInstanceId,
    ) -> Option<&mut AbilityInstance> {
        self.get_mut(slot).filter(|a| a.id() == instance)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &AbilityInstance)> {
        SlotId::ALL
            .into_iter()
            .zip(self.slots.iter())
            .filter_map(|(slot, a)| a.as_ref().map(|a| (slot, a)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotId, &mut AbilityInstance)> {
        SlotId::ALL
            .into_iter()
            .zip(self.slots.iter_mut())
            .filter_map(|(slot, a)| a.as_mut().map(|a| (slot, a)))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_request_id(&mut self) -> RequestId {
        self.next_request = self.next_request.wrapping_add(1);
        RequestId(self.next_request)
    }

    /// Puts `instance` into a power-up slot and hands back the previous
    /// occupant. The caller decides what happens to it.
    pub fn register_power_up(
        &mut self,
        instance: AbilityInstance,
        slot: SlotId,
    ) -> Result<Option<AbilityInstance>, SlotError> {
        if !slot.is_power_up() {
            return Err(SlotError::NotPowerUpSlot(slot));
        }
        Ok(self.slots[slot.index()].replace(instance))
    }

    pub fn unregister_power_up(&mut self, slot: SlotId) -> Result<Option<AbilityInstance>, SlotError> {
        if !slot.is_power_up() {
            return Err(SlotError::NotPowerUpSlot(slot));
        }
        Ok(self.slots[slot.index()].take())
    }

    /// Swaps a base slot. Only loadout reconciliation does this; gameplay code
    /// goes through the power-up calls.
    pub(crate) fn replace_slot(
        &mut self,
        slot: SlotId,
        instance: Option<AbilityInstance>,
    ) -> Option<AbilityInstance> {
        std::mem::replace(&mut self.slots[slot.index()], instance)
    }
}

/// UI-facing, fixed four-slot view of a character's abilities.
///
/// Derived from [`AbilityController`]: refreshed immediately on registration
/// and on every resync tick. Never the source of truth.
#[derive(Component, Clone, Debug, Default, PartialEq)]
pub struct AbilitySlotTable {
    descriptors: [AbilityDescriptor; SLOT_COUNT],
    last_sync: Option<f64>,
}

impl AbilitySlotTable {
    pub fn slot_count(&self) -> usize {
        SLOT_COUNT
    }

    pub fn descriptor(&self, index: usize) -> Option<&AbilityDescriptor> {
        self.descriptors.get(index)
    }

    pub fn descriptors(&self) -> &[AbilityDescriptor; SLOT_COUNT] {
        &self.descriptors
    }

    /// Zero for empty or out-of-range slots.
    pub fn remaining_cooldown(&self, index: usize, now: f64) -> f64 {
        self.descriptors
            .get(index)
            .filter(|d| !d.is_empty())
            .map(|d| (d.cooldown_end_time - now).max(0.0))
            .unwrap_or(0.0)
    }

    pub fn last_sync(&self) -> Option<f64> {
        self.last_sync
    }

    pub fn mirror_slot(&mut self, slot: SlotId, instance: Option<&AbilityInstance>, now: f64) {
        self.descriptors[slot.index()] = instance
            .map(|a| a.descriptor(slot, now))
            .unwrap_or_default();
    }

    pub fn sync_from(&mut self, controller: &AbilityController, now: f64) {
        for slot in SlotId::ALL {
            self.mirror_slot(slot, controller.get(slot), now);
        }
        self.last_sync = Some(now);
    }
}

/// Registers a power-up and mirrors it into the slot table in the same step.
/// Returns the displaced instance, which is not cleaned up here.
pub fn register_power_up(
    controller: &mut AbilityController,
    table: &mut AbilitySlotTable,
    instance: AbilityInstance,
    slot: SlotId,
    now: f64,
) -> Result<Option<AbilityInstance>, SlotError> {
    let previous = controller.register_power_up(instance, slot)?;
    table.mirror_slot(slot, controller.get(slot), now);
    Ok(previous)
}

/// Clears a power-up slot and its mirror. The removed instance is returned
/// untouched.
pub fn unregister_power_up(
    controller: &mut AbilityController,
    table: &mut AbilitySlotTable,
    slot: SlotId,
    now: f64,
) -> Result<Option<AbilityInstance>, SlotError> {
    let removed = controller.unregister_power_up(slot)?;
    table.mirror_slot(slot, None, now);
    Ok(removed)
}
