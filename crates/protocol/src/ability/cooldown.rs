use bevy::prelude::*;

use super::{AbilityController, AbilitySettings, AbilitySlotTable};
use crate::AbilityClock;

/// Tracks when the slot tables were last resynced.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct SlotResync {
    pub last_run: Option<f64>,
}

impl SlotResync {
    pub fn due(&self, now: f64, interval: f64) -> bool {
        self.last_run.is_none_or(|last| now - last >= interval)
    }
}

pub fn tick_cooldowns(clock: Res<AbilityClock>, mut controllers: Query<&mut AbilityController>) {
    for mut controller in &mut controllers {
        for (_, ability) in controller.iter_mut() {
            ability.update_tick(clock.now);
        }
    }
}

/// Copies live instance state into every slot table once per resync interval.
/// Runs for every initialized character for its whole lifetime.
pub fn resync_slot_tables(
    clock: Res<AbilityClock>,
    settings: Res<AbilitySettings>,
    mut resync: ResMut<SlotResync>,
    mut characters: Query<(&AbilityController, &mut AbilitySlotTable)>,
) {
    if !resync.due(clock.now, settings.resync_interval) {
        return;
    }
    resync.last_run = Some(clock.now);
    for (controller, mut table) in &mut characters {
        table.sync_from(controller, clock.now);
    }
}
