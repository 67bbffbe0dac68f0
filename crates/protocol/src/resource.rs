use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::AbilityClock;

/// Mana and health of one character. Replicated; only the server mutates it.
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResourcePool {
    pub mana: f32,
    pub max_mana: f32,
    pub health: f32,
    pub max_health: f32,
    /// Mana per second.
    pub mana_regen: f32,
}

impl ResourcePool {
    /// Full pool.
    pub fn new(max_mana: f32, max_health: f32, mana_regen: f32) -> Self {
        Self {
            mana: max_mana,
            max_mana,
            health: max_health,
            max_health,
            mana_regen,
        }
    }

    pub fn can_afford(&self, cost: f32) -> bool {
        cost >= 0.0 && self.mana >= cost
    }

    /// Deducts `cost` if affordable. Never goes negative, rejects negative
    /// and NaN costs.
    pub fn try_consume(&mut self, cost: f32) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.mana -= cost;
        true
    }

    /// Returns `amount` to the pool, capped at `max_mana`.
    pub fn refund(&mut self, amount: f32) {
        if amount > 0.0 {
            self.mana = (self.mana + amount).min(self.max_mana);
        }
    }

    pub fn regenerate(&mut self, seconds: f32) {
        self.mana = (self.mana + self.mana_regen * seconds).min(self.max_mana);
    }

    pub fn apply_damage(&mut self, damage: f32) {
        self.health = (self.health - damage.max(0.0)).max(0.0);
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }
}

/// Emitted whenever a [`ResourcePool`] changes, on every process. UI
/// subscribes by reading these.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct ResourcePoolChanged {
    pub entity: Entity,
    pub mana: f32,
    pub max_mana: f32,
    pub health: f32,
    pub max_health: f32,
}

pub fn notify_resource_changes(
    pools: Query<(Entity, &ResourcePool), Changed<ResourcePool>>,
    mut changed: MessageWriter<ResourcePoolChanged>,
) {
    for (entity, pool) in &pools {
        changed.write(ResourcePoolChanged {
            entity,
            mana: pool.mana,
            max_mana: pool.max_mana,
            health: pool.health,
            max_health: pool.max_health,
        });
    }
}

/// Server-only.
pub fn regenerate_mana(
    clock: Res<AbilityClock>,
    mut last: Local<Option<f64>>,
    mut pools: Query<&mut ResourcePool>,
) {
    let elapsed = last.map_or(0.0, |last| (clock.now - last).max(0.0)) as f32;
    *last = Some(clock.now);
    if elapsed <= 0.0 {
        return;
    }
    for mut pool in &mut pools {
        if pool.mana < pool.max_mana {
            pool.regenerate(elapsed);
        }
    }
}
