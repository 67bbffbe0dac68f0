use avian3d::prelude::{LinearVelocity, Position, Rotation};
use bevy::prelude::*;

use super::{AbilityActivated, AbilityEffect};
use crate::resource::ResourcePool;
use crate::{AbilityClock, CharacterMarker};

/// Distance at which a missile connects with a character.
pub const MISSILE_HIT_RADIUS: f32 = 1.0;
const MISSILE_SPAWN_OFFSET: f32 = 1.0;

/// Damage absorber on a character. Local to each process.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct ActiveShield {
    pub remaining: f32,
    pub expires_at: f64,
}

impl ActiveShield {
    /// Soaks up what it can and returns the damage that gets through.
    pub fn absorb(&mut self, damage: f32) -> f32 {
        let soaked = damage.min(self.remaining).max(0.0);
        self.remaining -= soaked;
        damage - soaked
    }
}

/// Projectile flying on a fixed line. Every process simulates its own copy
/// from the same confirmation, so nothing about it is replicated.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Missile {
    pub owner: Entity,
    pub origin: Vec3,
    pub velocity: Vec3,
    pub damage: f32,
    pub spawned_at: f64,
    pub expires_at: f64,
}

impl Missile {
    pub fn position_at(&self, now: f64) -> Vec3 {
        self.origin + self.velocity * (now - self.spawned_at).max(0.0) as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Message)]
pub struct MissileHit {
    pub owner: Entity,
    pub target: Entity,
    pub damage: f32,
}

fn horizontal_facing(rotation: Option<&Rotation>) -> Vec3 {
    let forward = rotation.map_or(Quat::IDENTITY, |r| r.0) * Vec3::NEG_Z;
    Vec3::new(forward.x, 0.0, forward.z).normalize_or(Vec3::NEG_Z)
}

pub fn apply_ability_effects(
    clock: Res<AbilityClock>,
    mut commands: Commands,
    mut activated: MessageReader<AbilityActivated>,
    mut bodies: Query<(
        Option<&Position>,
        Option<&Rotation>,
        Option<&mut LinearVelocity>,
    )>,
) {
    for activation in activated.read() {
        let Ok((position, rotation, velocity)) = bodies.get_mut(activation.entity) else {
            warn!("Activation for missing entity {:?}", activation.entity);
            continue;
        };
        let facing = horizontal_facing(rotation);

        match activation.effect {
            AbilityEffect::Dash { speed } => {
                if let Some(mut velocity) = velocity {
                    velocity.0.x = facing.x * speed;
                    velocity.0.z = facing.z * speed;
                }
            }
            AbilityEffect::Jump { impulse } => {
                if let Some(mut velocity) = velocity {
                    velocity.0.y = impulse;
                }
            }
            AbilityEffect::Shield { absorb, duration } => {
                commands.entity(activation.entity).insert(ActiveShield {
                    remaining: absorb,
                    expires_at: clock.now + duration,
                });
            }
            AbilityEffect::Missile {
                speed,
                lifetime,
                damage,
            } => {
                let origin =
                    position.map_or(Vec3::ZERO, |p| p.0) + facing * MISSILE_SPAWN_OFFSET;
                commands.spawn((
                    Name::new("Missile"),
                    Missile {
                        owner: activation.entity,
                        origin,
                        velocity: facing * speed,
                        damage,
                        spawned_at: clock.now,
                        expires_at: clock.now + lifetime,
                    },
                    Position(origin),
                ));
            }
        }
    }
}

pub fn update_missiles(
    clock: Res<AbilityClock>,
    mut commands: Commands,
    mut missiles: Query<(Entity, &Missile, &mut Position)>,
) {
    for (entity, missile, mut position) in &mut missiles {
        if clock.now >= missile.expires_at {
            commands.entity(entity).despawn();
            continue;
        }
        position.0 = missile.position_at(clock.now);
    }
}

pub fn resolve_missile_hits(
    clock: Res<AbilityClock>,
    mut commands: Commands,
    missiles: Query<(Entity, &Missile, &Position)>,
    targets: Query<(Entity, &Position), With<CharacterMarker>>,
    mut hits: MessageWriter<MissileHit>,
) {
    for (entity, missile, position) in &missiles {
        if clock.now >= missile.expires_at {
            continue;
        }
        let hit = targets.iter().find(|(target, target_position)| {
            *target != missile.owner
                && target_position.0.distance(position.0) <= MISSILE_HIT_RADIUS
        });
        if let Some((target, _)) = hit {
            commands.entity(entity).despawn();
            hits.write(MissileHit {
                owner: missile.owner,
                target,
                damage: missile.damage,
            });
        }
    }
}

/// Server-only: shields soak first, the pool takes the rest.
pub fn apply_missile_damage(
    mut hits: MessageReader<MissileHit>,
    mut targets: Query<(&mut ResourcePool, Option<&mut ActiveShield>)>,
) {
    for hit in hits.read() {
        let Ok((mut pool, shield)) = targets.get_mut(hit.target) else {
            continue;
        };
        let damage = match shield {
            Some(mut shield) => shield.absorb(hit.damage),
            None => hit.damage,
        };
        if damage > 0.0 {
            pool.apply_damage(damage);
        }
        debug!(
            "{:?} hit {:?} for {damage} ({} after)",
            hit.owner, hit.target, pool.health
        );
    }
}

pub fn expire_shields(
    clock: Res<AbilityClock>,
    mut commands: Commands,
    shields: Query<(Entity, &ActiveShield)>,
) {
    for (entity, shield) in &shields {
        if clock.now >= shield.expires_at || shield.remaining <= 0.0 {
            commands.entity(entity).remove::<ActiveShield>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::SlotId;
    use approx::assert_relative_eq;

    fn effects_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(AbilityClock::at(0.0));
        app.add_message::<AbilityActivated>();
        app.add_message::<MissileHit>();
        app.add_systems(
            Update,
            (
                apply_ability_effects,
                update_missiles,
                resolve_missile_hits,
                apply_missile_damage,
                expire_shields,
            )
                .chain(),
        );
        app
    }

    fn set_time(app: &mut App, now: f64) {
        app.world_mut().resource_mut::<AbilityClock>().now = now;
    }

    fn activate(app: &mut App, entity: Entity, effect: AbilityEffect) {
        app.world_mut().write_message(AbilityActivated {
            entity,
            slot: SlotId::BASE_PRIMARY,
            effect,
        });
    }

    fn character(app: &mut App, at: Vec3) -> Entity {
        app.world_mut()
            .spawn((
                CharacterMarker,
                Position(at),
                Rotation::default(),
                LinearVelocity::default(),
                ResourcePool::new(100.0, 100.0, 0.0),
            ))
            .id()
    }

    #[test]
    fn dash_sets_horizontal_velocity_along_facing() {
        let mut app = effects_app();
        let entity = character(&mut app, Vec3::ZERO);
        app.world_mut().get_mut::<LinearVelocity>(entity).unwrap().0.y = -2.0;

        activate(&mut app, entity, AbilityEffect::Dash { speed: 15.0 });
        app.update();

        let velocity = app.world().get::<LinearVelocity>(entity).unwrap();
        assert_relative_eq!(velocity.0.z, -15.0);
        assert_relative_eq!(velocity.0.x, 0.0);
        assert_relative_eq!(velocity.0.y, -2.0);
    }

    #[test]
    fn jump_sets_vertical_velocity() {
        let mut app = effects_app();
        let entity = character(&mut app, Vec3::ZERO);
        activate(&mut app, entity, AbilityEffect::Jump { impulse: 12.0 });
        app.update();
        assert_relative_eq!(app.world().get::<LinearVelocity>(entity).unwrap().0.y, 12.0);
    }

    #[test]
    fn shield_expires() {
        let mut app = effects_app();
        let entity = character(&mut app, Vec3::ZERO);
        activate(
            &mut app,
            entity,
            AbilityEffect::Shield {
                absorb: 50.0,
                duration: 4.0,
            },
        );
        app.update();
        assert!(app.world().get::<ActiveShield>(entity).is_some());

        set_time(&mut app, 4.0);
        app.update();
        assert!(app.world().get::<ActiveShield>(entity).is_none());
    }

    #[test]
    fn missile_hits_other_character_through_shield() {
        let mut app = effects_app();
        let shooter = character(&mut app, Vec3::ZERO);
        let target = character(&mut app, Vec3::new(0.0, 0.0, -10.0));
        app.world_mut().entity_mut(target).insert(ActiveShield {
            remaining: 20.0,
            expires_at: 100.0,
        });

        activate(
            &mut app,
            shooter,
            AbilityEffect::Missile {
                speed: 60.0,
                lifetime: 2.0,
                damage: 35.0,
            },
        );
        app.update();
        let mut missiles = app.world_mut().query::<&Missile>();
        assert_eq!(missiles.iter(app.world()).count(), 1);

        set_time(&mut app, 0.15);
        app.update();

        let mut missiles = app.world_mut().query::<&Missile>();
        assert_eq!(missiles.iter(app.world()).count(), 0);
        let pool = app.world().get::<ResourcePool>(target).unwrap();
        assert_relative_eq!(pool.health, 85.0);
        let shooter_pool = app.world().get::<ResourcePool>(shooter).unwrap();
        assert_relative_eq!(shooter_pool.health, 100.0);
    }

    #[test]
    fn missile_despawns_at_end_of_lifetime() {
        let mut app = effects_app();
        let shooter = character(&mut app, Vec3::ZERO);
        activate(
            &mut app,
            shooter,
            AbilityEffect::Missile {
                speed: 60.0,
                lifetime: 2.0,
                damage: 35.0,
            },
        );
        app.update();
        set_time(&mut app, 2.0);
        app.update();
        let mut missiles = app.world_mut().query::<&Missile>();
        assert_eq!(missiles.iter(app.world()).count(), 0);
    }

    #[test]
    fn shield_absorb_passes_overflow() {
        let mut shield = ActiveShield {
            remaining: 10.0,
            expires_at: 1.0,
        };
        assert_relative_eq!(shield.absorb(4.0), 0.0);
        assert_relative_eq!(shield.absorb(10.0), 4.0);
        assert_relative_eq!(shield.remaining, 0.0);
    }
}
