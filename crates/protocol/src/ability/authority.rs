use avian3d::prelude::LinearVelocity;
use bevy::prelude::*;

use super::{
    AbilityActivated, AbilityController, AbilityFailed, AbilitySlotTable, AbilitySucceeded,
    ActivationContext, ActivationError, SlotId, UseAbility,
};
use crate::resource::ResourcePool;
use crate::{AbilityClock, NetIdIndex};

/// Server verdict on every incoming [`UseAbility`].
///
/// Malformed or stale requests are dropped with a diagnostic and no reply.
/// Valid requests are checked against the server's own instance and pool; the
/// pool is only touched once readiness and precondition pass. Success goes to
/// every observer, failure only to the owner.
pub fn authorize_ability_requests(
    clock: Res<AbilityClock>,
    index: Res<NetIdIndex>,
    mut requests: MessageReader<UseAbility>,
    mut characters: Query<(
        &mut AbilityController,
        &mut AbilitySlotTable,
        &mut ResourcePool,
        Option<&LinearVelocity>,
    )>,
    mut succeeded: MessageWriter<AbilitySucceeded>,
    mut failed: MessageWriter<AbilityFailed>,
    mut activated: MessageWriter<AbilityActivated>,
) {
    for request in requests.read() {
        let slot = match SlotId::new(request.slot) {
            Ok(slot) => slot,
            Err(err) => {
                error!("Dropping ability request for {:?}: {err}", request.entity);
                continue;
            }
        };
        let Some(entity) = index.get(request.entity) else {
            error!(
                "Dropping ability request for unknown entity {:?}",
                request.entity
            );
            continue;
        };
        let Ok((mut controller, mut table, mut pool, velocity)) = characters.get_mut(entity) else {
            error!("Dropping ability request for {entity:?}: no ability controller");
            continue;
        };
        let Some(ability) = controller.get_mut(slot) else {
            warn!("Dropping ability request for {entity:?}: {slot} is empty");
            continue;
        };
        if ability.id() != request.instance {
            warn!(
                "Dropping stale ability request for {entity:?}: {slot} holds {:?}, request names {:?}",
                ability.id(),
                request.instance
            );
            continue;
        }
        if ability.has_applied(request.request) {
            debug!("Ignoring repeated request {:?}", request.request);
            continue;
        }

        let ctx = ActivationContext {
            now: clock.now,
            available: pool.mana,
            speed: velocity.map_or(0.0, |v| v.0.length()),
        };
        let cost = ability.resource_cost();
        let verdict = ability.check_readiness(&ctx).and_then(|()| {
            if pool.try_consume(cost) {
                Ok(())
            } else {
                Err(ActivationError::InsufficientResource {
                    needed: cost,
                    available: ctx.available,
                })
            }
        });

        if let Err(err) = verdict {
            info!("{entity:?} {slot} ({}) rejected: {err}", ability.ability());
            failed.write(AbilityFailed {
                entity: request.entity,
                slot,
                instance: request.instance,
                request: request.request,
                reason: err.into(),
            });
            continue;
        }

        match ability.confirm(request.request, &ctx) {
            Ok(effect) => {
                table.mirror_slot(slot, controller.get(slot), clock.now);
                succeeded.write(AbilitySucceeded {
                    entity: request.entity,
                    slot,
                    instance: request.instance,
                    request: request.request,
                });
                activated.write(AbilityActivated {
                    entity,
                    slot,
                    effect,
                });
            }
            Err(err) => {
                pool.refund(cost);
                error!("{entity:?} {slot}: {err}, refunded {cost}");
            }
        }
    }
}
