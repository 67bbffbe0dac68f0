use avian3d::prelude::LinearVelocity;
use bevy::prelude::*;
use leafwing_input_manager::prelude::ActionState;

use super::{
    AbilityActivated, AbilityController, AbilityFailed, AbilityFeedback, AbilitySettings,
    AbilitySlotTable, AbilitySucceeded, ActivationContext, ActivationError, ApplyError,
    FeedbackKind, SlotId, UseAbility,
};
use crate::resource::ResourcePool;
use crate::{AbilityClock, LocalPlayer, NetId, NetIdIndex, PlayerActions};

/// Turns trigger-key edges on the local character into requests.
///
/// Nothing is sent unless the local check passes. A shortfall against the
/// replicated pool gives instant feedback; the server re-checks regardless.
pub fn gate_ability_input(
    clock: Res<AbilityClock>,
    mut characters: Query<
        (
            Entity,
            &NetId,
            &ActionState<PlayerActions>,
            &mut AbilityController,
            &mut AbilitySlotTable,
            &ResourcePool,
            Option<&LinearVelocity>,
        ),
        With<LocalPlayer>,
    >,
    mut requests: MessageWriter<UseAbility>,
    mut feedback: MessageWriter<AbilityFeedback>,
) {
    for (entity, net_id, action_state, mut controller, mut table, pool, velocity) in &mut characters
    {
        let ctx = ActivationContext {
            now: clock.now,
            available: pool.mana,
            speed: velocity.map_or(0.0, |v| v.0.length()),
        };
        for slot in SlotId::ALL {
            if !action_state.just_pressed(&slot.action()) {
                continue;
            }
            let Some(ability) = controller.get_mut(slot) else {
                continue;
            };
            match ability.check_activation(&ctx) {
                Ok(()) => {}
                Err(ActivationError::NotReady | ActivationError::Pending) => continue,
                Err(err) => {
                    debug!("{entity:?} {slot}: {err}");
                    ability.on_failed(None);
                    feedback.write(AbilityFeedback {
                        entity,
                        slot,
                        kind: FeedbackKind::Rejected(err.into()),
                    });
                    continue;
                }
            }

            let instance = ability.id();
            let request = controller.next_request_id();
            if let Some(ability) = controller.get_mut(slot) {
                ability.begin_request(request, clock.now);
            }
            table.mirror_slot(slot, controller.get(slot), clock.now);
            requests.write(UseAbility {
                entity: *net_id,
                slot: slot.into(),
                instance,
                request,
            });
        }
    }
}

/// Applies server verdicts on this process.
///
/// Every observer applies a success the same way: activate, then start the
/// cooldown. Outcomes for an instance that has since left the slot are
/// ignored.
pub fn apply_ability_outcomes(
    clock: Res<AbilityClock>,
    index: Res<NetIdIndex>,
    mut succeeded: MessageReader<AbilitySucceeded>,
    mut failed: MessageReader<AbilityFailed>,
    mut characters: Query<(
        &mut AbilityController,
        &mut AbilitySlotTable,
        Option<&ResourcePool>,
        Option<&LinearVelocity>,
    )>,
    mut activated: MessageWriter<AbilityActivated>,
    mut feedback: MessageWriter<AbilityFeedback>,
) {
    for outcome in succeeded.read() {
        let Some(entity) = index.get(outcome.entity) else {
            debug!("Success for unknown entity {:?}", outcome.entity);
            continue;
        };
        let Ok((mut controller, mut table, pool, velocity)) = characters.get_mut(entity) else {
            continue;
        };
        let Some(ability) = controller.get_matching_mut(outcome.slot, outcome.instance) else {
            debug!(
                "{entity:?}: success for {:?} no longer in {}",
                outcome.instance, outcome.slot
            );
            continue;
        };
        let ctx = ActivationContext {
            now: clock.now,
            available: pool.map_or(0.0, |p| p.mana),
            speed: velocity.map_or(0.0, |v| v.0.length()),
        };
        match ability.confirm(outcome.request, &ctx) {
            Ok(effect) => {
                table.mirror_slot(outcome.slot, controller.get(outcome.slot), clock.now);
                activated.write(AbilityActivated {
                    entity,
                    slot: outcome.slot,
                    effect,
                });
            }
            Err(ApplyError::AlreadyApplied(request)) => {
                debug!("{entity:?}: duplicate success for {request:?}");
            }
            Err(err) => error!("{entity:?} {}: {err}", outcome.slot),
        }
    }

    for outcome in failed.read() {
        let Some(entity) = index.get(outcome.entity) else {
            continue;
        };
        let Ok((mut controller, mut table, ..)) = characters.get_mut(entity) else {
            continue;
        };
        let Some(ability) = controller.get_matching_mut(outcome.slot, outcome.instance) else {
            continue;
        };
        if ability.on_failed(Some(outcome.request)) {
            debug!(
                "{entity:?} {} rejected by server: {:?}",
                outcome.slot, outcome.reason
            );
            table.mirror_slot(outcome.slot, controller.get(outcome.slot), clock.now);
            feedback.write(AbilityFeedback {
                entity,
                slot: outcome.slot,
                kind: FeedbackKind::Rejected(outcome.reason),
            });
        }
    }
}

/// Releases requests that never got a verdict so the slot can be used again.
pub fn expire_pending_requests(
    clock: Res<AbilityClock>,
    settings: Res<AbilitySettings>,
    mut characters: Query<(Entity, &mut AbilityController, &mut AbilitySlotTable), With<LocalPlayer>>,
    mut feedback: MessageWriter<AbilityFeedback>,
) {
    for (entity, mut controller, mut table) in &mut characters {
        for slot in SlotId::ALL {
            let Some(ability) = controller.get_mut(slot) else {
                continue;
            };
            let Some(request) = ability.expire_request(clock.now, settings.request_timeout) else {
                continue;
            };
            warn!("{entity:?} {slot}: request {request:?} timed out");
            table.mirror_slot(slot, controller.get(slot), clock.now);
            feedback.write(AbilityFeedback {
                entity,
                slot,
                kind: FeedbackKind::TimedOut,
            });
        }
    }
}
