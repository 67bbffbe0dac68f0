use serde::{Deserialize, Serialize};

use super::{AbilityDef, AbilityId, AbilityInstanceId, AbilityKind, RequestId, SlotId};

/// Why an ability cannot be activated right now.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum ActivationError {
    #[error("ability is cooling down")]
    NotReady,
    #[error("a request for this ability is already in flight")]
    Pending,
    #[error("needs {needed} resource, {available} available")]
    InsufficientResource { needed: f32, available: f32 },
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("request {0:?} was already applied")]
    AlreadyApplied(RequestId),
    #[error("activated without starting the cooldown")]
    CooldownNotStarted,
}

/// Observable lifecycle phase of an [`AbilityInstance`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AbilityPhase {
    Ready,
    /// Client-local: a request was sent and no verdict has arrived yet.
    Requested { request: RequestId, sent_at: f64 },
    CoolingDown,
}

/// What the caller sees of the world when checking or applying an activation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActivationContext {
    pub now: f64,
    /// Resource currently available to the caster.
    pub available: f32,
    /// Caster's current speed.
    pub speed: f32,
}

/// Gameplay effect produced by a confirmed activation.
#[derive(Clone, Debug, PartialEq)]
pub enum AbilityEffect {
    Dash { speed: f32 },
    Jump { impulse: f32 },
    Shield { absorb: f32, duration: f64 },
    Missile {
        speed: f32,
        lifetime: f64,
        damage: f32,
    },
}

/// UI-facing snapshot of one slot.
///
/// An empty slot reads as `AbilityDescriptor::default()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbilityDescriptor {
    pub name: String,
    pub ability: Option<AbilityId>,
    pub instance: Option<AbilityInstanceId>,
    pub activation_trigger: Option<crate::PlayerActions>,
    pub resource_cost: f32,
    pub cooldown_duration: f64,
    pub ready: bool,
    pub pending: bool,
    pub cooldown_end_time: f64,
    pub icon: Option<String>,
}

impl AbilityDescriptor {
    pub fn is_empty(&self) -> bool {
        self.instance.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PendingRequest {
    request: RequestId,
    sent_at: f64,
}

/// Runtime state of one ability owned by a character.
#[derive(Clone, Debug, PartialEq)]
pub struct AbilityInstance {
    id: AbilityInstanceId,
    ability: AbilityId,
    def: AbilityDef,
    ready: bool,
    cooldown_end: f64,
    pending: Option<PendingRequest>,
    last_applied: Option<RequestId>,
    awaiting_cooldown: bool,
}

impl AbilityInstance {
    pub fn new(id: AbilityInstanceId, ability: AbilityId, def: AbilityDef) -> Self {
        Self {
            id,
            ability,
            def,
            ready: true,
            cooldown_end: 0.0,
            pending: None,
            last_applied: None,
            awaiting_cooldown: false,
        }
    }

    pub fn id(&self) -> AbilityInstanceId {
        self.id
    }

    pub fn ability(&self) -> &AbilityId {
        &self.ability
    }

    pub fn def(&self) -> &AbilityDef {
        &self.def
    }

    pub fn resource_cost(&self) -> f32 {
        self.def.resource_cost
    }

    pub fn cooldown_duration(&self) -> f64 {
        self.def.cooldown
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn cooldown_end(&self) -> f64 {
        self.cooldown_end
    }

    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending.map(|p| p.request)
    }

    pub fn phase(&self) -> AbilityPhase {
        match self.pending {
            Some(p) => AbilityPhase::Requested {
                request: p.request,
                sent_at: p.sent_at,
            },
            None if !self.ready => AbilityPhase::CoolingDown,
            None => AbilityPhase::Ready,
        }
    }

    /// Readiness and capability precondition, ignoring resource.
    pub fn check_readiness(&self, ctx: &ActivationContext) -> Result<(), ActivationError> {
        if self.pending.is_some() {
            return Err(ActivationError::Pending);
        }
        if !self.ready {
            return Err(ActivationError::NotReady);
        }
        match self.def.kind {
            AbilityKind::KineticShield { min_speed, .. } if ctx.speed < min_speed => {
                Err(ActivationError::PreconditionUnmet("moving too slowly"))
            }
            _ => Ok(()),
        }
    }

    pub fn check_activation(&self, ctx: &ActivationContext) -> Result<(), ActivationError> {
        self.check_readiness(ctx)?;
        if ctx.available < self.def.resource_cost {
            return Err(ActivationError::InsufficientResource {
                needed: self.def.resource_cost,
                available: ctx.available,
            });
        }
        Ok(())
    }

    pub fn can_activate(&self, ctx: &ActivationContext) -> bool {
        self.check_activation(ctx).is_ok()
    }

    /// Marks a request as in flight. Further local attempts are gated until a
    /// verdict arrives or the request times out.
    pub fn begin_request(&mut self, request: RequestId, now: f64) {
        self.pending = Some(PendingRequest {
            request,
            sent_at: now,
        });
    }

    pub fn has_applied(&self, request: RequestId) -> bool {
        self.last_applied == Some(request)
    }

    /// Performs the gameplay effect for a server-confirmed request. Does not
    /// check readiness: eligibility was decided by the authority.
    pub fn activate(
        &mut self,
        request: RequestId,
        ctx: &ActivationContext,
    ) -> Result<AbilityEffect, ApplyError> {
        if self.has_applied(request) {
            return Err(ApplyError::AlreadyApplied(request));
        }
        if self.awaiting_cooldown {
            return Err(ApplyError::CooldownNotStarted);
        }
        if self.pending_request() == Some(request) {
            self.pending = None;
        }
        self.last_applied = Some(request);
        self.awaiting_cooldown = true;
        Ok(self.effect(ctx))
    }

    pub fn start_cooldown(&mut self, now: f64) {
        self.ready = false;
        self.cooldown_end = now + self.def.cooldown;
        self.awaiting_cooldown = false;
    }

    /// `activate` followed by `start_cooldown`, as applied on every process
    /// when the authority confirms a request.
    pub fn confirm(
        &mut self,
        request: RequestId,
        ctx: &ActivationContext,
    ) -> Result<AbilityEffect, ApplyError> {
        let effect = self.activate(request, ctx)?;
        self.start_cooldown(ctx.now);
        Ok(effect)
    }

    /// Rejection by the authority (or an optimistic local rejection when
    /// `request` is `None`). Clears the in-flight request, leaves the cooldown
    /// untouched.
    pub fn on_failed(&mut self, request: Option<RequestId>) -> bool {
        match (self.pending, request) {
            (Some(p), Some(r)) if p.request != r => false,
            (Some(_), _) => {
                self.pending = None;
                true
            }
            (None, _) => false,
        }
    }

    /// Drops an in-flight request older than `timeout` seconds.
    pub fn expire_request(&mut self, now: f64, timeout: f64) -> Option<RequestId> {
        let pending = self.pending?;
        if now - pending.sent_at < timeout {
            return None;
        }
        self.pending = None;
        Some(pending.request)
    }

    pub fn remaining_cooldown(&self, now: f64) -> f64 {
        (self.cooldown_end - now).max(0.0)
    }

    /// Flips back to ready once the cooldown has elapsed. Returns true on the
    /// transition.
    pub fn update_tick(&mut self, now: f64) -> bool {
        if !self.ready && now >= self.cooldown_end {
            self.ready = true;
            return true;
        }
        false
    }

    /// Releases in-flight state when the instance leaves its controller.
    pub fn cleanup(&mut self) {
        self.pending = None;
        self.awaiting_cooldown = false;
    }

    pub fn descriptor(&self, slot: SlotId, now: f64) -> AbilityDescriptor {
        AbilityDescriptor {
            name: self.def.name.clone(),
            ability: Some(self.ability.clone()),
            instance: Some(self.id),
            activation_trigger: Some(slot.action()),
            resource_cost: self.def.resource_cost,
            cooldown_duration: self.def.cooldown,
            ready: self.ready,
            pending: self.pending.is_some(),
            cooldown_end_time: now + self.remaining_cooldown(now),
            icon: self.def.icon.clone(),
        }
    }

    fn effect(&self, ctx: &ActivationContext) -> AbilityEffect {
        match self.def.kind {
            AbilityKind::Dash { speed } => AbilityEffect::Dash { speed },
            AbilityKind::StrongJump { impulse } => AbilityEffect::Jump { impulse },
            AbilityKind::KineticShield {
                absorb_per_speed,
                duration,
                ..
            } => AbilityEffect::Shield {
                absorb: ctx.speed * absorb_per_speed,
                duration,
            },
            AbilityKind::SupersonicMissile {
                speed,
                lifetime,
                damage,
            } => AbilityEffect::Missile {
                speed,
                lifetime,
                damage,
            },
            AbilityKind::Shield { absorb, duration } => AbilityEffect::Shield { absorb, duration },
        }
    }
}
