use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::{AbilityEffect, AbilityInstanceId, ActivationError, RequestId, SlotId};
use crate::NetId;

/// Ordered reliable channel carrying every ability request and verdict.
pub struct AbilityChannel;

/// Client → server: "activate whatever is in `slot`, which I believe is
/// `instance`". Carries no cooldown or resource values.
///
/// `slot` is the raw index so that an out-of-range value reaches the server
/// and is dropped there instead of failing to decode.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect, Message)]
pub struct UseAbility {
    pub entity: NetId,
    pub slot: u8,
    pub instance: AbilityInstanceId,
    pub request: RequestId,
}

/// Server → all clients observing `entity`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect, Message)]
pub struct AbilitySucceeded {
    pub entity: NetId,
    pub slot: SlotId,
    pub instance: AbilityInstanceId,
    pub request: RequestId,
}

/// Server → owning client only.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect, Message)]
pub struct AbilityFailed {
    pub entity: NetId,
    pub slot: SlotId,
    pub instance: AbilityInstanceId,
    pub request: RequestId,
    pub reason: FailureReason,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub enum FailureReason {
    InsufficientResource,
    NotReady,
    PreconditionUnmet,
}

impl From<ActivationError> for FailureReason {
    fn from(err: ActivationError) -> Self {
        match err {
            ActivationError::NotReady | ActivationError::Pending => FailureReason::NotReady,
            ActivationError::InsufficientResource { .. } => FailureReason::InsufficientResource,
            ActivationError::PreconditionUnmet(_) => FailureReason::PreconditionUnmet,
        }
    }
}

/// A confirmed activation, local to this process. Gameplay effect systems
/// read these.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct AbilityActivated {
    pub entity: Entity,
    pub slot: SlotId,
    pub effect: AbilityEffect,
}

/// Client-local UI feedback for an activation that did not go through.
#[derive(Clone, Copy, Debug, PartialEq, Message)]
pub struct AbilityFeedback {
    pub entity: Entity,
    pub slot: SlotId,
    pub kind: FeedbackKind,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeedbackKind {
    Rejected(FailureReason),
    TimedOut,
}

impl AbilityFeedback {
    pub fn reason(&self) -> Option<FailureReason> {
        match self.kind {
            FeedbackKind::Rejected(reason) => Some(reason),
            FeedbackKind::TimedOut => None,
        }
    }
}
