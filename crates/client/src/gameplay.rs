use bevy::prelude::*;
use leafwing_input_manager::prelude::*;
use lightyear::prelude::client::Client;
use lightyear::prelude::{Controlled, MessageReceiver, MessageSender, Replicated};
use protocol::*;

pub struct ClientGameplayPlugin;

impl Plugin for ClientGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(AbilityClientPlugin);
        app.add_systems(
            Update,
            (
                handle_new_character.before(AbilitySystems::Loadout),
                receive_ability_outcomes.in_set(AbilitySystems::Input),
                send_ability_requests.in_set(AbilitySystems::Resync),
                log_ability_feedback.in_set(AbilitySystems::Resync),
            ),
        );
    }
}

/// Trigger keys for the four ability slots.
pub fn ability_input_map() -> InputMap<PlayerActions> {
    InputMap::new([
        (PlayerActions::Ability1, KeyCode::ShiftLeft),
        (PlayerActions::Ability2, KeyCode::Space),
        (PlayerActions::Ability3, KeyCode::KeyQ),
        (PlayerActions::Ability4, KeyCode::KeyE),
    ])
    .with(PlayerActions::Ability1, GamepadButton::East)
    .with(PlayerActions::Ability2, GamepadButton::South)
    .with(PlayerActions::Ability3, GamepadButton::LeftTrigger)
    .with(PlayerActions::Ability4, GamepadButton::RightTrigger)
}

fn handle_new_character(
    mut commands: Commands,
    query: Query<(Entity, &NetId, Has<Controlled>), (Added<Replicated>, With<CharacterMarker>)>,
) {
    for (entity, net_id, is_controlled) in &query {
        let mut character = commands.entity(entity);
        character.insert(CharacterPhysicsBundle::default());
        if is_controlled {
            info!("Controlling character {net_id:?} as {entity:?}");
            character.insert((
                LocalPlayer,
                ability_input_map(),
                ActionState::<PlayerActions>::default(),
            ));
        } else {
            info!("Remote character {net_id:?} replicated as {entity:?}");
        }
    }
}

fn send_ability_requests(
    mut requests: MessageReader<UseAbility>,
    mut senders: Query<&mut MessageSender<UseAbility>, With<Client>>,
) {
    for request in requests.read() {
        if senders.is_empty() {
            debug!("No server link for {:?}", request.request);
            continue;
        }
        for mut sender in &mut senders {
            sender.send::<AbilityChannel>(request.clone());
        }
    }
}

fn receive_ability_outcomes(
    mut succeeded_receivers: Query<&mut MessageReceiver<AbilitySucceeded>>,
    mut failed_receivers: Query<&mut MessageReceiver<AbilityFailed>>,
    mut succeeded: MessageWriter<AbilitySucceeded>,
    mut failed: MessageWriter<AbilityFailed>,
) {
    for mut receiver in &mut succeeded_receivers {
        for outcome in receiver.receive() {
            succeeded.write(outcome);
        }
    }
    for mut receiver in &mut failed_receivers {
        for outcome in receiver.receive() {
            failed.write(outcome);
        }
    }
}

fn log_ability_feedback(mut feedback: MessageReader<AbilityFeedback>) {
    for message in feedback.read() {
        match message.kind {
            FeedbackKind::Rejected(reason) => {
                debug!("{} rejected: {reason:?}", message.slot)
            }
            FeedbackKind::TimedOut => debug!("{} timed out", message.slot),
        }
    }
}
