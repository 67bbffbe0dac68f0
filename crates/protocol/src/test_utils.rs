//! Test utilities for protocol testing
//!
//! Enable with the `test_utils` feature flag.

use avian3d::prelude::{LinearVelocity, Position, Rotation};
use bevy::prelude::*;
use leafwing_input_manager::prelude::ActionState;

use crate::{
    AbilityAuthorityPlugin, AbilityClientPlugin, AbilityClock, AbilityFailed, AbilityFeedback,
    AbilityLoadout, AbilitySucceeded, CharacterMarker, LocalPlayer, NetId, NetIdIndex,
    PlayerActions, ResourcePool, SlotId, UseAbility,
};

/// Headless app with the server ability role.
pub fn server_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(AbilityAuthorityPlugin);
    app
}

/// Headless app with the client ability role.
pub fn client_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(AbilityClientPlugin);
    app
}

/// A character as it exists on the server and on each client.
#[derive(Clone, Debug)]
pub struct CharacterHandle {
    pub net_id: NetId,
    pub owner: usize,
    pub server: Entity,
    pub clients: Vec<Entity>,
}

/// In-process stand-in for the network: one server app, several client apps,
/// ordered reliable delivery between them.
///
/// `UseAbility` goes from clients to the server, `AbilitySucceeded` to every
/// client, `AbilityFailed` to the owning client only. Replicated components
/// are copied server → clients after every server frame unless held.
pub struct Loopback {
    pub server: App,
    pub clients: Vec<App>,
    characters: Vec<CharacterHandle>,
    /// Requests sent to the server, in arrival order.
    pub sent: Vec<UseAbility>,
    /// Failures delivered, with the client index they went to.
    pub failures_delivered: Vec<(usize, AbilityFailed)>,
    pub successes_delivered: usize,
    hold_replication: bool,
}

impl Loopback {
    pub fn new(clients: usize) -> Self {
        Self {
            server: server_app(),
            clients: (0..clients).map(|_| client_app()).collect(),
            characters: Vec::new(),
            sent: Vec::new(),
            failures_delivered: Vec::new(),
            successes_delivered: 0,
            hold_replication: false,
        }
    }

    /// Spawns a character owned by client `owner`. The server copy has every
    /// replicated component; client copies only get identity until the next
    /// replication pass.
    pub fn spawn_character(
        &mut self,
        net_id: u64,
        owner: usize,
        pool: ResourcePool,
        loadout: AbilityLoadout,
    ) -> CharacterHandle {
        let net_id = NetId(net_id);
        let server = self
            .server
            .world_mut()
            .spawn((
                net_id,
                CharacterMarker,
                pool,
                loadout,
                Position::default(),
                Rotation::default(),
                LinearVelocity::default(),
            ))
            .id();
        let clients = self
            .clients
            .iter_mut()
            .enumerate()
            .map(|(index, app)| {
                let mut entity = app.world_mut().spawn((
                    net_id,
                    CharacterMarker,
                    Position::default(),
                    Rotation::default(),
                    LinearVelocity::default(),
                ));
                if index == owner {
                    entity.insert((LocalPlayer, ActionState::<PlayerActions>::default()));
                }
                entity.id()
            })
            .collect();
        let handle = CharacterHandle {
            net_id,
            owner,
            server,
            clients,
        };
        self.characters.push(handle.clone());
        self.replicate();
        handle
    }

    pub fn hold_replication(&mut self, hold: bool) {
        self.hold_replication = hold;
    }

    pub fn set_time(&mut self, now: f64) {
        for app in std::iter::once(&mut self.server).chain(self.clients.iter_mut()) {
            app.world_mut().resource_mut::<AbilityClock>().now = now;
        }
    }

    /// Presses the trigger for `slot` on the owner's client. Releases any
    /// earlier press first so every call is a fresh edge.
    pub fn press(&mut self, character: &CharacterHandle, slot: SlotId) {
        let entity = character.clients[character.owner];
        let app = &mut self.clients[character.owner];
        let mut action_state = app
            .world_mut()
            .get_mut::<ActionState<PlayerActions>>(entity)
            .expect("owner has an action state");
        action_state.release(&slot.action());
        action_state.press(&slot.action());
    }

    /// Injects a request straight into the server, as a misbehaving or stale
    /// client would.
    pub fn inject_request(&mut self, request: UseAbility) {
        self.sent.push(request.clone());
        self.server.world_mut().write_message(request);
    }

    /// One network step: clients run, requests travel, the server runs,
    /// verdicts and replicated state travel back. Verdicts are applied on the
    /// clients' next step.
    pub fn update(&mut self) {
        for app in &mut self.clients {
            app.update();
        }
        for client in 0..self.clients.len() {
            let requests: Vec<UseAbility> = self.clients[client]
                .world_mut()
                .resource_mut::<Messages<UseAbility>>()
                .drain()
                .collect();
            for request in requests {
                self.inject_request(request);
            }
        }
        for character in &self.characters {
            for (client, &entity) in character.clients.iter().enumerate() {
                if client != character.owner {
                    continue;
                }
                if let Some(mut action_state) = self.clients[client]
                    .world_mut()
                    .get_mut::<ActionState<PlayerActions>>(entity)
                {
                    action_state.release_all();
                }
            }
        }

        self.server.update();

        let succeeded: Vec<AbilitySucceeded> = self
            .server
            .world_mut()
            .resource_mut::<Messages<AbilitySucceeded>>()
            .drain()
            .collect();
        let failed: Vec<AbilityFailed> = self
            .server
            .world_mut()
            .resource_mut::<Messages<AbilityFailed>>()
            .drain()
            .collect();
        for message in succeeded {
            self.successes_delivered += 1;
            for app in &mut self.clients {
                app.world_mut().write_message(message.clone());
            }
        }
        for message in failed {
            let Some(owner) = self
                .characters
                .iter()
                .find(|c| c.net_id == message.entity)
                .map(|c| c.owner)
            else {
                continue;
            };
            self.failures_delivered.push((owner, message.clone()));
            self.clients[owner].world_mut().write_message(message);
        }

        if !self.hold_replication {
            self.replicate();
        }
    }

    pub fn update_n(&mut self, frames: usize) {
        for _ in 0..frames {
            self.update();
        }
    }

    /// Copies replicated components server → clients, touching only what
    /// differs.
    pub fn replicate(&mut self) {
        if self.hold_replication {
            return;
        }
        for character in &self.characters {
            let pool = self.server.world().get::<ResourcePool>(character.server).cloned();
            let loadout = self
                .server
                .world()
                .get::<AbilityLoadout>(character.server)
                .cloned();
            for (client, &entity) in character.clients.iter().enumerate() {
                let world = self.clients[client].world_mut();
                if let Some(pool) = pool.clone() {
                    replicate_component(world, entity, pool);
                }
                if let Some(loadout) = loadout.clone() {
                    replicate_component(world, entity, loadout);
                }
            }
        }
    }

    pub fn server_pool(&self, character: &CharacterHandle) -> ResourcePool {
        self.server
            .world()
            .get::<ResourcePool>(character.server)
            .cloned()
            .expect("server character has a pool")
    }

    /// Feedback messages the given client has emitted so far, drained.
    pub fn drain_feedback(&mut self, client: usize) -> Vec<AbilityFeedback> {
        self.clients[client]
            .world_mut()
            .resource_mut::<Messages<AbilityFeedback>>()
            .drain()
            .collect()
    }

    pub fn server_index(&self) -> &NetIdIndex {
        self.server.world().resource::<NetIdIndex>()
    }
}

fn replicate_component<C: Component<Mutability = bevy::ecs::component::Mutable> + PartialEq>(
    world: &mut World,
    entity: Entity,
    value: C,
) {
    match world.get_mut::<C>(entity) {
        Some(mut current) => {
            current.set_if_neq(value);
        }
        None => {
            world.entity_mut(entity).insert(value);
        }
    }
}
