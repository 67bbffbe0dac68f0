use bevy::prelude::*;
use lightyear::crossbeam::CrossbeamIo;
use lightyear::netcode::Key;
use lightyear::prelude::client::*;
use lightyear::prelude::*;
use protocol::*;
use std::net::SocketAddr;

/// Transport type for client
#[derive(Clone, Default)]
pub enum ClientTransport {
    /// UDP transport (default for native client)
    #[default]
    Udp,
    /// Crossbeam channels (for in-memory testing)
    Crossbeam(CrossbeamIo),
}

/// Where and how the client connects. Also available as a resource.
#[derive(Clone, Resource)]
pub struct ClientNetworkConfig {
    pub client_addr: SocketAddr,
    pub server_addr: SocketAddr,
    pub client_id: u64,
    pub protocol_id: u64,
    pub private_key: [u8; 32],
    pub transport: ClientTransport,
}

impl Default for ClientNetworkConfig {
    fn default() -> Self {
        Self {
            client_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            server_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            client_id: 0,
            protocol_id: PROTOCOL_ID,
            private_key: PRIVATE_KEY,
            transport: ClientTransport::default(),
        }
    }
}

/// Plugin that sets up client networking with lightyear
#[derive(Default)]
pub struct ClientNetworkPlugin {
    pub config: ClientNetworkConfig,
}

impl Plugin for ClientNetworkPlugin {
    fn build(&self, app: &mut App) {
        let config = self.config.clone();
        app.insert_resource(config.clone());
        app.add_systems(Startup, move |commands: Commands| {
            setup_client(commands, config.clone());
        });
        app.add_observer(on_connected);
        app.add_observer(on_disconnected);
    }
}

fn setup_client(mut commands: Commands, config: ClientNetworkConfig) {
    // Manual tokens: both sides share the key
    let auth = Authentication::Manual {
        server_addr: config.server_addr,
        client_id: config.client_id,
        private_key: Key::from(config.private_key),
        protocol_id: config.protocol_id,
    };
    let netcode = match NetcodeClient::new(auth, NetcodeConfig::default()) {
        Ok(netcode) => netcode,
        Err(err) => {
            error!("Cannot create netcode client {}: {err:?}", config.client_id);
            return;
        }
    };

    // Base components (always present)
    let mut entity_builder = commands.spawn((
        Name::new("Client"),
        Client::default(),
        LocalAddr(config.client_addr),
        PeerAddr(config.server_addr),
        Link::new(None),
        ReplicationReceiver::default(),
        netcode,
    ));

    // Add transport-specific component
    match config.transport {
        ClientTransport::Udp => {
            entity_builder.insert(UdpIo::default());
        }
        ClientTransport::Crossbeam(crossbeam_io) => {
            entity_builder.insert(crossbeam_io);
        }
    }

    let client = entity_builder.id();
    info!(
        "Client {} connecting to {}",
        config.client_id, config.server_addr
    );

    // Trigger connection
    commands.trigger(Connect { entity: client });
}

fn on_connected(trigger: On<Add, Connected>, config: Res<ClientNetworkConfig>) {
    info!(
        "Client {} connected to {} as {:?}",
        config.client_id, config.server_addr, trigger.entity
    );
}

/// Abilities keep running on stale replicated state after a drop; requests
/// sent from here on time out locally.
fn on_disconnected(trigger: On<Add, Disconnected>, config: Res<ClientNetworkConfig>) {
    warn!(
        "Client {} lost {} ({:?})",
        config.client_id, config.server_addr, trigger.entity
    );
}
