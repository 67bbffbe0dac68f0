use bevy::prelude::*;
use lightyear::crossbeam::CrossbeamIo;
use lightyear::netcode::{Key, NetcodeServer};
use lightyear::prelude::server::*;
use lightyear::prelude::*;
use protocol::*;
use std::net::SocketAddr;
use std::time::Duration;

/// Transport configuration for a server
#[derive(Clone)]
pub enum ServerTransport {
    /// UDP transport on specified port
    Udp { port: u16 },
    /// Crossbeam channels (for in-memory testing)
    Crossbeam { io: CrossbeamIo },
}

/// Configuration for server transports
#[derive(Clone, Resource)]
pub struct ServerNetworkConfig {
    pub transports: Vec<ServerTransport>,
    pub bind_addr: [u8; 4],
    pub protocol_id: u64,
    pub private_key: [u8; 32],
    pub replication_interval: Duration,
}

impl Default for ServerNetworkConfig {
    fn default() -> Self {
        Self {
            transports: vec![ServerTransport::Udp { port: 5000 }],
            bind_addr: [0, 0, 0, 0],
            protocol_id: PROTOCOL_ID,
            private_key: PRIVATE_KEY,
            replication_interval: Duration::from_millis(50),
        }
    }
}

/// Plugin that starts the lightyear server and attaches replication to every
/// client link once it connects.
#[derive(Default)]
pub struct ServerNetworkPlugin {
    pub config: ServerNetworkConfig,
}

impl Plugin for ServerNetworkPlugin {
    fn build(&self, app: &mut App) {
        let config = self.config.clone();
        app.insert_resource(config.clone());
        app.add_systems(Startup, move |commands: Commands| {
            start_server(commands, config.clone());
        });
        app.add_observer(handle_new_client);
        app.add_observer(handle_disconnected_client);
    }
}

fn netcode_server(config: &ServerNetworkConfig) -> NetcodeServer {
    NetcodeServer::new(server::NetcodeConfig {
        protocol_id: config.protocol_id,
        private_key: Key::from(config.private_key),
        ..default()
    })
}

fn start_server(mut commands: Commands, config: ServerNetworkConfig) {
    info!("Starting ability server...");

    for transport in config.transports.iter().cloned() {
        match transport {
            ServerTransport::Udp { port } => {
                let addr = SocketAddr::from((config.bind_addr, port));
                let server = commands
                    .spawn((
                        Name::new("UDP Server"),
                        Server::default(),
                        netcode_server(&config),
                        LocalAddr(addr),
                        ServerUdpIo::default(),
                    ))
                    .id();
                commands.trigger(Start { entity: server });
                info!("UDP server listening on {addr}");
            }
            ServerTransport::Crossbeam { io } => {
                let server = commands
                    .spawn((
                        Name::new("Crossbeam Server"),
                        Server::default(),
                        netcode_server(&config),
                        io,
                    ))
                    .id();
                commands.trigger(Start { entity: server });
                info!("Crossbeam server started for testing");
            }
        }
    }
}

fn handle_new_client(
    trigger: On<Add, Connected>,
    mut commands: Commands,
    config: Res<ServerNetworkConfig>,
) {
    info!("New client connected: {:?}", trigger.entity);
    commands
        .entity(trigger.entity)
        .insert(ReplicationSender::new(
            config.replication_interval,
            SendUpdatesMode::SinceLastAck,
            false,
        ));
}

fn handle_disconnected_client(trigger: On<Add, Disconnected>) {
    info!("Client {:?} disconnected", trigger.entity);
}
