use ::server::gameplay::{PowerUpPad, ServerGameplayPlugin};
use ::server::network::{ServerNetworkConfig, ServerNetworkPlugin, ServerTransport};
use bevy::prelude::*;
use lightyear::crossbeam::CrossbeamIo;
use lightyear::prelude::server::*;
use protocol::*;

#[test]
fn test_server_network_plugin_spawns_udp_server() {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(bevy::log::LogPlugin::default());
    app.add_plugins(ServerPlugins::default());
    app.add_plugins(ProtocolPlugin);

    let config = ServerNetworkConfig {
        transports: vec![ServerTransport::Udp { port: 7000 }],
        ..Default::default()
    };
    app.add_plugins(ServerNetworkPlugin { config });

    app.update();

    let mut udp_query = app
        .world_mut()
        .query_filtered::<Entity, (With<NetcodeServer>, With<ServerUdpIo>)>();
    assert_eq!(
        udp_query.iter(app.world()).count(),
        1,
        "Should have one UDP server"
    );
}

#[test]
fn test_server_network_plugin_spawns_crossbeam_server() {
    let (_client_io, server_io) = CrossbeamIo::new_pair();

    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(ServerPlugins::default());
    app.add_plugins(ProtocolPlugin);
    app.add_plugins(ServerNetworkPlugin {
        config: ServerNetworkConfig {
            transports: vec![ServerTransport::Crossbeam { io: server_io }],
            ..Default::default()
        },
    });

    app.update();

    let mut query = app
        .world_mut()
        .query_filtered::<Entity, (With<NetcodeServer>, With<CrossbeamIo>)>();
    assert_eq!(
        query.iter(app.world()).count(),
        1,
        "Should have one crossbeam server"
    );
}

#[test]
fn test_server_network_plugin_config_is_resource() {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(ServerPlugins::default());
    app.add_plugins(ProtocolPlugin);

    let config = ServerNetworkConfig {
        transports: vec![ServerTransport::Udp { port: 7100 }],
        ..Default::default()
    };
    app.add_plugins(ServerNetworkPlugin { config });

    app.update();

    assert!(app.world().contains_resource::<ServerNetworkConfig>());
}

#[test]
fn test_server_gameplay_plugin_spawns_world() {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(ServerPlugins::default());
    app.add_plugins(ProtocolPlugin);
    app.add_plugins(ServerGameplayPlugin);

    app.update();

    let mut pads = app.world_mut().query::<&PowerUpPad>();
    let pads: Vec<PowerUpPad> = pads.iter(app.world()).cloned().collect();
    assert_eq!(pads.len(), 2, "Should spawn one pad per power-up slot");
    assert!(pads.iter().all(|pad| pad.slot.is_power_up()));

    let catalog = app.world().resource::<AbilityCatalog>();
    for pad in &pads {
        assert!(
            catalog.get(&pad.ability).is_some(),
            "Pad ability {} missing from catalog",
            pad.ability
        );
    }
}
