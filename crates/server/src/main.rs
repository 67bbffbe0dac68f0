use anyhow::Context;
use bevy::asset::AssetPlugin;
use bevy::prelude::*;
use lightyear::prelude::server::*;
use protocol::*;
use server::{ServerGameplayPlugin, ServerNetworkConfig, ServerNetworkPlugin, ServerTransport};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let port = parse_port()?;

    App::new()
        .add_plugins(MinimalPlugins)
        .add_plugins(bevy::log::LogPlugin::default())
        .add_plugins(AssetPlugin {
            file_path: concat!(env!("CARGO_MANIFEST_DIR"), "/../../assets").to_string(),
            ..default()
        })
        .add_plugins(ServerPlugins {
            tick_duration: Duration::from_secs_f64(1.0 / FIXED_TIMESTEP_HZ),
        })
        .add_plugins(SharedGameplayPlugin)
        .add_plugins(ServerGameplayPlugin)
        .add_plugins(ServerNetworkPlugin {
            config: ServerNetworkConfig {
                transports: vec![ServerTransport::Udp { port }],
                ..default()
            },
        })
        .run();

    Ok(())
}

fn parse_port() -> anyhow::Result<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "-p" || args[i] == "--port" {
            let value = args.get(i + 1).context("--port needs a value")?;
            return value
                .parse()
                .with_context(|| format!("invalid port {value:?}"));
        }
    }
    Ok(5000)
}
