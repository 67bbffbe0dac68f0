use anyhow::Context;
use bevy::prelude::*;
use client::gameplay::ClientGameplayPlugin;
use client::network::{ClientNetworkConfig, ClientNetworkPlugin};
use leafwing_input_manager::prelude::InputManagerPlugin;
use lightyear::prelude::client::*;
use protocol::*;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let client_id = parse_client_id()?;

    App::new()
        .add_plugins(DefaultPlugins.set(AssetPlugin {
            file_path: concat!(env!("CARGO_MANIFEST_DIR"), "/../../assets").to_string(),
            ..default()
        }))
        .add_plugins(ClientPlugins {
            tick_duration: Duration::from_secs_f64(1.0 / FIXED_TIMESTEP_HZ),
        })
        .add_plugins(InputManagerPlugin::<PlayerActions>::default())
        .add_plugins(SharedGameplayPlugin)
        .add_plugins(ClientGameplayPlugin)
        .add_plugins(ClientNetworkPlugin {
            config: ClientNetworkConfig {
                client_id,
                ..Default::default()
            },
        })
        .run();

    Ok(())
}

fn parse_client_id() -> anyhow::Result<u64> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "-c" || args[i] == "--client-id" {
            let id_str = args.get(i + 1).context("--client-id needs a value")?;
            return id_str
                .parse()
                .with_context(|| format!("invalid client id {id_str:?}"));
        }
    }
    Ok(0)
}
