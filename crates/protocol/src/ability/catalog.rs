use bevy::prelude::*;
use bevy_common_assets::ron::RonAssetPlugin;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::AbilityId;

const CATALOG_PATH: &str = "abilities.catalog.ron";

/// Capability-specific tuning. Each variant is one ability behavior; the
/// activation precondition and the gameplay effect both dispatch on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Reflect)]
pub enum AbilityKind {
    /// Horizontal burst along the caster's facing direction.
    Dash { speed: f32 },
    /// Vertical launch.
    StrongJump { impulse: f32 },
    /// Shield that only forms while moving fast; absorb scales with speed.
    KineticShield {
        min_speed: f32,
        absorb_per_speed: f32,
        duration: f64,
    },
    /// Fast projectile fired along the facing direction.
    SupersonicMissile {
        speed: f32,
        lifetime: f64,
        damage: f32,
    },
    /// Flat damage-absorbing shield.
    Shield { absorb: f32, duration: f64 },
}

/// Definition of one ability, as listed in `abilities.catalog.ron`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Reflect)]
pub struct AbilityDef {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub resource_cost: f32,
    /// Seconds.
    pub cooldown: f64,
    pub kind: AbilityKind,
}

/// All known abilities keyed by [`AbilityId`].
#[derive(Resource, Asset, TypePath, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbilityCatalog {
    pub abilities: HashMap<AbilityId, AbilityDef>,
}

impl AbilityCatalog {
    pub fn get(&self, id: &AbilityId) -> Option<&AbilityDef> {
        self.abilities.get(id)
    }

    pub fn from_ron_str(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(source)
    }

    /// Built-in catalog used when no catalog asset is available.
    pub fn builtin() -> Self {
        let entries = [
            (
                "dash",
                AbilityDef {
                    name: "Dash".into(),
                    icon: Some("icons/dash.png".into()),
                    resource_cost: 30.0,
                    cooldown: 3.0,
                    kind: AbilityKind::Dash { speed: 15.0 },
                },
            ),
            (
                "strong_jump",
                AbilityDef {
                    name: "Strong Jump".into(),
                    icon: Some("icons/strong_jump.png".into()),
                    resource_cost: 20.0,
                    cooldown: 4.0,
                    kind: AbilityKind::StrongJump { impulse: 12.0 },
                },
            ),
            (
                "kinetic_shield",
                AbilityDef {
                    name: "Kinetic Shield".into(),
                    icon: Some("icons/kinetic_shield.png".into()),
                    resource_cost: 40.0,
                    cooldown: 8.0,
                    kind: AbilityKind::KineticShield {
                        min_speed: 6.0,
                        absorb_per_speed: 5.0,
                        duration: 3.0,
                    },
                },
            ),
            (
                "supersonic_missile",
                AbilityDef {
                    name: "Supersonic Missile".into(),
                    icon: Some("icons/supersonic_missile.png".into()),
                    resource_cost: 120.0,
                    cooldown: 6.0,
                    kind: AbilityKind::SupersonicMissile {
                        speed: 60.0,
                        lifetime: 2.0,
                        damage: 35.0,
                    },
                },
            ),
            (
                "shield",
                AbilityDef {
                    name: "Shield".into(),
                    icon: Some("icons/shield.png".into()),
                    resource_cost: 50.0,
                    cooldown: 10.0,
                    kind: AbilityKind::Shield {
                        absorb: 50.0,
                        duration: 4.0,
                    },
                },
            ),
        ];
        Self {
            abilities: entries
                .into_iter()
                .map(|(id, def)| (AbilityId::new(id), def))
                .collect(),
        }
    }
}

#[derive(Resource)]
struct AbilityCatalogHandle(Handle<AbilityCatalog>);

/// Loads the ability catalog from `abilities.catalog.ron` and keeps the
/// [`AbilityCatalog`] resource in step with it.
///
/// Until the asset finishes loading the built-in catalog is in place, so
/// characters spawned early still bootstrap.
pub struct AbilityCatalogPlugin;

impl Plugin for AbilityCatalogPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<AbilityCatalog>::new(&["catalog.ron"]));
        app.insert_resource(AbilityCatalog::builtin());
        app.add_systems(Startup, load_ability_catalog);
        app.add_systems(Update, refresh_ability_catalog);
    }
}

fn load_ability_catalog(mut commands: Commands, asset_server: Res<AssetServer>) {
    let handle = asset_server.load::<AbilityCatalog>(CATALOG_PATH);
    commands.insert_resource(AbilityCatalogHandle(handle));
}

fn refresh_ability_catalog(
    mut commands: Commands,
    handle: Option<Res<AbilityCatalogHandle>>,
    catalogs: Res<Assets<AbilityCatalog>>,
    mut events: MessageReader<AssetEvent<AbilityCatalog>>,
) {
    let Some(handle) = handle else {
        events.clear();
        return;
    };
    let changed = events.read().any(|e| {
        matches!(
            e,
            AssetEvent::LoadedWithDependencies { .. } | AssetEvent::Modified { .. }
        )
    });
    if !changed {
        return;
    }
    let Some(catalog) = catalogs.get(&handle.0) else {
        warn!("ability catalog changed but asset not available");
        return;
    };
    info!("Loaded {} ability definitions", catalog.abilities.len());
    commands.insert_resource(catalog.clone());
}
