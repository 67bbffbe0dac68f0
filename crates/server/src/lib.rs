pub mod gameplay;
pub mod network;

pub use gameplay::{NetIdAllocator, PowerUpPad, ServerGameplayPlugin};
pub use network::{ServerNetworkConfig, ServerNetworkPlugin, ServerTransport};
