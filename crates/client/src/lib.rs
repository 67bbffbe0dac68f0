pub mod gameplay;
pub mod network;

pub use gameplay::{ability_input_map, ClientGameplayPlugin};
pub use lightyear::netcode::{Key, NetcodeClient};
pub use lightyear::prelude::client::NetcodeConfig;
pub use lightyear::prelude::Authentication;
pub use network::{ClientNetworkConfig, ClientNetworkPlugin, ClientTransport};
