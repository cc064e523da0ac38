pub mod settings;

pub use settings::{GatewayConfig, Provider, ProviderSettings, Settings};
