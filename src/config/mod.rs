#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;
pub mod vault;

#[cfg(feature = "cli")]
pub use cli::{Cli, Command, StocksCommand};
pub use toml_config::Settings;
pub use vault::ApiVault;
