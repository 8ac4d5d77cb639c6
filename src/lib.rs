pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{Cli, Command, StocksCommand};
pub use config::{ApiVault, Settings};

pub use adapters::LocalStorage;
pub use core::etl::EtlEngine;
pub use domain::ports::{Pipeline, RecordCount, Storage};
pub use utils::error::{EtlError, Result};
