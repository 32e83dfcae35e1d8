/// Store connection and table creation
pub mod database;

/// Category table section of the configuration file
pub mod categories;

/// Process configuration file loading
pub mod settings;

pub use settings::{AppConfig, StoreConfig, load_config, load_default_config};
