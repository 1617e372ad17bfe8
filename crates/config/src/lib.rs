//! Configuration management for the lead pipeline
//!
//! Supports loading configuration from:
//! - A TOML file (`leadline.toml`, optional)
//! - Environment variables (`LEADLINE_` prefix, `__` section separator)
//!
//! Missing provider keys are not an error: each unconfigured provider
//! routes to its deterministic fallback at runtime.

pub mod settings;

pub use settings::{
    CacheConfig, CallConfig, ProviderConfig, ServerConfig, Settings, load_settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
