//! Configuration management

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use vsm_secrets::{DataStore, KeyStore, ManagerConfig, MemoryDataStore, MemoryKeyStore};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub secrets: ManagerConfig,

    #[serde(default)]
    pub data_store: StoreConfig,

    #[serde(default)]
    pub key_store: StoreConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Backend selection, keyed by the `type` tag
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum StoreConfig {
    #[default]
    #[serde(rename = "memory")]
    Memory,
}

impl StoreConfig {
    pub fn build_data_store(&self) -> Arc<dyn DataStore> {
        match self {
            Self::Memory => Arc::new(MemoryDataStore::new()),
        }
    }

    pub fn build_key_store(&self) -> Arc<dyn KeyStore> {
        match self {
            Self::Memory => Arc::new(MemoryKeyStore::new()),
        }
    }
}

fn default_port() -> u16 {
    8443
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("vsm").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("VSM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}
