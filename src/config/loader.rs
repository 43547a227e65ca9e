use config::{Config, Environment, File};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::config::{CustomerConfig, GeneralConfig};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub miners: IndexMap<String, CustomerConfig>,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("MINEMETRICS"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))
    }
}
