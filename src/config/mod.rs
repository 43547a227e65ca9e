use indexmap::IndexMap;
use serde::Deserialize;

pub mod loader;

pub use loader::AppConfig;

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub idb: IdbConfig,
}

/// Time-series database endpoint.
#[derive(Debug, Deserialize)]
pub struct IdbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
}

/// One customer's sources. Declaration order is load-bearing: pools run in
/// order (price-table sharing, worker-map precedence), farms run after.
#[derive(Debug, Deserialize)]
pub struct CustomerConfig {
    #[serde(default)]
    pub pools: IndexMap<String, PoolConfig>,
    /// HiveOS API tokens, one farm account each.
    #[serde(default)]
    pub hiveos: Vec<String>,
    /// Manually declared workers not otherwise monitored.
    #[serde(default)]
    pub workers: IndexMap<String, StaticWorkerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub pool: String,
    pub wallet: String,
    pub coin: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticWorkerConfig {
    pub gpus: Option<i64>,
    pub hashrate: Option<i64>,
    pub power: Option<i64>,
    pub power_price: Option<f64>,
}
