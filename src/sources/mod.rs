pub mod ethermine;
pub mod hiveos;
pub mod nanopool;
pub mod static_workers;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::types::point::MetricsPoint;
use crate::types::price::PriceTable;
use crate::types::worker::WorkerMap;

/// Operations a pool source may support. Each variant declares its set via
/// [`PoolSource::operations`] — "this source does not support X" is a
/// queryable fact, not a silently inherited no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolOp {
    Prices,
    Payments,
    Account,
    Hashrate,
    Earnings,
}

/// Result of a `fetch_globals` call: the price table plus any raw points
/// describing it. Global points are flushed as-is, before the per-customer
/// stream.
#[derive(Debug, Default)]
pub struct GlobalsOutput {
    pub prices: PriceTable,
    pub points: Vec<MetricsPoint>,
}

/// Everything one pool source produced in one cycle. The engine merges
/// worker maps and owns flushing — sources never accumulate shared state.
#[derive(Debug, Default)]
pub struct PoolOutput {
    pub points: Vec<MetricsPoint>,
    pub workers: WorkerMap,
}

#[derive(Debug, Default)]
pub struct FarmOutput {
    pub points: Vec<MetricsPoint>,
}

#[async_trait]
pub trait PoolSource: Send + Sync {
    fn pool(&self) -> &'static str;

    /// The explicit capability table for this variant, in execution order.
    fn operations(&self) -> &'static [PoolOp];

    /// Fetch the source-global price table. Only meaningful for variants
    /// whose capability table contains [`PoolOp::Prices`]; all others
    /// return [`Error::UnsupportedOperation`].
    async fn fetch_globals(&self) -> Result<GlobalsOutput>;

    /// Run every supported operation in order. A transport failure aborts
    /// the remaining operations of this call only; any other failure
    /// degrades a single operation. The output accumulated so far is
    /// always returned.
    async fn fetch(&self, prices: &PriceTable) -> PoolOutput;
}

#[async_trait]
pub trait FarmSource: Send + Sync {
    fn farm_type(&self) -> &'static str;

    /// Produce this farm's points, reading the pool-observed hashrates
    /// merged by the engine.
    async fn fetch(&self, observed: &WorkerMap) -> FarmOutput;
}

/// Build the pool source a customer's configuration names.
pub fn make_pool_source(
    client: reqwest::Client,
    config: &PoolConfig,
) -> Result<Box<dyn PoolSource>> {
    match config.pool.as_str() {
        "nanopool" => Ok(Box::new(nanopool::NanopoolSource::new(
            client,
            &config.wallet,
            &config.coin,
        ))),
        "ethermine" => Ok(Box::new(ethermine::EthermineSource::new(
            client,
            &config.wallet,
        ))),
        other => Err(Error::ConfigError(format!("unknown pool type: {}", other))),
    }
}

/// GET a JSON body, treating non-2xx statuses as transport failures.
pub(crate) async fn http_get_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
) -> Result<Value> {
    let mut request = client.get(url).header("Accept", "application/json");
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.map_err(|e| Error::Transport {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    response.json().await.map_err(|e| Error::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Lenient numeric coercion for APIs that report numbers both as JSON
/// numbers and as strings. Anything else counts as "missing".
pub(crate) fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
