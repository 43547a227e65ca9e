use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::metrics::derived;
use crate::sources::{
    GlobalsOutput, PoolOp, PoolOutput, PoolSource, http_get_json,
};
use crate::types::point::{FieldValue, MetricsPoint};
use crate::types::price::PriceTable;

const ETHERMINE_API: &str = "https://api.ethermine.org";

/// Hashrates arrive in H/s and are reported in MH/s.
const HASHES_PER_MH: f64 = 1_000_000.0;
/// Balances and payouts arrive in the coin's smallest unit.
const WEI_PER_COIN: f64 = 1e18;

pub struct EthermineSource {
    client: reqwest::Client,
    url: String,
    wallet: String,
}

/// The currentStats payload fetched by the account operation feeds the
/// hashrate and earnings operations.
#[derive(Default)]
struct FetchState {
    stats: Option<EthermineStats>,
}

impl EthermineSource {
    pub fn new(client: reqwest::Client, wallet: &str) -> Self {
        tracing::debug!("Ethermine {}", wallet);
        EthermineSource {
            client,
            url: ETHERMINE_API.to_string(),
            wallet: wallet.to_string(),
        }
    }

    /// Point the source at an explicit base URL (tests).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.url = url.trim_end_matches('/').to_string();
        self
    }

    /// Unwrap the `{status: "OK", data}` envelope.
    async fn json(&self, uri: &str) -> Result<Value> {
        let url = format!("{}{}", self.url, uri);
        let body = http_get_json(&self.client, &url, None).await?;
        let envelope: EthermineEnvelope =
            serde_json::from_value(body).map_err(|e| Error::Decode {
                url: url.clone(),
                message: e.to_string(),
            })?;
        if envelope.status != "OK" {
            return Err(Error::Decode {
                url,
                message: format!("status {}", envelope.status),
            });
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    async fn json_as<T: DeserializeOwned>(&self, uri: &str) -> Result<T> {
        let data = self.json(uri).await?;
        serde_json::from_value(data).map_err(|e| Error::Decode {
            url: format!("{}{}", self.url, uri),
            message: e.to_string(),
        })
    }

    /// Payouts are counted and summed into the total-payments aggregate;
    /// per-payment detail points are deliberately not emitted for this
    /// source.
    async fn payments(&self, prices: &PriceTable, out: &mut PoolOutput) -> Result<()> {
        let payouts: Vec<EtherminePayout> = self
            .json_as(&format!("/miner/{}/payouts", self.wallet))
            .await?;
        tracing::debug!("{} payouts from Ethermine", payouts.len());

        let amounts: Vec<f64> = payouts
            .iter()
            .filter_map(|payout| payout.amount)
            .map(|amount| amount / WEI_PER_COIN)
            .collect();
        if let Some(point) = derived::total_payments_point(&amounts, prices) {
            out.points.push(point);
        }
        Ok(())
    }

    async fn account(&self, state: &mut FetchState, out: &mut PoolOutput) -> Result<()> {
        let stats: EthermineStats = self
            .json_as(&format!("/miner/{}/currentStats", self.wallet))
            .await?;
        let settings: EthermineSettings = self
            .json_as(&format!("/miner/{}/settings", self.wallet))
            .await?;

        let mut point = MetricsPoint::new("account");
        match stats.unpaid {
            Some(unpaid) => {
                point = point.field("balance", FieldValue::Float(unpaid / WEI_PER_COIN));
            }
            None => tracing::warn!("Stats response carries no unpaid balance"),
        }
        match settings.min_payout {
            Some(min_payout) => {
                point = point.field("payout", FieldValue::Float(min_payout / WEI_PER_COIN));
            }
            None => tracing::warn!("Settings response carries no payout threshold"),
        }
        if point.has_fields() {
            out.points.push(point);
        }
        state.stats = Some(stats);

        let workers: Vec<EthermineWorker> = self
            .json_as(&format!("/miner/{}/workers", self.wallet))
            .await?;
        for worker in workers {
            let Some(name) = worker.worker else {
                tracing::warn!("Worker entry without name, skipping it");
                continue;
            };
            // ASICs never report a hashrate; fall back to the pool-side
            // current figure.
            let observed = match worker.reported_hashrate {
                Some(reported) if reported != 0.0 => Some(reported),
                _ => worker.current_hashrate.or(worker.reported_hashrate),
            };
            match observed {
                Some(hashrate) => {
                    out.workers
                        .insert(name.clone(), (hashrate / HASHES_PER_MH) as i64);
                }
                None => tracing::warn!("Worker {} reports no hashrate", name),
            }

            let mut worker_point = MetricsPoint::new("pool_workers").tag("worker", name);
            if let Some(reported) = worker.reported_hashrate {
                worker_point = worker_point.field(
                    "hashrate",
                    FieldValue::Integer((reported / HASHES_PER_MH) as i64),
                );
            }
            if let Some(current) = worker.current_hashrate {
                worker_point = worker_point.field(
                    "avghashrate",
                    FieldValue::Integer((current / HASHES_PER_MH) as i64),
                );
            }
            if worker_point.has_fields() {
                out.points.push(worker_point);
            }
        }
        Ok(())
    }

    fn hashrate(&self, state: &FetchState, out: &mut PoolOutput) -> Result<()> {
        let Some(stats) = &state.stats else {
            return Err(Error::MissingField {
                field: "currentStats",
                context: "ethermine hashrate",
            });
        };

        let mut point = MetricsPoint::new("hashrate");
        for (key, value) in [
            ("reported", stats.reported_hashrate),
            ("calculated", stats.current_hashrate),
            ("avg", stats.average_hashrate),
        ] {
            if let Some(hashrate) = value {
                point = point.field(
                    key,
                    FieldValue::Integer((hashrate / HASHES_PER_MH) as i64),
                );
            }
        }
        if point.has_fields() {
            out.points.push(point);
        }
        Ok(())
    }

    /// Earnings are derived analytically from the per-minute dollar figure —
    /// this pool has no earnings endpoint. Euro figures cross-multiply
    /// through the shared price table's usd/eur entries.
    fn earnings(&self, state: &FetchState, prices: &PriceTable, out: &mut PoolOutput) -> Result<()> {
        let Some(stats) = &state.stats else {
            return Err(Error::MissingField {
                field: "currentStats",
                context: "ethermine earnings",
            });
        };
        let Some(usd_per_min) = stats.usd_per_min else {
            return Err(Error::MissingField {
                field: "usdPerMin",
                context: "ethermine earnings",
            });
        };

        let day_dollars = usd_per_min * 60.0 * 24.0;
        let month_dollars = day_dollars * 30.0;
        let mut point = MetricsPoint::new("earnings")
            .field("day_dollars", FieldValue::Float(day_dollars))
            .field("month_dollars", FieldValue::Float(month_dollars));

        match (prices.get("usd"), prices.get("eur")) {
            (Some(usd), Some(eur)) if usd != 0.0 => {
                let month_euros = month_dollars / usd * eur;
                point = point
                    .field("month_euros", FieldValue::Float(month_euros))
                    .field("day_euros", FieldValue::Float(month_euros / 30.0));
            }
            _ => tracing::warn!("Price table lacks usd/eur rates, skipping euro earnings"),
        }
        out.points.push(point);
        Ok(())
    }
}

#[async_trait]
impl PoolSource for EthermineSource {
    fn pool(&self) -> &'static str {
        "ethermine"
    }

    fn operations(&self) -> &'static [PoolOp] {
        &[
            PoolOp::Payments,
            PoolOp::Account,
            PoolOp::Hashrate,
            PoolOp::Earnings,
        ]
    }

    async fn fetch_globals(&self) -> Result<GlobalsOutput> {
        Err(Error::UnsupportedOperation {
            pool: self.pool(),
            op: PoolOp::Prices,
        })
    }

    async fn fetch(&self, prices: &PriceTable) -> PoolOutput {
        let mut out = PoolOutput::default();
        let mut state = FetchState::default();

        for op in self.operations() {
            let result = match op {
                PoolOp::Prices => continue,
                PoolOp::Payments => self.payments(prices, &mut out).await,
                PoolOp::Account => self.account(&mut state, &mut out).await,
                PoolOp::Hashrate => self.hashrate(&state, &mut out),
                PoolOp::Earnings => self.earnings(&state, prices, &mut out),
            };
            if let Err(err) = result {
                tracing::warn!("ethermine {:?} failed: {}", op, err);
                if err.is_transport() {
                    break;
                }
            }
        }
        out
    }
}

#[derive(Deserialize)]
struct EthermineEnvelope {
    status: String,
    data: Option<Value>,
}

#[derive(Deserialize)]
struct EthermineStats {
    unpaid: Option<f64>,
    #[serde(rename = "reportedHashrate")]
    reported_hashrate: Option<f64>,
    #[serde(rename = "currentHashrate")]
    current_hashrate: Option<f64>,
    #[serde(rename = "averageHashrate")]
    average_hashrate: Option<f64>,
    #[serde(rename = "usdPerMin")]
    usd_per_min: Option<f64>,
}

#[derive(Deserialize)]
struct EthermineSettings {
    #[serde(rename = "minPayout")]
    min_payout: Option<f64>,
}

#[derive(Deserialize)]
struct EthermineWorker {
    worker: Option<String>,
    #[serde(rename = "reportedHashrate")]
    reported_hashrate: Option<f64>,
    #[serde(rename = "currentHashrate")]
    current_hashrate: Option<f64>,
}

#[derive(Deserialize)]
struct EtherminePayout {
    amount: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: &str = "0xdef";

    async fn mount(server: &MockServer, uri: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(uri))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    /// Mount the four miner endpoints; wiremock resolves the first matching
    /// mock, so each path is mounted exactly once.
    async fn mount_api(server: &MockServer, stats: Value, workers: Value, payouts: Value) {
        mount(
            server,
            &format!("/miner/{}/payouts", WALLET),
            json!({"status": "OK", "data": payouts}),
        )
        .await;
        mount(
            server,
            &format!("/miner/{}/currentStats", WALLET),
            json!({"status": "OK", "data": stats}),
        )
        .await;
        mount(
            server,
            &format!("/miner/{}/settings", WALLET),
            json!({"status": "OK", "data": {"minPayout": 5e17}}),
        )
        .await;
        mount(
            server,
            &format!("/miner/{}/workers", WALLET),
            json!({"status": "OK", "data": workers}),
        )
        .await;
    }

    fn find<'a>(out: &'a PoolOutput, measurement: &str) -> Vec<&'a MetricsPoint> {
        out.points
            .iter()
            .filter(|p| p.measurement == measurement)
            .collect()
    }

    async fn source(server: &MockServer) -> EthermineSource {
        EthermineSource::new(reqwest::Client::new(), WALLET).with_base_url(&server.uri())
    }

    fn float_field(point: &MetricsPoint, key: &str) -> f64 {
        match point.fields.get(key) {
            Some(FieldValue::Float(v)) => *v,
            other => panic!("expected float field {}, got {:?}", key, other),
        }
    }

    #[tokio::test]
    async fn test_asic_workers_fall_back_to_current_hashrate() {
        let server = MockServer::start().await;
        mount_api(
            &server,
            json!({"unpaid": 1.5e18, "usdPerMin": 0.5}),
            json!([
                {"worker": "asic1", "reportedHashrate": 0, "currentHashrate": 5_000_000},
                {"worker": "gpu1", "reportedHashrate": 120_000_000, "currentHashrate": 115_000_000}
            ]),
            json!([]),
        )
        .await;

        let out = source(&server).await.fetch(&PriceTable::new()).await;
        assert_eq!(out.workers.get("asic1"), Some(&5));
        assert_eq!(out.workers.get("gpu1"), Some(&120));

        let workers = find(&out, "pool_workers");
        let asic = workers
            .iter()
            .find(|p| p.tags.get("worker").map(String::as_str) == Some("asic1"))
            .unwrap();
        assert_eq!(asic.fields.get("hashrate"), Some(&FieldValue::Integer(0)));
        assert_eq!(
            asic.fields.get("avghashrate"),
            Some(&FieldValue::Integer(5))
        );
    }

    #[tokio::test]
    async fn test_units_converted_to_whole_coins_and_mhs() {
        let server = MockServer::start().await;
        mount_api(
            &server,
            json!({
                "unpaid": 1.5e18,
                "reportedHashrate": 755_000_000.0,
                "currentHashrate": 750_000_000.0,
                "averageHashrate": 748_000_000.0,
                "usdPerMin": 0.5
            }),
            json!([]),
            json!([]),
        )
        .await;

        let out = source(&server).await.fetch(&PriceTable::new()).await;

        let account = find(&out, "account");
        assert_eq!(float_field(account[0], "balance"), 1.5);
        assert_eq!(float_field(account[0], "payout"), 0.5);

        let hashrate = find(&out, "hashrate");
        assert_eq!(
            hashrate[0].fields.get("reported"),
            Some(&FieldValue::Integer(755))
        );
        assert_eq!(
            hashrate[0].fields.get("calculated"),
            Some(&FieldValue::Integer(750))
        );
        assert_eq!(
            hashrate[0].fields.get("avg"),
            Some(&FieldValue::Integer(748))
        );
    }

    #[tokio::test]
    async fn test_earnings_cross_multiply_through_shared_table() {
        let server = MockServer::start().await;
        mount_api(
            &server,
            json!({"unpaid": 0.0, "usdPerMin": 0.5}),
            json!([]),
            json!([]),
        )
        .await;

        let mut prices = PriceTable::new();
        prices.insert("usd", 2.0);
        prices.insert("eur", 1.0);
        let out = source(&server).await.fetch(&prices).await;

        let earnings = find(&out, "earnings");
        assert_eq!(float_field(earnings[0], "day_dollars"), 720.0);
        assert_eq!(float_field(earnings[0], "month_dollars"), 21600.0);
        assert_eq!(float_field(earnings[0], "month_euros"), 10800.0);
        assert_eq!(float_field(earnings[0], "day_euros"), 360.0);
    }

    #[tokio::test]
    async fn test_earnings_skip_euros_without_rates() {
        let server = MockServer::start().await;
        mount_api(
            &server,
            json!({"unpaid": 0.0, "usdPerMin": 0.5}),
            json!([]),
            json!([]),
        )
        .await;

        let out = source(&server).await.fetch(&PriceTable::new()).await;
        let earnings = find(&out, "earnings");
        assert_eq!(float_field(earnings[0], "day_dollars"), 720.0);
        assert!(!earnings[0].fields.contains_key("month_euros"));
        assert!(!earnings[0].fields.contains_key("day_euros"));
    }

    #[tokio::test]
    async fn test_payouts_are_summed_without_detail_points() {
        let server = MockServer::start().await;
        mount_api(
            &server,
            json!({"unpaid": 0.0, "usdPerMin": 0.5}),
            json!([]),
            json!([{"amount": 2e18}, {"amount": 1e18}]),
        )
        .await;

        let mut prices = PriceTable::new();
        prices.insert("usd", 2.0);
        let out = source(&server).await.fetch(&prices).await;

        assert!(find(&out, "payments").is_empty());
        let agg = find(&out, "agg_payments");
        assert_eq!(float_field(agg[0], "amount"), 3.0);
        assert_eq!(agg[0].fields.get("count"), Some(&FieldValue::Integer(2)));
        assert_eq!(float_field(agg[0], "usd"), 6.0);
    }

    #[tokio::test]
    async fn test_fetch_globals_is_unsupported() {
        let source = EthermineSource::new(reqwest::Client::new(), WALLET);
        let result = source.fetch_globals().await;
        assert!(matches!(
            result,
            Err(Error::UnsupportedOperation { pool: "ethermine", op: PoolOp::Prices })
        ));
    }
}
