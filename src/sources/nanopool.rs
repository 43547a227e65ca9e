use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::metrics::derived;
use crate::sources::{
    GlobalsOutput, PoolOp, PoolOutput, PoolSource, http_get_json, json_f64,
};
use crate::types::point::{FieldValue, MetricsPoint};
use crate::types::price::PriceTable;

const NANOPOOL_API: &str = "https://api.nanopool.org/v1";

pub struct NanopoolSource {
    client: reqwest::Client,
    url: String,
    wallet: String,
}

/// State threaded through one fetch cycle: the earnings operation consumes
/// the hashrate the hashrate operation reported.
#[derive(Default)]
struct FetchState {
    reported_hashrate: Option<i64>,
}

impl NanopoolSource {
    pub fn new(client: reqwest::Client, wallet: &str, coin: &str) -> Self {
        tracing::debug!("Nanopool {} / {}", wallet, coin);
        NanopoolSource {
            client,
            url: format!("{}/{}", NANOPOOL_API, coin),
            wallet: wallet.to_string(),
        }
    }

    /// Point the source at an explicit base URL (tests).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.url = url.trim_end_matches('/').to_string();
        self
    }

    /// Unwrap the `{status, data}` envelope. A `status: false` body fails
    /// the calling operation only; a missing `data` key decodes to null,
    /// which some endpoints use for "nothing to report".
    async fn json(&self, uri: &str) -> Result<Value> {
        let url = format!("{}{}", self.url, uri);
        let body = http_get_json(&self.client, &url, None).await?;
        let envelope: NanopoolEnvelope =
            serde_json::from_value(body).map_err(|e| Error::Decode {
                url: url.clone(),
                message: e.to_string(),
            })?;
        if !envelope.status {
            return Err(Error::Decode {
                url,
                message: envelope
                    .error
                    .unwrap_or_else(|| "status false".to_string()),
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

    async fn payments(&self, prices: &PriceTable, out: &mut PoolOutput) -> Result<()> {
        let payments: Vec<NanopoolPayment> =
            self.json_as(&format!("/payments/{}", self.wallet)).await?;

        let mut amounts = Vec::new();
        for payment in payments {
            if !payment.confirmed.unwrap_or(false) {
                continue;
            }
            let Some(amount) = payment.amount else {
                tracing::warn!("Confirmed payment carries no amount, skipping it");
                continue;
            };
            amounts.push(amount);
            match payment.date.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
                Some(time) => out.points.push(
                    MetricsPoint::new("payments")
                        .field("amount", FieldValue::Float(amount))
                        .at(time),
                ),
                None => tracing::warn!("Confirmed payment carries no usable date"),
            }
        }
        tracing::debug!("{} payments", amounts.len());

        if let Some(point) = derived::total_payments_point(&amounts, prices) {
            out.points.push(point);
        }
        Ok(())
    }

    async fn account(&self, out: &mut PoolOutput) -> Result<()> {
        let settings: NanopoolUserSettings = self
            .json_as(&format!("/usersettings/{}", self.wallet))
            .await?;
        let account: NanopoolAccount =
            self.json_as(&format!("/user/{}", self.wallet)).await?;

        let mut point = MetricsPoint::new("account");
        match account.balance.as_ref().and_then(json_f64) {
            Some(balance) => point = point.field("balance", FieldValue::Float(balance)),
            None => tracing::warn!("Account response carries no balance"),
        }
        match settings.payout.as_ref().and_then(json_f64) {
            Some(payout) => point = point.field("payout", FieldValue::Float(payout)),
            None => tracing::warn!("User settings carry no payout threshold"),
        }
        if point.has_fields() {
            out.points.push(point);
        }

        for worker in account.workers {
            let Some(id) = worker.id else {
                tracing::warn!("Worker entry without id, skipping it");
                continue;
            };
            let Some(hashrate) = worker.hashrate.as_ref().and_then(json_f64) else {
                tracing::warn!("Worker {} reports no hashrate, skipping it", id);
                continue;
            };
            out.workers.insert(id.clone(), hashrate as i64);

            let mut worker_point = MetricsPoint::new("pool_workers")
                .tag("worker", id)
                .field("hashrate", FieldValue::Integer(hashrate as i64));
            if let Some(avg) = worker.h1.as_ref().and_then(json_f64) {
                worker_point =
                    worker_point.field("avghashrate", FieldValue::Integer(avg as i64));
            }
            out.points.push(worker_point);
        }
        Ok(())
    }

    async fn hashrate(&self, state: &mut FetchState, out: &mut PoolOutput) -> Result<()> {
        let reported = self
            .json(&format!("/reportedhashrate/{}", self.wallet))
            .await?;
        let account: NanopoolAccount =
            self.json_as(&format!("/user/{}", self.wallet)).await?;

        let mut point = MetricsPoint::new("hashrate");
        match json_f64(&reported) {
            Some(hashrate) => {
                state.reported_hashrate = Some(hashrate as i64);
                point = point.field("reported", FieldValue::Integer(hashrate as i64));
            }
            None => tracing::warn!("No reported hashrate for {}", self.wallet),
        }
        if let Some(calculated) = account.hashrate.as_ref().and_then(json_f64) {
            point = point.field("calculated", FieldValue::Integer(calculated as i64));
        }
        if let Some(avg) = account
            .avg_hashrate
            .as_ref()
            .and_then(|avg| avg.h1.as_ref())
            .and_then(json_f64)
        {
            point = point.field("avg", FieldValue::Integer(avg as i64));
        }
        if point.has_fields() {
            out.points.push(point);
        }
        Ok(())
    }

    async fn earnings(&self, state: &FetchState, out: &mut PoolOutput) -> Result<()> {
        let Some(reported) = state.reported_hashrate else {
            return Err(Error::MissingField {
                field: "reported_hashrate",
                context: "nanopool earnings",
            });
        };
        let data = self
            .json(&format!("/approximated_earnings/{}", reported))
            .await?;
        // The API answers null when it cannot approximate — that is
        // "earnings unavailable", not an error.
        if data.is_null() {
            tracing::debug!("Approximated earnings unavailable for {}", self.wallet);
            return Ok(());
        }
        let earnings: NanopoolEarnings =
            serde_json::from_value(data).map_err(|e| Error::Decode {
                url: format!("{}/approximated_earnings/{}", self.url, reported),
                message: e.to_string(),
            })?;

        let mut point = MetricsPoint::new("earnings");
        for (key, value) in [
            ("month_dollars", earnings.month.as_ref().and_then(|p| p.dollars)),
            ("month_euros", earnings.month.as_ref().and_then(|p| p.euros)),
            ("day_dollars", earnings.day.as_ref().and_then(|p| p.dollars)),
            ("day_euros", earnings.day.as_ref().and_then(|p| p.euros)),
        ] {
            match value {
                Some(figure) => point = point.field(key, FieldValue::Float(figure)),
                None => tracing::warn!("Earnings response carries no {}", key),
            }
        }
        if point.has_fields() {
            out.points.push(point);
        }
        Ok(())
    }
}

#[async_trait]
impl PoolSource for NanopoolSource {
    fn pool(&self) -> &'static str {
        "nanopool"
    }

    fn operations(&self) -> &'static [PoolOp] {
        &[
            PoolOp::Prices,
            PoolOp::Payments,
            PoolOp::Account,
            PoolOp::Hashrate,
            PoolOp::Earnings,
        ]
    }

    async fn fetch_globals(&self) -> Result<GlobalsOutput> {
        let raw: BTreeMap<String, Value> = self.json_as("/prices").await?;

        let mut prices = PriceTable::new();
        for (key, value) in &raw {
            let label = key.strip_prefix("price_").unwrap_or(key);
            match json_f64(value) {
                Some(price) => prices.insert(label, price),
                None => tracing::warn!("Skipping non-numeric price {}", key),
            }
        }

        let mut point = MetricsPoint::new("prices");
        for (currency, price) in prices.iter() {
            point = point.field(currency.clone(), FieldValue::Float(price));
        }
        let points = if point.has_fields() { vec![point] } else { Vec::new() };

        Ok(GlobalsOutput { prices, points })
    }

    async fn fetch(&self, prices: &PriceTable) -> PoolOutput {
        let mut out = PoolOutput::default();
        let mut state = FetchState::default();

        for op in self.operations() {
            let result = match op {
                PoolOp::Prices => continue,
                PoolOp::Payments => self.payments(prices, &mut out).await,
                PoolOp::Account => self.account(&mut out).await,
                PoolOp::Hashrate => self.hashrate(&mut state, &mut out).await,
                PoolOp::Earnings => self.earnings(&state, &mut out).await,
            };
            if let Err(err) = result {
                tracing::warn!("nanopool {:?} failed: {}", op, err);
                if err.is_transport() {
                    break;
                }
            }
        }
        out
    }
}

#[derive(Deserialize)]
struct NanopoolEnvelope {
    status: bool,
    data: Option<Value>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct NanopoolPayment {
    date: Option<i64>,      // Unix seconds
    amount: Option<f64>,
    confirmed: Option<bool>,
}

#[derive(Deserialize)]
struct NanopoolUserSettings {
    payout: Option<Value>,
}

#[derive(Deserialize)]
struct NanopoolAccount {
    balance: Option<Value>,
    hashrate: Option<Value>,
    #[serde(rename = "avgHashrate")]
    avg_hashrate: Option<NanopoolAvgHashrate>,
    #[serde(default)]
    workers: Vec<NanopoolWorker>,
}

#[derive(Deserialize)]
struct NanopoolAvgHashrate {
    h1: Option<Value>,
}

#[derive(Deserialize)]
struct NanopoolWorker {
    id: Option<String>,
    hashrate: Option<Value>,
    h1: Option<Value>,
}

#[derive(Deserialize)]
struct NanopoolEarnings {
    day: Option<NanopoolEarningsPeriod>,
    month: Option<NanopoolEarningsPeriod>,
}

#[derive(Deserialize)]
struct NanopoolEarningsPeriod {
    dollars: Option<f64>,
    euros: Option<f64>,
}
