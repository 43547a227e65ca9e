use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::metrics::derived;
use crate::sources::{FarmOutput, FarmSource, http_get_json};
use crate::types::aggregate::CustomerAggregate;
use crate::types::point::{FieldValue, MetricsPoint};
use crate::types::worker::{WorkerMap, WorkerStats};

const HIVEOS_API: &str = "https://api2.hiveos.farm/api/v2";

pub struct HiveOsSource {
    client: reqwest::Client,
    url: String,
    token: String,
}

/// Customer-level running totals over all farms behind one token.
struct FarmTotals {
    hashrate: f64,
    power: f64,
    prices: Vec<f64>,
    power_costs: f64,
    currency: &'static str,
}

impl Default for FarmTotals {
    fn default() -> Self {
        FarmTotals {
            hashrate: 0.0,
            power: 0.0,
            prices: Vec::new(),
            power_costs: 0.0,
            currency: "€",
        }
    }
}

impl HiveOsSource {
    /// Assumed cost per kWh for farms that never configured one.
    pub const DEFAULT_POWER_PRICE: f64 = 0.15;

    pub fn new(client: reqwest::Client, token: &str) -> Self {
        HiveOsSource {
            client,
            url: HIVEOS_API.to_string(),
            token: token.to_string(),
        }
    }

    /// Point the source at an explicit base URL (tests).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.url = url.trim_end_matches('/').to_string();
        self
    }

    async fn auth_check(&self) -> Result<()> {
        let url = format!("{}/auth/check", self.url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::AuthFailed)
        }
    }

    async fn json_as<T: DeserializeOwned>(&self, uri: &str) -> Result<T> {
        let url = format!("{}{}", self.url, uri);
        let body = http_get_json(&self.client, &url, Some(&self.token)).await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| Error::Decode {
            url,
            message: e.to_string(),
        })
    }

    async fn fetch_farms(&self, out: &mut FarmOutput) -> Result<()> {
        let farms: Vec<HiveOsFarm> = self.json_as("/farms").await?;
        if farms.is_empty() {
            tracing::debug!("Token has no farms");
            return Ok(());
        }

        let mut totals = FarmTotals::default();
        for farm in &farms {
            let Some(farm_name) = farm.name.clone() else {
                tracing::warn!("Farm entry without name, skipping it");
                continue;
            };
            self.collect_farm(farm, &farm_name, &mut totals, out).await;
        }

        // prices holds one entry per processed farm, so the mean is only
        // absent when every farm was skipped.
        let Some(avg_power_price) = derived::average_power_price(&totals.prices) else {
            return Ok(());
        };

        tracing::info!(
            "{:.0}MH/s for {:.0}W, avg power price is {:.2}{}",
            totals.hashrate / 1000.0,
            totals.power,
            avg_power_price,
            totals.currency
        );
        let efficiency = derived::efficiency(totals.hashrate / 1000.0, totals.power);
        if let Some(value) = efficiency {
            tracing::info!(
                "Efficiency is {:.0}kH/W, power costs {:.0}{}",
                value,
                totals.power_costs,
                totals.currency
            );
        }

        let aggregate = CustomerAggregate {
            avg_power_price,
            hashrate: totals.hashrate,
            power: totals.power,
            efficiency,
            total_power_costs: totals.power_costs,
            currency: totals.currency.to_string(),
        };
        out.points.push(aggregate.into_point("hiveos"));
        Ok(())
    }

    /// Fold one farm into the totals and emit its worker and farm points.
    /// Every derived field is independently optional — a missing key skips
    /// that field, never the farm.
    async fn collect_farm(
        &self,
        farm: &HiveOsFarm,
        farm_name: &str,
        totals: &mut FarmTotals,
        out: &mut FarmOutput,
    ) {
        let power_price = match farm.power_price {
            Some(price) => price,
            None => {
                tracing::warn!(
                    "{} farm doesn't have power price set, set it: https://the.hiveos.farm/farms/{}/settings",
                    farm_name,
                    farm.id.map(|id| id.to_string()).unwrap_or_default()
                );
                Self::DEFAULT_POWER_PRICE
            }
        };
        totals.prices.push(power_price);
        if farm.power_price_currency.as_deref() == Some("DOL") {
            totals.currency = "$";
        }

        let mut farm_point = MetricsPoint::new("farms")
            .tag("farm", farm_name)
            .field("power_price", FieldValue::Float(power_price));
        if let Some(currency) = &farm.power_price_currency {
            farm_point = farm_point.field(
                "power_price_currency",
                FieldValue::Text(currency.clone()),
            );
        }
        if let Some(count) = farm.workers_count {
            farm_point = farm_point.field("workers_count", FieldValue::Integer(count));
        }
        if let Some(count) = farm.rigs_count {
            farm_point = farm_point.field("rigs_count", FieldValue::Integer(count));
        }

        let farm_hashrate: Option<f64> = farm.hashrates_by_coin.as_ref().map(|rates| {
            rates.iter().filter_map(|rate| rate.hashrate).sum()
        });
        if let Some(hashrate) = farm_hashrate {
            totals.hashrate += hashrate;
        }

        match &farm.stats {
            Some(stats) => {
                if let Some(power) = stats.power_draw {
                    totals.power += power;
                    farm_point =
                        farm_point.field("power_draw", FieldValue::Integer(power as i64));
                    if let Some(hashrate) = farm_hashrate {
                        if let Some(avg_efficiency) =
                            derived::efficiency(hashrate / 1000.0, power)
                        {
                            farm_point = farm_point
                                .field("avg_efficiency", FieldValue::Float(avg_efficiency));
                        }
                    }
                    let monthly = derived::monthly_power_cost(power, power_price);
                    farm_point =
                        farm_point.field("power_cost_per_month", FieldValue::Float(monthly));
                    totals.power_costs += monthly;
                }
                if let Some(gpus) = stats.gpus_total {
                    farm_point = farm_point.field("gpus", FieldValue::Integer(gpus));
                }
                if let Some(gpus) = stats.gpus_online {
                    farm_point = farm_point.field("gpus_online", FieldValue::Integer(gpus));
                }
                if let Some(gpus) = stats.gpus_offline {
                    farm_point = farm_point.field("gpus_offline", FieldValue::Integer(gpus));
                }
                if let Some(cost) = stats.power_cost {
                    if cost > 0.0 {
                        farm_point =
                            farm_point.field("power_cost_per_hour", FieldValue::Float(cost));
                    }
                }
            }
            None => tracing::warn!("Farm {} carries no stats", farm_name),
        }

        match farm.id {
            Some(id) => self.collect_workers(id, farm_name, out).await,
            None => tracing::warn!("Farm {} carries no id, workers not listed", farm_name),
        }

        out.points.push(farm_point);
    }

    async fn collect_workers(&self, farm_id: i64, farm_name: &str, out: &mut FarmOutput) {
        let workers: Vec<HiveOsWorker> =
            match self.json_as(&format!("/farms/{}/workers", farm_id)).await {
                Ok(workers) => workers,
                Err(err) => {
                    tracing::warn!("Unable to list workers for farm {}: {}", farm_name, err);
                    return;
                }
            };

        for worker in workers {
            let Some(name) = worker.name else {
                tracing::warn!("Worker entry without name, skipping it");
                continue;
            };
            // A worker without GPU stats is skipped entirely, not zero-filled.
            let Some(gpu_stats) = worker.gpu_stats else {
                continue;
            };

            let gpus = gpu_stats.len() as i64;
            let hashrate =
                (gpu_stats.iter().filter_map(|gpu| gpu.hash).sum::<f64>() / 1000.0) as i64;
            let power = gpu_stats.iter().filter_map(|gpu| gpu.power).sum::<f64>() as i64;
            let stats = WorkerStats {
                name,
                gpus,
                hashrate,
                power: Some(power),
                efficiency: derived::efficiency(hashrate as f64, power as f64)
                    .map(|value| value as i64),
            };
            out.points.push(stats.into_point(farm_name));
        }
    }
}

#[async_trait]
impl FarmSource for HiveOsSource {
    fn farm_type(&self) -> &'static str {
        "hiveos"
    }

    async fn fetch(&self, _observed: &WorkerMap) -> FarmOutput {
        let mut out = FarmOutput::default();

        // An unusable token yields no output at all; auth failures never
        // propagate past this source.
        if let Err(err) = self.auth_check().await {
            tracing::warn!("HiveOs auth check failed: {}", err);
            return out;
        }

        if let Err(err) = self.fetch_farms(&mut out).await {
            tracing::warn!("HiveOs fetch failed: {}", err);
        }
        out
    }
}

#[derive(Deserialize)]
struct HiveOsFarm {
    id: Option<i64>,
    name: Option<String>,
    power_price: Option<f64>,
    power_price_currency: Option<String>,
    workers_count: Option<i64>,
    rigs_count: Option<i64>,
    stats: Option<HiveOsFarmStats>,
    hashrates_by_coin: Option<Vec<HiveOsCoinHashrate>>,
}

#[derive(Deserialize)]
struct HiveOsFarmStats {
    power_draw: Option<f64>,
    gpus_total: Option<i64>,
    gpus_online: Option<i64>,
    gpus_offline: Option<i64>,
    power_cost: Option<f64>,
}

#[derive(Deserialize)]
struct HiveOsCoinHashrate {
    hashrate: Option<f64>,
}

#[derive(Deserialize)]
struct HiveOsWorker {
    name: Option<String>,
    gpu_stats: Option<Vec<HiveOsGpuStat>>,
}

#[derive(Deserialize)]
struct HiveOsGpuStat {
    hash: Option<f64>,
    power: Option<f64>,
}
