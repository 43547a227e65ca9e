use async_trait::async_trait;
use indexmap::IndexMap;

use crate::config::StaticWorkerConfig;
use crate::metrics::derived;
use crate::sources::{FarmOutput, FarmSource};
use crate::types::aggregate::CustomerAggregate;
use crate::types::worker::{WorkerMap, WorkerStats};

/// Manually declared workers not otherwise monitored. Hashrate precedence
/// per worker: the figure a pool source already observed under the same
/// name, then the configured figure, then zero.
pub struct StaticWorkersSource<'a> {
    config: &'a IndexMap<String, StaticWorkerConfig>,
}

impl<'a> StaticWorkersSource<'a> {
    pub fn new(config: &'a IndexMap<String, StaticWorkerConfig>) -> Self {
        StaticWorkersSource { config }
    }
}

#[async_trait]
impl FarmSource for StaticWorkersSource<'_> {
    fn farm_type(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self, observed: &WorkerMap) -> FarmOutput {
        let mut out = FarmOutput::default();
        let mut total_hashrate = 0.0;
        let mut total_power = 0.0;
        // There is one customer-wide power price assumption for this
        // source: the last worker that declared one.
        let mut avg_power_price = 0.0;

        for (name, worker) in self.config {
            let hashrate = match observed.get(name) {
                Some(reported) => {
                    tracing::debug!("Found observed hashrate {} for {}", reported, name);
                    *reported
                }
                None => worker.hashrate.unwrap_or(0),
            };
            total_hashrate += hashrate as f64;

            let mut power = None;
            let mut efficiency = None;
            if let Some(watts) = worker.power {
                total_power += watts as f64;
                power = Some(watts);
                efficiency = derived::efficiency(hashrate as f64, watts as f64)
                    .map(|value| value as i64);
                if let Some(price) = worker.power_price {
                    avg_power_price = price;
                }
            }

            let stats = WorkerStats {
                name: name.clone(),
                gpus: worker.gpus.unwrap_or(1),
                hashrate,
                power,
                efficiency,
            };
            out.points.push(stats.into_point(self.farm_type()));
        }

        let aggregate = CustomerAggregate {
            avg_power_price,
            hashrate: total_hashrate,
            power: total_power,
            efficiency: derived::efficiency(total_hashrate / 1000.0, total_power),
            total_power_costs: avg_power_price * total_power,
            currency: "€".to_string(),
        };
        out.points.push(aggregate.into_point(self.farm_type()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::point::{FieldValue, MetricsPoint};

    fn config_from(
        entries: Vec<(&str, StaticWorkerConfig)>,
    ) -> IndexMap<String, StaticWorkerConfig> {
        entries
            .into_iter()
            .map(|(name, config)| (name.to_string(), config))
            .collect()
    }

    fn find<'a>(out: &'a FarmOutput, measurement: &str) -> Vec<&'a MetricsPoint> {
        out.points
            .iter()
            .filter(|p| p.measurement == measurement)
            .collect()
    }

    #[tokio::test]
    async fn test_observed_hashrate_overrides_configured() {
        let config = config_from(vec![(
            "rig1",
            StaticWorkerConfig {
                hashrate: Some(100),
                ..Default::default()
            },
        )]);
        let mut observed = WorkerMap::new();
        observed.insert("rig1".to_string(), 500);

        let out = StaticWorkersSource::new(&config).fetch(&observed).await;
        let workers = find(&out, "workers");
        assert_eq!(workers[0].fields.get("hms"), Some(&FieldValue::Integer(500)));
    }

    #[tokio::test]
    async fn test_configured_hashrate_then_zero_fallback() {
        let config = config_from(vec![
            (
                "configured",
                StaticWorkerConfig {
                    hashrate: Some(100),
                    ..Default::default()
                },
            ),
            ("unknown", StaticWorkerConfig::default()),
        ]);

        let out = StaticWorkersSource::new(&config)
            .fetch(&WorkerMap::new())
            .await;
        let workers = find(&out, "workers");
        assert_eq!(
            workers[0].fields.get("hms"),
            Some(&FieldValue::Integer(100))
        );
        assert_eq!(workers[1].fields.get("hms"), Some(&FieldValue::Integer(0)));
        assert_eq!(workers[1].fields.get("gpus"), Some(&FieldValue::Integer(1)));
    }

    #[tokio::test]
    async fn test_power_and_efficiency_only_when_power_configured() {
        let config = config_from(vec![
            (
                "powered",
                StaticWorkerConfig {
                    gpus: Some(2),
                    hashrate: Some(600),
                    power: Some(300),
                    power_price: Some(0.12),
                },
            ),
            (
                "unpowered",
                StaticWorkerConfig {
                    hashrate: Some(400),
                    ..Default::default()
                },
            ),
        ]);

        let out = StaticWorkersSource::new(&config)
            .fetch(&WorkerMap::new())
            .await;
        let workers = find(&out, "workers");
        assert_eq!(
            workers[0].fields.get("power"),
            Some(&FieldValue::Integer(300))
        );
        assert_eq!(
            workers[0].fields.get("efficiency"),
            Some(&FieldValue::Integer(2000))
        );
        assert!(!workers[1].fields.contains_key("power"));
        assert!(!workers[1].fields.contains_key("efficiency"));
    }

    #[tokio::test]
    async fn test_aggregate_uses_last_declared_power_price() {
        let config = config_from(vec![
            (
                "first",
                StaticWorkerConfig {
                    hashrate: Some(1000),
                    power: Some(200),
                    power_price: Some(0.10),
                    ..Default::default()
                },
            ),
            (
                "second",
                StaticWorkerConfig {
                    hashrate: Some(3000),
                    power: Some(300),
                    power_price: Some(0.20),
                    ..Default::default()
                },
            ),
        ]);

        let out = StaticWorkersSource::new(&config)
            .fetch(&WorkerMap::new())
            .await;
        let customers = find(&out, "customers");
        assert_eq!(customers.len(), 1);
        assert_eq!(
            customers[0].tags.get("farm_type"),
            Some(&"static".to_string())
        );
        assert_eq!(customers[0].tags.get("currency"), Some(&"€".to_string()));
        assert_eq!(
            customers[0].fields.get("avg_power_price"),
            Some(&FieldValue::Float(0.20))
        );
        assert_eq!(
            customers[0].fields.get("power"),
            Some(&FieldValue::Integer(500))
        );
        // hashrate is reported in the next unit up
        assert_eq!(
            customers[0].fields.get("hashrate"),
            Some(&FieldValue::Integer(4))
        );
        assert_eq!(
            customers[0].fields.get("total_power_costs"),
            Some(&FieldValue::Float(100.0))
        );
        assert_eq!(
            customers[0].fields.get("efficiency"),
            Some(&FieldValue::Float(8.0))
        );
    }

    #[tokio::test]
    async fn test_aggregate_efficiency_omitted_without_power() {
        let config = config_from(vec![(
            "rig1",
            StaticWorkerConfig {
                hashrate: Some(100),
                ..Default::default()
            },
        )]);

        let out = StaticWorkersSource::new(&config)
            .fetch(&WorkerMap::new())
            .await;
        let customers = find(&out, "customers");
        assert!(!customers[0].fields.contains_key("efficiency"));
        assert_eq!(
            customers[0].fields.get("total_power_costs"),
            Some(&FieldValue::Float(0.0))
        );
    }
}
