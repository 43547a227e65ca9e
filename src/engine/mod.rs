pub mod enrich;

use indexmap::IndexMap;

use crate::config::{CustomerConfig, PoolConfig};
use crate::engine::enrich::enrich;
use crate::sink::{RETENTION_AUTOGEN, Sink, TimePrecision};
use crate::sources::hiveos::HiveOsSource;
use crate::sources::static_workers::StaticWorkersSource;
use crate::sources::{self, FarmSource, PoolOp, PoolSource};
use crate::types::point::MetricsPoint;
use crate::types::price::PriceTable;
use crate::types::worker::WorkerMap;

/// Orchestrates one fetch cycle: customers in declared order, pool sources
/// in declared order within a customer, farm sources after all pools.
/// The ordering is load-bearing — it is what makes price-table sharing and
/// worker-map precedence deterministic.
pub struct AggregationEngine<S> {
    http: reqwest::Client,
    sink: S,
}

impl<S: Sink> AggregationEngine<S> {
    pub fn new(sink: S) -> Self {
        AggregationEngine {
            http: reqwest::Client::new(),
            sink,
        }
    }

    pub async fn run(&self, miners: &IndexMap<String, CustomerConfig>) {
        for (customer, config) in miners {
            tracing::info!("Fetching {} ...", customer);
            self.run_customer(customer, config).await;
        }
    }

    pub async fn run_customer(&self, customer: &str, config: &CustomerConfig) {
        let mut pool_sources: Vec<(Box<dyn PoolSource>, &PoolConfig)> = Vec::new();
        for (name, pool_config) in &config.pools {
            match sources::make_pool_source(self.http.clone(), pool_config) {
                Ok(source) => pool_sources.push((source, pool_config)),
                Err(err) => {
                    tracing::warn!("Skipping pool {} for {}: {}", name, customer, err)
                }
            }
        }
        let workers = self.run_pools(customer, &pool_sources).await;

        for token in &config.hiveos {
            let farm = HiveOsSource::new(self.http.clone(), token);
            self.run_farm(customer, &farm, &workers).await;
        }
        if !config.workers.is_empty() {
            let farm = StaticWorkersSource::new(&config.workers);
            self.run_farm(customer, &farm, &workers).await;
        }
    }

    /// Pool phase. The first source to produce a non-empty price table sets
    /// the shared table for the rest of the cycle; it is never overwritten.
    /// A source whose own table is non-empty keeps using its own. Worker
    /// maps merge in declared order, later sources overwriting earlier
    /// entries on name collision.
    async fn run_pools(
        &self,
        customer: &str,
        pool_sources: &[(Box<dyn PoolSource>, &PoolConfig)],
    ) -> WorkerMap {
        let mut workers = WorkerMap::new();
        let mut shared = PriceTable::new();

        for (source, pool_config) in pool_sources {
            let mut own = PriceTable::new();
            if source.operations().contains(&PoolOp::Prices) {
                match source.fetch_globals().await {
                    Ok(globals) => {
                        own = globals.prices;
                        // Global points describe the price table itself and
                        // are flushed raw, outside the customer stream.
                        self.flush(&globals.points).await;
                    }
                    Err(err) => {
                        tracing::warn!("{} fetch_globals failed: {}", source.pool(), err)
                    }
                }
            }
            if shared.is_empty() && !own.is_empty() {
                shared = own.clone();
            }
            let table = if own.is_empty() { &shared } else { &own };

            let mut output = source.fetch(table).await;
            workers.extend(output.workers.drain());
            enrich(
                &mut output.points,
                &[
                    ("customer", customer),
                    ("wallet", &pool_config.wallet),
                    ("coin", &pool_config.coin),
                    ("pool", source.pool()),
                ],
            );
            self.flush(&output.points).await;
        }
        workers
    }

    async fn run_farm(&self, customer: &str, source: &dyn FarmSource, workers: &WorkerMap) {
        let mut output = source.fetch(workers).await;
        enrich(&mut output.points, &[("customer", customer)]);
        self.flush(&output.points).await;
    }

    /// A failed write degrades that batch only, never the cycle.
    async fn flush(&self, points: &[MetricsPoint]) {
        if points.is_empty() {
            return;
        }
        if let Err(err) = self
            .sink
            .flush(points, TimePrecision::Hours, RETENTION_AUTOGEN)
            .await
        {
            tracing::warn!("Unable to flush {} points: {}", points.len(), err);
        }
    }
}
