pub mod influx;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::point::MetricsPoint;

/// Default retention policy passed through to the sink.
pub const RETENTION_AUTOGEN: &str = "autogen";

/// Timestamp granularity of a batched write, passed through opaquely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimePrecision {
    Hours,
    Minutes,
    Seconds,
}

impl TimePrecision {
    pub fn as_query_param(&self) -> &'static str {
        match self {
            TimePrecision::Hours => "h",
            TimePrecision::Minutes => "m",
            TimePrecision::Seconds => "s",
        }
    }

    /// Scale a unix-seconds timestamp to this precision's unit.
    pub fn scale_seconds(&self, seconds: i64) -> i64 {
        match self {
            TimePrecision::Hours => seconds / 3600,
            TimePrecision::Minutes => seconds / 60,
            TimePrecision::Seconds => seconds,
        }
    }
}

/// Time-series sink boundary: one batched, at-least-once write per call.
/// The engine is responsible for not emitting duplicates within a cycle;
/// the sink performs no deduplication.
#[async_trait]
pub trait Sink {
    async fn flush(
        &self,
        points: &[MetricsPoint],
        precision: TimePrecision,
        retention: &str,
    ) -> Result<()>;
}
