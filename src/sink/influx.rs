//! InfluxDB v1 sink speaking Line Protocol over the `/write` endpoint:
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```
//!
//! Points without an explicit time are written without a timestamp and get
//! the server's write time.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::sink::{Sink, TimePrecision};
use crate::types::point::{FieldValue, MetricsPoint};

pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    database: String,
}

impl InfluxSink {
    pub fn new(host: &str, port: u16, database: impl Into<String>) -> Self {
        InfluxSink {
            client: reqwest::Client::new(),
            write_url: format!("http://{}:{}/write", host, port),
            database: database.into(),
        }
    }

    /// Point the sink at an explicit base URL (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.write_url = format!("{}/write", base_url.trim_end_matches('/'));
        self
    }
}

#[async_trait]
impl Sink for InfluxSink {
    async fn flush(
        &self,
        points: &[MetricsPoint],
        precision: TimePrecision,
        retention: &str,
    ) -> Result<()> {
        let lines: Vec<String> = points
            .iter()
            .filter_map(|point| to_line(point, precision))
            .collect();
        if lines.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("db", self.database.as_str()),
                ("rp", retention),
                ("precision", precision.as_query_param()),
            ])
            .body(lines.join("\n"))
            .send()
            .await
            .map_err(|e| Error::SinkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::SinkError(format!(
                "write returned HTTP {}",
                response.status().as_u16()
            )));
        }

        tracing::debug!("Wrote {} points to {}", lines.len(), self.write_url);
        Ok(())
    }
}

/// Render one point as a Line Protocol line. A point without fields carries
/// no data and renders to nothing.
fn to_line(point: &MetricsPoint, precision: TimePrecision) -> Option<String> {
    if !point.has_fields() {
        return None;
    }

    let mut line = escape_name(&point.measurement);
    for (key, value) in &point.tags {
        line.push(',');
        line.push_str(&escape_name(key));
        line.push('=');
        line.push_str(&escape_name(value));
    }

    line.push(' ');
    for (i, (key, value)) in point.fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_name(key));
        line.push('=');
        line.push_str(&render_field_value(value));
    }

    if let Some(time) = point.time {
        line.push(' ');
        line.push_str(&precision.scale_seconds(time.timestamp()).to_string());
    }

    Some(line)
}

fn render_field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{}", v),
        FieldValue::Integer(v) => format!("{}i", v),
        FieldValue::Text(v) => {
            let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{}\"", escaped)
        }
    }
}

/// Escape measurement names, tag keys/values and field keys: commas,
/// equals signs and spaces carry structure in Line Protocol.
fn escape_name(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}
