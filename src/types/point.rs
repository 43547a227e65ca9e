use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// A value that can be written to a time-series field.
///
/// Absent keys mean "not computed" — a field is never written with a null
/// placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// One time-series record: measurement name, indexed tags, data fields and
/// an optional explicit timestamp (absent means "sink-assigned").
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub time: Option<DateTime<Utc>>,
}

impl MetricsPoint {
    pub fn new(measurement: impl Into<String>) -> Self {
        MetricsPoint {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// A point with no fields carries no data and must not reach the sink.
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}
