use std::collections::HashMap;

use crate::types::point::{FieldValue, MetricsPoint};

/// Customer-wide map of worker name/id → integral hashrate, merged from
/// every pool source in declared order (later sources overwrite earlier
/// entries on name collision). Farm sources consume it read-only as their
/// "already observed" hashrate.
pub type WorkerMap = HashMap<String, i64>;

/// One mining rig as reported by a farm source.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerStats {
    pub name: String,
    pub gpus: i64,
    /// MH/s, integral.
    pub hashrate: i64,
    /// Watts; absent when the source does not report power.
    pub power: Option<i64>,
    /// kH per W; absent at zero or unreported power.
    pub efficiency: Option<i64>,
}

impl WorkerStats {
    /// Render as a `workers` measurement tagged with the owning farm.
    /// Power and efficiency fields are omitted when not computed.
    pub fn into_point(self, farm: &str) -> MetricsPoint {
        let mut point = MetricsPoint::new("workers")
            .tag("farm", farm)
            .tag("name", self.name)
            .field("gpus", FieldValue::Integer(self.gpus))
            .field("hms", FieldValue::Integer(self.hashrate));
        if let Some(power) = self.power {
            point = point.field("power", FieldValue::Integer(power));
        }
        if let Some(efficiency) = self.efficiency {
            point = point.field("efficiency", FieldValue::Integer(efficiency));
        }
        point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_omits_uncomputed_fields() {
        let stats = WorkerStats {
            name: "rig1".to_string(),
            gpus: 1,
            hashrate: 60,
            power: None,
            efficiency: None,
        };

        let point = stats.into_point("static");
        assert_eq!(point.tags.get("farm"), Some(&"static".to_string()));
        assert_eq!(point.fields.get("hms"), Some(&FieldValue::Integer(60)));
        assert!(!point.fields.contains_key("power"));
        assert!(!point.fields.contains_key("efficiency"));
    }

    #[test]
    fn test_point_carries_power_and_efficiency_when_present() {
        let stats = WorkerStats {
            name: "shed3".to_string(),
            gpus: 6,
            hashrate: 180,
            power: Some(900),
            efficiency: Some(200),
        };

        let point = stats.into_point("alpha");
        assert_eq!(point.fields.get("power"), Some(&FieldValue::Integer(900)));
        assert_eq!(
            point.fields.get("efficiency"),
            Some(&FieldValue::Integer(200))
        );
    }
}
