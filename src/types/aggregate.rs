use crate::types::point::{FieldValue, MetricsPoint};

/// Per-customer composite produced by each farm source type. Pool-derived
/// and farm-derived aggregates are separate records and are never merged —
/// they account for different things (pool earnings vs farm power
/// economics).
#[derive(Clone, Debug, PartialEq)]
pub struct CustomerAggregate {
    /// Cost per kWh in the customer's currency.
    pub avg_power_price: f64,
    /// Accumulated hashrate in the source's reporting unit.
    pub hashrate: f64,
    /// Accumulated power draw in watts.
    pub power: f64,
    /// kH per W; absent at zero power.
    pub efficiency: Option<f64>,
    pub total_power_costs: f64,
    pub currency: String,
}

impl CustomerAggregate {
    /// Render as the `customers` measurement for one farm source type.
    pub fn into_point(self, farm_type: &str) -> MetricsPoint {
        let mut point = MetricsPoint::new("customers")
            .tag("currency", self.currency)
            .tag("farm_type", farm_type)
            .field("avg_power_price", FieldValue::Float(self.avg_power_price))
            .field("hashrate", FieldValue::Integer((self.hashrate / 1000.0) as i64))
            .field("power", FieldValue::Integer(self.power as i64))
            .field("total_power_costs", FieldValue::Float(self.total_power_costs));
        if let Some(efficiency) = self.efficiency {
            point = point.field("efficiency", FieldValue::Float(efficiency));
        }
        point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_shape() {
        let aggregate = CustomerAggregate {
            avg_power_price: 0.15,
            hashrate: 540_000.0,
            power: 2000.0,
            efficiency: Some(270.0),
            total_power_costs: 216.0,
            currency: "€".to_string(),
        };

        let point = aggregate.into_point("hiveos");
        assert_eq!(point.measurement, "customers");
        assert_eq!(point.tags.get("farm_type"), Some(&"hiveos".to_string()));
        assert_eq!(point.tags.get("currency"), Some(&"€".to_string()));
        assert_eq!(point.fields.get("hashrate"), Some(&FieldValue::Integer(540)));
        assert_eq!(point.fields.get("power"), Some(&FieldValue::Integer(2000)));
        assert_eq!(
            point.fields.get("efficiency"),
            Some(&FieldValue::Float(270.0))
        );
    }

    #[test]
    fn test_efficiency_omitted_when_unset() {
        let aggregate = CustomerAggregate {
            avg_power_price: 0.0,
            hashrate: 100.0,
            power: 0.0,
            efficiency: None,
            total_power_costs: 0.0,
            currency: "€".to_string(),
        };

        let point = aggregate.into_point("static");
        assert!(!point.fields.contains_key("efficiency"));
    }
}
