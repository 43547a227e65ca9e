use std::collections::BTreeMap;

/// Currency-code → unit-price mapping produced by at most one pool source
/// per cycle and shared read-only with sources lacking their own.
///
/// The table is never mutated after first population; the aggregation
/// engine decides which table each source sees.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceTable(BTreeMap<String, f64>);

impl PriceTable {
    pub fn new() -> Self {
        PriceTable(BTreeMap::new())
    }

    pub fn insert(&mut self, currency: impl Into<String>, unit_price: f64) {
        self.0.insert(currency.into(), unit_price);
    }

    pub fn get(&self, currency: &str) -> Option<f64> {
        self.0.get(currency).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, f64)> {
        self.0.iter().map(|(currency, price)| (currency, *price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_iteration() {
        let mut table = PriceTable::new();
        table.insert("usd", 1800.0);
        table.insert("eur", 1650.0);

        assert!(!table.is_empty());
        assert_eq!(table.get("usd"), Some(1800.0));
        assert_eq!(table.get("gbp"), None);
        assert_eq!(table.iter().count(), 2);
    }

    #[test]
    fn test_default_is_empty() {
        assert!(PriceTable::default().is_empty());
    }
}
