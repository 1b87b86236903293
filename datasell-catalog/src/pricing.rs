use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bundle::BundleLabel;

/// Built-in storefront prices in GHS, used for any label without a stored price.
pub fn default_price(label: BundleLabel) -> Decimal {
    match label {
        BundleLabel::Mb100 => Decimal::new(120, 2),
        BundleLabel::Mb300 => Decimal::new(270, 2),
        BundleLabel::Mb500 => Decimal::new(370, 2),
        BundleLabel::Gb1 => Decimal::new(570, 2),
        BundleLabel::Gb2 => Decimal::new(1070, 2),
        BundleLabel::Gb3 => Decimal::new(1570, 2),
        BundleLabel::Gb4 => Decimal::new(2070, 2),
        BundleLabel::Gb5 => Decimal::new(2570, 2),
        BundleLabel::Gb10 => Decimal::new(5070, 2),
    }
}

/// Unit price per bundle label.
///
/// The table is total over [`BundleLabel::ALL`]: labels without an explicit
/// entry are priced from [`default_price`]. On the wire it is a flat
/// `{"1GB": "5.70", ...}` object; unknown labels are dropped when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Decimal>", into = "BTreeMap<String, Decimal>")]
pub struct PricingTable {
    prices: BTreeMap<BundleLabel, Decimal>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            prices: BundleLabel::ALL
                .into_iter()
                .map(|label| (label, default_price(label)))
                .collect(),
        }
    }
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn price_of(&self, label: BundleLabel) -> Decimal {
        self.prices
            .get(&label)
            .copied()
            .unwrap_or_else(|| default_price(label))
    }

    pub fn set_price(&mut self, label: BundleLabel, price: Decimal) {
        self.prices.insert(label, price);
    }

    pub fn with_price(mut self, label: BundleLabel, price: Decimal) -> Self {
        self.set_price(label, price);
        self
    }

    /// Every catalog label with its effective price, smallest bundle first.
    pub fn entries(&self) -> Vec<(BundleLabel, Decimal)> {
        BundleLabel::ALL
            .into_iter()
            .map(|label| (label, self.price_of(label)))
            .collect()
    }
}

impl From<BTreeMap<String, Decimal>> for PricingTable {
    fn from(raw: BTreeMap<String, Decimal>) -> Self {
        let mut table = PricingTable::default();
        for (label, price) in raw {
            if let Ok(label) = label.parse::<BundleLabel>() {
                table.set_price(label, price);
            }
        }
        table
    }
}

impl From<PricingTable> for BTreeMap<String, Decimal> {
    fn from(table: PricingTable) -> Self {
        table
            .entries()
            .into_iter()
            .map(|(label, price)| (label.as_str().to_string(), price))
            .collect()
    }
}
