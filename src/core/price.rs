use std::collections::HashMap;

use rust_decimal::Decimal;

/// USD price lookup owned by the price-discovery collaborator.
pub trait UsdPriceSource: Send + Sync {
    fn usd_price(&self, mint: &str) -> Option<Decimal>;
}

/// Fixed prices, typically supplied through configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticUsdPrices {
    prices: HashMap<String, Decimal>,
}

impl StaticUsdPrices {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        Self { prices }
    }

    pub fn with_price(mut self, mint: impl Into<String>, price: Decimal) -> Self {
        self.prices.insert(mint.into(), price);
        self
    }
}

impl UsdPriceSource for StaticUsdPrices {
    fn usd_price(&self, mint: &str) -> Option<Decimal> {
        self.prices.get(mint).copied()
    }
}
