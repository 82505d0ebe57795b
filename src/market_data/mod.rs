pub mod cache;
pub mod price_table;
pub mod provider;
pub mod yahoo;

// Re-exports for convenient access (e.g. `use crate::market_data::PriceTable`).
pub use cache::{CacheStats, PriceCache};
pub use price_table::{PriceBar, PriceSeries, PriceTable};
pub use provider::PriceProvider;
pub use yahoo::YahooChartClient;
