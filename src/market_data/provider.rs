// =============================================================================
// Price Provider: acquisition seam
// =============================================================================
//
// Anything that can turn `(tickers, period)` into a `PriceTable`.  A provider
// must tolerate per-ticker failures: a ticker it cannot deliver is left out of
// the table instead of failing the whole request.

use anyhow::Result;
use async_trait::async_trait;

use crate::market_data::PriceTable;
use crate::types::LookbackPeriod;

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch daily adjusted bars for `tickers` over `period`.
    async fn fetch(&self, tickers: &[String], period: LookbackPeriod) -> Result<PriceTable>;
}
