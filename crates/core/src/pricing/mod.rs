use crate::domain::ticker::TickerSymbol;

pub mod yahoo;

/// Resolves the latest traded price for a ticker. `Ok(None)` means the upstream answered but
/// had no usable price.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn current_price(&self, ticker: &TickerSymbol) -> anyhow::Result<Option<f64>>;
}
