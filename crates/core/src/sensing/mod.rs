use crate::domain::quote::QuoteSnapshot;
use crate::domain::ticker::TickerSymbol;
use crate::error::SensingError;

pub mod smart_quote;

/// Market data capability. Implementations make exactly one upstream call per invocation;
/// retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_quote(&self, ticker: &TickerSymbol) -> Result<QuoteSnapshot, SensingError>;
}
