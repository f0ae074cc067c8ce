//! Scan universe for a market-wide `analyze` run.

use crate::domain::ticker::TickerSymbol;

pub mod yahoo;

/// Liquid names scanned when the screener fails or comes back empty.
pub const FALLBACK_TICKERS: [&str; 20] = [
    "TSLA", "NVDA", "AAPL", "AMD", "AMZN", "MSFT", "GOOGL", "META", "NFLX", "INTC", "PLTR",
    "SOFI", "MARA", "COIN", "LCID", "RIVN", "F", "BAC", "T", "VZ",
];

/// Lists the session's most actively traded tickers, busiest first.
#[async_trait::async_trait]
pub trait MoverSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn most_active(&self, count: usize) -> anyhow::Result<Vec<TickerSymbol>>;
}

pub fn fallback_universe(count: usize) -> Vec<TickerSymbol> {
    FALLBACK_TICKERS
        .iter()
        .filter_map(|s| TickerSymbol::parse(s).ok())
        .take(count)
        .collect()
}

/// Up to `count` distinct tickers from `source`. Never fails: an upstream error or an empty
/// screen falls back to [`FALLBACK_TICKERS`].
pub async fn resolve_universe(source: &dyn MoverSource, count: usize) -> Vec<TickerSymbol> {
    let count = count.max(1);
    let listed = match source.most_active(count).await {
        Ok(listed) => listed,
        Err(err) => {
            tracing::warn!(
                source = source.source_name(),
                error = %format!("{err:#}"),
                "movers screen failed; using fallback universe"
            );
            return fallback_universe(count);
        }
    };

    let mut out: Vec<TickerSymbol> = Vec::with_capacity(count);
    for ticker in listed {
        if out.len() == count {
            break;
        }
        if !out.contains(&ticker) {
            out.push(ticker);
        }
    }

    if out.is_empty() {
        tracing::warn!(source = source.source_name(), "movers screen was empty; using fallback universe");
        return fallback_universe(count);
    }
    tracing::info!(source = source.source_name(), tickers = out.len(), "movers screen resolved");
    out
}
