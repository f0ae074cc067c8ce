use crate::domain::analysis::ScoredSnapshot;
use crate::error::detail;
use crate::storage::PortfolioStore;
use chrono::{DateTime, Utc};

/// Minimum score that opens a paper position.
pub const HIGH_CONVICTION_SCORE: f64 = 85.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    BelowThreshold,
    Opened,
    /// The ticker already has a position, open or closed.
    AlreadyHeld,
    Failed(String),
}

/// Best-effort paper entry after a successful run. Never returns an error; a store failure is
/// logged and reported as [`EntryOutcome::Failed`].
pub async fn enter_high_conviction(
    store: &dyn PortfolioStore,
    scored: &ScoredSnapshot,
    now: DateTime<Utc>,
) -> EntryOutcome {
    let ticker = scored.ticker();
    if scored.analysis.score < HIGH_CONVICTION_SCORE {
        return EntryOutcome::BelowThreshold;
    }

    match store
        .open_position_if_absent(ticker, scored.quote.price, now)
        .await
    {
        Ok(true) => {
            tracing::info!(%ticker, price = scored.quote.price, score = scored.analysis.score, "opened paper position");
            EntryOutcome::Opened
        }
        Ok(false) => {
            tracing::info!(%ticker, "paper position already exists; not reopening");
            EntryOutcome::AlreadyHeld
        }
        Err(err) => {
            let detail = detail(&err);
            tracing::warn!(%ticker, error = %detail, "paper entry failed");
            EntryOutcome::Failed(detail)
        }
    }
}
