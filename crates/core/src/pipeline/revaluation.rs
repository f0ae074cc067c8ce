//! Marks every OPEN paper position to market.

use crate::domain::records::{PortfolioPosition, Revaluation};
use crate::error::{detail, RevaluationError};
use crate::pricing::PriceSource;
use crate::storage::PortfolioStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// `(current - entry) / entry * 100`, rounded to 2 decimals. `None` when the entry price
/// cannot anchor a percentage.
pub fn pnl_percent(entry_price: f64, current_price: f64) -> Option<f64> {
    if !entry_price.is_finite() || entry_price <= 0.0 || !current_price.is_finite() {
        return None;
    }
    let raw = (current_price - entry_price) / entry_price * 100.0;
    Some((raw * 100.0).round() / 100.0)
}

#[derive(Debug, Clone, Default)]
pub struct RevaluationSummary {
    pub open: usize,
    pub updated: usize,
    /// Positions left untouched because no price was available.
    pub unpriced: usize,
    pub failures: Vec<RevaluationError>,
}

enum Step {
    Updated(Revaluation),
    Unpriced,
}

pub struct PositionRevaluation {
    store: Arc<dyn PortfolioStore>,
    prices: Arc<dyn PriceSource>,
}

impl PositionRevaluation {
    pub fn new(store: Arc<dyn PortfolioStore>, prices: Arc<dyn PriceSource>) -> Self {
        Self { store, prices }
    }

    /// Errors only when the open positions cannot be listed.
    pub async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<RevaluationSummary> {
        let positions = self.store.open_positions().await?;
        let mut summary = RevaluationSummary {
            open: positions.len(),
            ..Default::default()
        };
        tracing::info!(
            count = positions.len(),
            source = self.prices.source_name(),
            "revaluing open positions"
        );

        for position in &positions {
            match self.revalue(position, now).await {
                Ok(Step::Updated(revaluation)) => {
                    summary.updated += 1;
                    tracing::info!(
                        position_id = %position.id,
                        ticker = %position.ticker,
                        entry = position.entry_price,
                        current = revaluation.current_price,
                        pnl_percent = revaluation.pnl_percent,
                        "position revalued"
                    );
                }
                Ok(Step::Unpriced) => {
                    summary.unpriced += 1;
                    tracing::warn!(
                        position_id = %position.id,
                        ticker = %position.ticker,
                        "no current price; position left unchanged"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        position_id = %position.id,
                        ticker = %position.ticker,
                        error = %err.detail,
                        "position revaluation failed"
                    );
                    summary.failures.push(err);
                }
            }
        }

        Ok(summary)
    }

    async fn revalue(
        &self,
        position: &PortfolioPosition,
        now: DateTime<Utc>,
    ) -> Result<Step, RevaluationError> {
        let to_error = |err: anyhow::Error| RevaluationError {
            position_id: position.id,
            ticker: position.ticker.to_string(),
            detail: detail(&err),
        };

        let price = self
            .prices
            .current_price(&position.ticker)
            .await
            .map_err(to_error)?;
        let Some(current_price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
            return Ok(Step::Unpriced);
        };
        let pnl = pnl_percent(position.entry_price, current_price).ok_or_else(|| {
            to_error(anyhow::anyhow!(
                "entry price {} cannot anchor a pnl",
                position.entry_price
            ))
        })?;

        let revaluation = Revaluation {
            current_price,
            pnl_percent: pnl,
            updated_at: now,
        };
        self.store
            .update_valuation(position.id, &revaluation)
            .await
            .map_err(to_error)?;
        Ok(Step::Updated(revaluation))
    }
}
