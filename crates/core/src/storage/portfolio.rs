use crate::domain::records::{PortfolioPosition, PositionStatus, Revaluation};
use crate::domain::ticker::TickerSymbol;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

type PositionRow = (
    Uuid,
    String,
    String,
    f64,
    Option<f64>,
    Option<f64>,
    DateTime<Utc>,
);

fn position_from_row(row: PositionRow) -> anyhow::Result<PortfolioPosition> {
    let (id, ticker, status, entry_price, current_price, pnl_percent, updated_at) = row;
    Ok(PortfolioPosition {
        id,
        ticker: TickerSymbol::parse(&ticker)?,
        status: PositionStatus::parse(&status)?,
        entry_price,
        current_price,
        pnl_percent,
        updated_at,
    })
}

/// Rows that no longer map onto a position (e.g. a ticker with whitespace) are logged and
/// left out, so one bad row cannot stall every other position.
fn positions_from_rows(rows: Vec<PositionRow>) -> Vec<PortfolioPosition> {
    rows.into_iter()
        .filter_map(|row| {
            let (id, ticker) = (row.0, row.1.clone());
            position_from_row(row)
                .map_err(|err| {
                    tracing::warn!(
                        position_id = %id,
                        %ticker,
                        error = %format!("{err:#}"),
                        "skipping malformed paper_portfolio row"
                    )
                })
                .ok()
        })
        .collect()
}

pub async fn open_positions(pool: &sqlx::PgPool) -> anyhow::Result<Vec<PortfolioPosition>> {
    let rows = sqlx::query_as::<_, PositionRow>(
        "SELECT id, ticker, status, entry_price, current_price, pnl_percent, updated_at \
         FROM paper_portfolio \
         WHERE status = 'OPEN' \
         ORDER BY ticker ASC",
    )
    .fetch_all(pool)
    .await
    .context("select open paper_portfolio failed")?;

    Ok(positions_from_rows(rows))
}

/// Only OPEN rows are touched; a position closed in the meantime is an error.
pub async fn update_valuation(
    pool: &sqlx::PgPool,
    id: Uuid,
    revaluation: &Revaluation,
) -> anyhow::Result<()> {
    let res = sqlx::query(
        "UPDATE paper_portfolio \
         SET current_price = $2, pnl_percent = $3, updated_at = $4 \
         WHERE id = $1 AND status = 'OPEN'",
    )
    .persistent(false)
    .bind(id)
    .bind(revaluation.current_price)
    .bind(revaluation.pnl_percent)
    .bind(revaluation.updated_at)
    .execute(pool)
    .await
    .context("update paper_portfolio valuation failed")?;

    anyhow::ensure!(
        res.rows_affected() == 1,
        "position {id} not found or no longer OPEN"
    );
    Ok(())
}

pub async fn open_if_absent(
    pool: &sqlx::PgPool,
    ticker: &TickerSymbol,
    price: f64,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "INSERT INTO paper_portfolio (ticker, status, entry_price, current_price, pnl_percent, updated_at) \
         VALUES ($1, 'OPEN', $2, $2, 0, $3) \
         ON CONFLICT (ticker) DO NOTHING",
    )
    .persistent(false)
    .bind(ticker.as_str())
    .bind(price)
    .bind(now)
    .execute(pool)
    .await
    .context("insert paper_portfolio failed")?;

    Ok(res.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(ticker: &str, status: &str) -> PositionRow {
        (
            Uuid::new_v4(),
            ticker.to_string(),
            status.to_string(),
            10.0,
            Some(11.0),
            Some(10.0),
            Utc.with_ymd_and_hms(2026, 6, 1, 21, 0, 0).unwrap(),
        )
    }

    #[test]
    fn malformed_row_is_skipped_not_fatal() {
        let bad = row("BRK B", "OPEN");
        let bad_id = bad.0;
        let rows = vec![row("AMD", "OPEN"), bad, row("", "OPEN"), row("SOFI", "open")];

        let positions = positions_from_rows(rows);

        let tickers: Vec<_> = positions.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AMD", "SOFI"]);
        assert!(positions.iter().all(|p| p.id != bad_id));
        assert_eq!(positions[1].status, PositionStatus::Open);
    }

    #[test]
    fn unknown_status_is_skipped() {
        assert!(positions_from_rows(vec![row("AMD", "PENDING")]).is_empty());
    }
}
