use crate::domain::records::DiscoveryRecord;
use crate::domain::ticker::TickerSymbol;
use anyhow::Context;
use chrono::{DateTime, Utc};

pub async fn upsert(pool: &sqlx::PgPool, record: &DiscoveryRecord) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO daily_discovery (ticker, price, volume, change, sector, dna_score, risk_level, ai_summary, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (ticker) DO UPDATE \
           SET price = EXCLUDED.price, volume = EXCLUDED.volume, change = EXCLUDED.change, \
               sector = EXCLUDED.sector, dna_score = EXCLUDED.dna_score, \
               risk_level = EXCLUDED.risk_level, ai_summary = EXCLUDED.ai_summary, \
               updated_at = EXCLUDED.updated_at",
    )
    .persistent(false)
    .bind(record.ticker.as_str())
    .bind(record.price)
    .bind(&record.volume)
    .bind(&record.change)
    .bind(&record.sector)
    .bind(record.dna_score)
    .bind(&record.risk_level)
    .bind(&record.ai_summary)
    .bind(record.updated_at)
    .execute(pool)
    .await
    .context("upsert daily_discovery failed")?;

    Ok(())
}

type DiscoveryRow = (
    String,
    f64,
    String,
    String,
    String,
    f64,
    String,
    String,
    DateTime<Utc>,
);

/// Highest scores first, most recently refreshed breaking ties.
pub async fn list_top(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<Vec<DiscoveryRecord>> {
    let rows = sqlx::query_as::<_, DiscoveryRow>(
        "SELECT ticker, price, volume, change, sector, dna_score, risk_level, ai_summary, updated_at \
         FROM daily_discovery \
         ORDER BY dna_score DESC, updated_at DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select daily_discovery failed")?;

    Ok(discoveries_from_rows(rows))
}

fn discoveries_from_rows(rows: Vec<DiscoveryRow>) -> Vec<DiscoveryRecord> {
    rows.into_iter()
        .filter_map(
            |(ticker, price, volume, change, sector, dna_score, risk_level, ai_summary, updated_at)| {
                match TickerSymbol::parse(&ticker) {
                    Ok(ticker) => Some(DiscoveryRecord {
                        ticker,
                        price,
                        volume,
                        change,
                        sector,
                        dna_score,
                        risk_level,
                        ai_summary,
                        updated_at,
                    }),
                    Err(err) => {
                        tracing::warn!(%ticker, error = %err, "skipping malformed daily_discovery row");
                        None
                    }
                }
            },
        )
        .collect()
}
