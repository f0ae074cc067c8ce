use crate::domain::records::AnalysisCacheRecord;
use crate::domain::ticker::TickerSymbol;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub async fn upsert(pool: &sqlx::PgPool, record: &AnalysisCacheRecord) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO stock_analysis_cache (ticker, analysis, dna_score, pop_probability, created_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (ticker) DO UPDATE \
           SET analysis = EXCLUDED.analysis, dna_score = EXCLUDED.dna_score, \
               pop_probability = EXCLUDED.pop_probability, created_at = EXCLUDED.created_at",
    )
    .persistent(false)
    .bind(record.ticker.as_str())
    .bind(&record.analysis)
    .bind(record.dna_score)
    .bind(record.pop_probability)
    .bind(record.created_at)
    .execute(pool)
    .await
    .context("upsert stock_analysis_cache failed")?;

    Ok(())
}

pub async fn get(
    pool: &sqlx::PgPool,
    ticker: &TickerSymbol,
) -> anyhow::Result<Option<AnalysisCacheRecord>> {
    let row = sqlx::query_as::<_, (String, Value, f64, f64, DateTime<Utc>)>(
        "SELECT ticker, analysis, dna_score, pop_probability, created_at \
         FROM stock_analysis_cache \
         WHERE ticker = $1",
    )
    .bind(ticker.as_str())
    .fetch_optional(pool)
    .await
    .context("select stock_analysis_cache failed")?;

    let Some((ticker, analysis, dna_score, pop_probability, created_at)) = row else {
        return Ok(None);
    };

    Ok(Some(AnalysisCacheRecord {
        ticker: TickerSymbol::parse(&ticker)?,
        analysis,
        dna_score,
        pop_probability,
        created_at,
    }))
}
