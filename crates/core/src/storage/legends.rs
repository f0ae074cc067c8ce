use crate::domain::records::LegendRecord;
use anyhow::Context;
use serde_json::Value;
use uuid::Uuid;

pub async fn missing_embedding(pool: &sqlx::PgPool) -> anyhow::Result<Vec<LegendRecord>> {
    let rows = sqlx::query_as::<_, (Uuid, String, String, String, String, Value)>(
        "SELECT id, ticker, name, period, description, metrics \
         FROM stock_legends \
         WHERE embedding IS NULL \
         ORDER BY ticker ASC, id ASC",
    )
    .fetch_all(pool)
    .await
    .context("select stock_legends without embedding failed")?;

    Ok(rows
        .into_iter()
        .map(|(id, ticker, name, period, description, metrics)| LegendRecord {
            id,
            ticker,
            name,
            period,
            description,
            metrics,
            embedding: None,
        })
        .collect())
}

/// Writes the embedding for a legend that does not have one yet.
pub async fn set_embedding(pool: &sqlx::PgPool, id: Uuid, embedding: &[f32]) -> anyhow::Result<()> {
    let res = sqlx::query(
        "UPDATE stock_legends SET embedding = $2 WHERE id = $1 AND embedding IS NULL",
    )
    .persistent(false)
    .bind(id)
    .bind(embedding)
    .execute(pool)
    .await
    .context("update stock_legends embedding failed")?;

    anyhow::ensure!(
        res.rows_affected() == 1,
        "legend {id} not found or already embedded"
    );
    Ok(())
}
