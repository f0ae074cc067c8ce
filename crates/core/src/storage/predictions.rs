use crate::domain::analysis::Direction;
use crate::domain::records::{PendingPrediction, PersonaPerformance, PredictionGrade, PredictionRecord};
use crate::domain::ticker::TickerSymbol;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One row per (ticker, analysis day); a same-day rerun refreshes the row.
pub async fn upsert(pool: &sqlx::PgPool, record: &PredictionRecord) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO ai_predictions (ticker, dna_score, predicted_direction, start_price, persona_used, analysis_date, analysis_day) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (ticker, analysis_day) DO UPDATE \
           SET dna_score = EXCLUDED.dna_score, predicted_direction = EXCLUDED.predicted_direction, \
               start_price = EXCLUDED.start_price, persona_used = EXCLUDED.persona_used, \
               analysis_date = EXCLUDED.analysis_date",
    )
    .persistent(false)
    .bind(record.ticker.as_str())
    .bind(record.dna_score)
    .bind(record.predicted_direction.as_str())
    .bind(record.start_price)
    .bind(&record.persona_used)
    .bind(record.analysis_date)
    .bind(record.analysis_day())
    .execute(pool)
    .await
    .context("upsert ai_predictions failed")?;

    Ok(())
}

type PendingRow = (
    Uuid,
    String,
    f64,
    String,
    Option<f64>,
    Option<String>,
    DateTime<Utc>,
);

fn pending_from_row(row: PendingRow) -> anyhow::Result<PendingPrediction> {
    let (id, ticker, dna_score, direction, start_price, persona_used, analysis_date) = row;
    Ok(PendingPrediction {
        id,
        ticker: TickerSymbol::parse(&ticker)?,
        dna_score,
        predicted_direction: Direction::parse(&direction)?,
        start_price,
        persona_used,
        analysis_date,
    })
}

/// Malformed rows (bad ticker or direction) are logged and dropped so one row cannot abort a
/// whole verification run.
fn pending_from_rows(rows: Vec<PendingRow>) -> Vec<PendingPrediction> {
    rows.into_iter()
        .filter_map(|row| {
            let (id, ticker) = (row.0, row.1.clone());
            pending_from_row(row)
                .map_err(|err| {
                    tracing::warn!(
                        prediction_id = %id,
                        %ticker,
                        error = %format!("{err:#}"),
                        "skipping malformed ai_predictions row"
                    )
                })
                .ok()
        })
        .collect()
}

pub async fn pending_since(
    pool: &sqlx::PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<PendingPrediction>> {
    let rows = sqlx::query_as::<_, PendingRow>(
        "SELECT id, ticker, dna_score, predicted_direction, start_price, persona_used, analysis_date \
         FROM ai_predictions \
         WHERE is_correct IS NULL AND analysis_date >= $1 \
         ORDER BY analysis_date ASC",
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("select pending ai_predictions failed")?;

    Ok(pending_from_rows(rows))
}

pub async fn for_ticker(
    pool: &sqlx::PgPool,
    ticker: &TickerSymbol,
    limit: i64,
) -> anyhow::Result<Vec<PendingPrediction>> {
    let rows = sqlx::query_as::<_, PendingRow>(
        "SELECT id, ticker, dna_score, predicted_direction, start_price, persona_used, analysis_date \
         FROM ai_predictions \
         WHERE ticker = $1 \
         ORDER BY analysis_date DESC \
         LIMIT $2",
    )
    .bind(ticker.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select ai_predictions by ticker failed")?;

    Ok(pending_from_rows(rows))
}

pub async fn record_grade(
    pool: &sqlx::PgPool,
    id: Uuid,
    grade: &PredictionGrade,
) -> anyhow::Result<()> {
    let res = sqlx::query(
        "UPDATE ai_predictions \
         SET price_7d = $2, accuracy_score = $3, is_correct = $4, checked_at = $5 \
         WHERE id = $1 AND is_correct IS NULL",
    )
    .persistent(false)
    .bind(id)
    .bind(grade.price_7d)
    .bind(grade.accuracy_score())
    .bind(grade.is_correct)
    .bind(grade.checked_at)
    .execute(pool)
    .await
    .context("update ai_predictions grade failed")?;

    anyhow::ensure!(
        res.rows_affected() == 1,
        "prediction {id} not found or already graded"
    );
    Ok(())
}

pub async fn upsert_persona_performance(
    pool: &sqlx::PgPool,
    performance: &PersonaPerformance,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO persona_performance (persona_name, total_predictions, correct_predictions, avg_roi, verified_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (persona_name) DO UPDATE \
           SET total_predictions = EXCLUDED.total_predictions, \
               correct_predictions = EXCLUDED.correct_predictions, \
               avg_roi = EXCLUDED.avg_roi, verified_at = EXCLUDED.verified_at",
    )
    .persistent(false)
    .bind(&performance.persona_name)
    .bind(performance.total_predictions)
    .bind(performance.correct_predictions)
    .bind(performance.avg_roi)
    .bind(performance.verified_at)
    .execute(pool)
    .await
    .context("upsert persona_performance failed")?;

    Ok(())
}

pub async fn persona_performance(pool: &sqlx::PgPool) -> anyhow::Result<Vec<PersonaPerformance>> {
    let rows = sqlx::query_as::<_, (String, i64, i64, f64, DateTime<Utc>)>(
        "SELECT persona_name, total_predictions, correct_predictions, avg_roi, verified_at \
         FROM persona_performance \
         ORDER BY avg_roi DESC",
    )
    .fetch_all(pool)
    .await
    .context("select persona_performance failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(persona_name, total_predictions, correct_predictions, avg_roi, verified_at)| {
                PersonaPerformance {
                    persona_name,
                    total_predictions,
                    correct_predictions,
                    avg_roi,
                    verified_at,
                }
            },
        )
        .collect())
}
