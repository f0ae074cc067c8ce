//! Grades recent directional calls against the current price and rolls the results up per
//! persona.

use crate::domain::analysis::Direction;
use crate::domain::records::{PendingPrediction, PersonaPerformance, PredictionGrade};
use crate::error::{detail, VerificationError};
use crate::pricing::PriceSource;
use crate::storage::PredictionStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const VERIFICATION_WINDOW_DAYS: i64 = 7;

/// Tag used when a prediction carries no attribution.
pub const DEFAULT_PERSONA: &str = "AI_LAB_DEFAULT";

/// `None` when the prediction has no usable start price or the current price is unusable.
pub fn grade(
    prediction: &PendingPrediction,
    current_price: f64,
    now: DateTime<Utc>,
) -> Option<PredictionGrade> {
    let start = prediction.start_price.filter(|p| p.is_finite() && *p > 0.0)?;
    if !current_price.is_finite() || current_price <= 0.0 {
        return None;
    }
    let roi_percent = (current_price - start) / start * 100.0;
    let is_correct = match prediction.predicted_direction {
        Direction::Bullish => roi_percent > 0.0,
        Direction::Bearish => roi_percent < 0.0,
    };
    Some(PredictionGrade {
        price_7d: current_price,
        roi_percent,
        is_correct,
        checked_at: now,
    })
}

#[derive(Debug, Default)]
struct Tally {
    total: i64,
    correct: i64,
    roi_sum: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationSummary {
    pub pending: usize,
    pub graded: usize,
    pub skipped: usize,
    pub failures: Vec<VerificationError>,
    pub personas: Vec<PersonaPerformance>,
}

pub struct PredictionVerifier {
    store: Arc<dyn PredictionStore>,
    prices: Arc<dyn PriceSource>,
}

impl PredictionVerifier {
    pub fn new(store: Arc<dyn PredictionStore>, prices: Arc<dyn PriceSource>) -> Self {
        Self { store, prices }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<VerificationSummary> {
        let since = now - Duration::days(VERIFICATION_WINDOW_DAYS);
        let pending = self.store.pending_predictions(since).await?;
        let mut summary = VerificationSummary {
            pending: pending.len(),
            ..Default::default()
        };
        tracing::info!(count = pending.len(), %since, "verifying predictions");

        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        for prediction in &pending {
            match self.verify_one(prediction, now).await {
                Ok(Some(grade)) => {
                    summary.graded += 1;
                    tracing::info!(
                        prediction_id = %prediction.id,
                        ticker = %prediction.ticker,
                        direction = prediction.predicted_direction.as_str(),
                        roi_percent = grade.roi_percent,
                        correct = grade.is_correct,
                        "prediction graded"
                    );
                    let persona = prediction
                        .persona_used
                        .clone()
                        .filter(|p| !p.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_PERSONA.to_string());
                    let tally = tallies.entry(persona).or_default();
                    tally.total += 1;
                    tally.correct += i64::from(grade.is_correct);
                    tally.roi_sum += grade.roi_percent;
                }
                Ok(None) => {
                    summary.skipped += 1;
                    tracing::debug!(
                        prediction_id = %prediction.id,
                        ticker = %prediction.ticker,
                        "no usable start or current price; skipped"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        prediction_id = %prediction.id,
                        ticker = %prediction.ticker,
                        error = %err.detail,
                        "prediction verification failed"
                    );
                    summary.failures.push(err);
                }
            }
        }

        for (persona_name, tally) in tallies {
            let performance = PersonaPerformance {
                persona_name,
                total_predictions: tally.total,
                correct_predictions: tally.correct,
                avg_roi: round2(tally.roi_sum / tally.total as f64),
                verified_at: now,
            };
            match self.store.upsert_persona_performance(&performance).await {
                Ok(()) => tracing::info!(
                    persona = %performance.persona_name,
                    total = performance.total_predictions,
                    correct = performance.correct_predictions,
                    avg_roi = performance.avg_roi,
                    "persona performance updated"
                ),
                Err(err) => tracing::warn!(
                    persona = %performance.persona_name,
                    error = %detail(&err),
                    "persona performance upsert failed"
                ),
            }
            summary.personas.push(performance);
        }

        Ok(summary)
    }

    async fn verify_one(
        &self,
        prediction: &PendingPrediction,
        now: DateTime<Utc>,
    ) -> Result<Option<PredictionGrade>, VerificationError> {
        let to_error = |err: anyhow::Error| VerificationError {
            prediction_id: prediction.id,
            ticker: prediction.ticker.to_string(),
            detail: detail(&err),
        };

        if prediction.start_price.map_or(true, |p| p <= 0.0) {
            return Ok(None);
        }
        let Some(current) = self
            .prices
            .current_price(&prediction.ticker)
            .await
            .map_err(to_error)?
        else {
            return Ok(None);
        };
        let Some(grade) = grade(prediction, current, now) else {
            return Ok(None);
        };
        self.store
            .record_grade(prediction.id, &grade)
            .await
            .map_err(to_error)?;
        Ok(Some(grade))
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
