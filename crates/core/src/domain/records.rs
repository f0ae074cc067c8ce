use crate::domain::analysis::{Direction, ScoredSnapshot};
use crate::domain::ticker::TickerSymbol;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Attribution tag written on predictions produced by the batch pipeline.
pub const PIPELINE_PERSONA: &str = "AI_LAB_BATCH";

/// The three stores a finished analysis is synced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Discovery,
    AnalysisCache,
    Predictions,
}

impl Destination {
    pub const ALL: [Destination; 3] = [
        Destination::Discovery,
        Destination::AnalysisCache,
        Destination::Predictions,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Self::Discovery => "daily_discovery",
            Self::AnalysisCache => "stock_analysis_cache",
            Self::Predictions => "ai_predictions",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Dashboard row; keyed by ticker, last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub ticker: TickerSymbol,
    pub price: f64,
    pub volume: String,
    pub change: String,
    pub sector: String,
    pub dna_score: f64,
    pub risk_level: String,
    pub ai_summary: String,
    pub updated_at: DateTime<Utc>,
}

impl DiscoveryRecord {
    pub fn from_scored(scored: &ScoredSnapshot, now: DateTime<Utc>) -> Self {
        let quote = &scored.quote;
        let analysis = &scored.analysis;
        Self {
            ticker: quote.ticker.clone(),
            price: quote.price,
            volume: volume_display(quote.volume),
            change: change_display(quote.change_percent),
            sector: quote
                .sector
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            dna_score: analysis.score,
            risk_level: analysis.risk_level.to_string(),
            ai_summary: analysis.summary.clone(),
            updated_at: now,
        }
    }
}

/// `"3.14%"`, or `"0%"` for a flat (or unknown) change.
pub fn change_display(change_percent: f64) -> String {
    if change_percent == 0.0 || !change_percent.is_finite() {
        return "0%".to_string();
    }
    format!("{change_percent:.2}%")
}

/// Volume rendered as an integer string.
pub fn volume_display(volume: f64) -> String {
    if !volume.is_finite() || volume <= 0.0 {
        return "0".to_string();
    }
    format!("{:.0}", volume.round())
}

/// Full analysis payload keyed by ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCacheRecord {
    pub ticker: TickerSymbol,
    pub analysis: serde_json::Value,
    pub dna_score: f64,
    pub pop_probability: f64,
    pub created_at: DateTime<Utc>,
}

impl AnalysisCacheRecord {
    pub fn from_scored(scored: &ScoredSnapshot, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let analysis = serde_json::to_value(&scored.analysis)
            .context("failed to serialize analysis payload")?;
        Ok(Self {
            ticker: scored.ticker().clone(),
            analysis,
            dna_score: scored.analysis.score,
            pop_probability: scored.analysis.pop_probability,
            created_at: now,
        })
    }
}

/// Directional call recorded for later grading. One row per ticker per analysis day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub ticker: TickerSymbol,
    pub dna_score: f64,
    pub predicted_direction: Direction,
    pub start_price: f64,
    pub persona_used: String,
    pub analysis_date: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_scored(scored: &ScoredSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            ticker: scored.ticker().clone(),
            dna_score: scored.analysis.score,
            predicted_direction: scored.analysis.direction(),
            start_price: scored.quote.price,
            persona_used: PIPELINE_PERSONA.to_string(),
            analysis_date: now,
        }
    }

    pub fn analysis_day(&self) -> NaiveDate {
        self.analysis_date.date_naive()
    }
}

/// A prediction awaiting its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPrediction {
    pub id: Uuid,
    pub ticker: TickerSymbol,
    pub dna_score: f64,
    pub predicted_direction: Direction,
    pub start_price: Option<f64>,
    pub persona_used: Option<String>,
    pub analysis_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionGrade {
    pub price_7d: f64,
    pub roi_percent: f64,
    pub is_correct: bool,
    pub checked_at: DateTime<Utc>,
}

impl PredictionGrade {
    pub fn accuracy_score(&self) -> f64 {
        if self.is_correct {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaPerformance {
    pub persona_name: String,
    pub total_predictions: i64,
    pub correct_predictions: i64,
    pub avg_roi: f64,
    pub verified_at: DateTime<Utc>,
}

/// Historical reference pattern used for similarity matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendRecord {
    pub id: Uuid,
    pub ticker: String,
    pub name: String,
    pub period: String,
    pub description: String,
    pub metrics: serde_json::Value,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => anyhow::bail!("unknown position status: {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub id: Uuid,
    pub ticker: TickerSymbol,
    pub status: PositionStatus,
    pub entry_price: f64,
    pub current_price: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// New values for an OPEN position after a price refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Revaluation {
    pub current_price: f64,
    pub pnl_percent: f64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{AnalysisResult, Recommendation, RiskLevel};
    use crate::domain::quote::QuoteSnapshot;
    use chrono::TimeZone;

    fn scored(score: f64) -> ScoredSnapshot {
        let ticker = TickerSymbol::parse("MULN").unwrap();
        ScoredSnapshot {
            quote: QuoteSnapshot {
                ticker: ticker.clone(),
                price: 1.25,
                change_percent: 12.3456,
                volume: 1_234_567.4,
                relative_volume: Some(2.1),
                average_volume_10d: None,
                news_headlines: vec![],
                sector: None,
                captured_at: Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
            },
            analysis: AnalysisResult {
                ticker,
                score,
                risk_level: RiskLevel::High,
                recommendation: Recommendation::Buy,
                summary: "s".to_string(),
                matched_reference: None,
                bull_case: vec![],
                bear_case: vec![],
                pop_probability: 0.3,
            },
        }
    }

    #[test]
    fn discovery_uses_display_strings() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let rec = DiscoveryRecord::from_scored(&scored(70.0), now);
        assert_eq!(rec.change, "12.35%");
        assert_eq!(rec.volume, "1234567");
        assert_eq!(rec.sector, "Unknown");
        assert_eq!(rec.risk_level, "High");
        assert_eq!(rec.updated_at, now);
    }

    #[test]
    fn display_helpers_handle_flat_and_missing_values() {
        assert_eq!(change_display(0.0), "0%");
        assert_eq!(change_display(-3.0), "-3.00%");
        assert_eq!(change_display(f64::NAN), "0%");
        assert_eq!(volume_display(0.0), "0");
        assert_eq!(volume_display(99.6), "100");
    }

    #[test]
    fn prediction_label_follows_score() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let bull = PredictionRecord::from_scored(&scored(60.0), now);
        let bear = PredictionRecord::from_scored(&scored(59.0), now);
        assert_eq!(bull.predicted_direction, Direction::Bullish);
        assert_eq!(bear.predicted_direction, Direction::Bearish);
        assert_eq!(bull.start_price, 1.25);
        assert_eq!(bull.persona_used, PIPELINE_PERSONA);
        assert_eq!(bull.analysis_day(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }

    #[test]
    fn cache_record_embeds_full_payload() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let rec = AnalysisCacheRecord::from_scored(&scored(81.0), now).unwrap();
        assert_eq!(rec.dna_score, 81.0);
        assert_eq!(rec.pop_probability, 0.3);
        assert_eq!(rec.analysis["dnaScore"], 81.0);
        assert_eq!(rec.analysis["ticker"], "MULN");
    }

    #[test]
    fn position_status_parses_case_insensitively() {
        assert_eq!(PositionStatus::parse("open").unwrap(), PositionStatus::Open);
        assert_eq!(PositionStatus::parse("CLOSED").unwrap(), PositionStatus::Closed);
        assert!(PositionStatus::parse("PENDING").is_err());
    }
}
