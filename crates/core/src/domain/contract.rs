use crate::domain::analysis::{AnalysisResult, MatchedReference, Recommendation, RiskLevel};
use crate::domain::quote::QuoteSnapshot;
use crate::domain::ticker::TickerSymbol;
use anyhow::ensure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Applied whenever a quote carries no relative volume.
pub const DEFAULT_RELATIVE_VOLUME: f64 = 1.5;
pub const DEFAULT_SECTOR: &str = "Unknown";

/// Body returned by the quote capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub price: f64,
    pub change_percent: f64,
    pub volume: f64,
    #[serde(default)]
    pub relative_volume: Option<f64>,
    #[serde(default, rename = "averageVolume10d")]
    pub average_volume_10d: Option<f64>,
    #[serde(default)]
    pub news_headlines: Option<Vec<String>>,
    #[serde(default)]
    pub sector: Option<String>,
}

impl QuoteResponse {
    pub fn validate_and_into_snapshot(
        self,
        ticker: &TickerSymbol,
        captured_at: DateTime<Utc>,
    ) -> anyhow::Result<QuoteSnapshot> {
        ensure!(
            self.price.is_finite() && self.price > 0.0,
            "quote price must be positive (got {})",
            self.price
        );
        ensure!(
            self.change_percent.is_finite(),
            "quote changePercent must be finite"
        );
        ensure!(
            self.volume.is_finite() && self.volume >= 0.0,
            "quote volume must be non-negative (got {})",
            self.volume
        );

        let news_headlines = self
            .news_headlines
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();

        let sector = self
            .sector
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(QuoteSnapshot {
            ticker: ticker.clone(),
            price: self.price,
            change_percent: self.change_percent,
            volume: self.volume,
            relative_volume: self.relative_volume.filter(|v| v.is_finite()),
            average_volume_10d: self.average_volume_10d.filter(|v| v.is_finite()),
            news_headlines,
            sector,
            captured_at,
        })
    }
}

/// Flattened feature set sent to the analysis capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub volume: f64,
    pub relative_volume: f64,
    #[serde(
        rename = "averageVolume10d",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub average_volume_10d: Option<f64>,
    pub news_headlines: Vec<String>,
    pub sector: String,
}

impl AnalyzeRequest {
    pub fn from_snapshot(quote: &QuoteSnapshot) -> Self {
        Self {
            ticker: quote.ticker.to_string(),
            price: quote.price,
            change: quote.change_percent,
            volume: quote.volume,
            relative_volume: quote.relative_volume.unwrap_or(DEFAULT_RELATIVE_VOLUME),
            average_volume_10d: quote.average_volume_10d,
            news_headlines: quote.news_headlines.clone(),
            sector: quote
                .sector
                .clone()
                .unwrap_or_else(|| DEFAULT_SECTOR.to_string()),
        }
    }
}

/// Body returned by the analysis capability. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub dna_score: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub match_reasoning: Option<String>,
    #[serde(default)]
    pub matched_legend: Option<MatchedReference>,
    #[serde(default)]
    pub bull_case: Option<Vec<String>>,
    #[serde(default)]
    pub bear_case: Option<Vec<String>>,
    #[serde(default)]
    pub pop_probability: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalyzeResponse {
    pub fn validate_and_into_analysis(self, ticker: &TickerSymbol) -> anyhow::Result<AnalysisResult> {
        if let Some(error) = self.error.filter(|e| !e.trim().is_empty()) {
            anyhow::bail!("analysis capability reported an error: {error}");
        }

        let score = self.dna_score.unwrap_or(0.0);
        ensure!(score.is_finite(), "dnaScore must be finite");

        let non_blank = |s: Option<String>| {
            s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        let summary = non_blank(self.ai_summary)
            .or_else(|| non_blank(self.match_reasoning))
            .unwrap_or_default();

        let matched_reference = self
            .matched_legend
            .filter(|m| !m.ticker.trim().is_empty() && !m.ticker.eq_ignore_ascii_case("none"));

        Ok(AnalysisResult {
            ticker: ticker.clone(),
            score,
            risk_level: RiskLevel::parse_or_default(self.risk_level.as_deref()),
            recommendation: Recommendation::parse_or_default(self.recommendation.as_deref()),
            summary,
            matched_reference,
            bull_case: clean_lines(self.bull_case),
            bear_case: clean_lines(self.bear_case),
            pop_probability: normalize_probability(self.pop_probability),
        })
    }
}

fn clean_lines(lines: Option<Vec<String>>) -> Vec<String> {
    lines
        .unwrap_or_default()
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Maps a probability onto [0, 1]. Values in (1, 100] are read as percentages.
pub fn normalize_probability(raw: Option<f64>) -> f64 {
    match raw {
        Some(p) if p.is_finite() && p > 1.0 && p <= 100.0 => p / 100.0,
        Some(p) if p.is_finite() => p.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ticker() -> TickerSymbol {
        TickerSymbol::parse("IDEX").unwrap()
    }

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 15, 30, 0).unwrap()
    }

    #[test]
    fn quote_accepts_minimal_payload() {
        let v = json!({"price": 2.5, "changePercent": -1.2, "volume": 1000});
        let parsed: QuoteResponse = serde_json::from_value(v).unwrap();
        let snap = parsed.validate_and_into_snapshot(&ticker(), captured()).unwrap();
        assert_eq!(snap.price, 2.5);
        assert_eq!(snap.relative_volume, None);
        assert!(snap.news_headlines.is_empty());
        assert_eq!(snap.sector, None);
        assert_eq!(snap.captured_at, captured());
    }

    #[test]
    fn quote_keeps_optional_fields() {
        let v = json!({
            "price": 2.5,
            "changePercent": 4.0,
            "volume": 1000,
            "relativeVolume": 3.2,
            "averageVolume10d": 312.5,
            "newsHeadlines": ["FDA nod", "  "],
            "sector": "Healthcare"
        });
        let parsed: QuoteResponse = serde_json::from_value(v).unwrap();
        let snap = parsed.validate_and_into_snapshot(&ticker(), captured()).unwrap();
        assert_eq!(snap.relative_volume, Some(3.2));
        assert_eq!(snap.average_volume_10d, Some(312.5));
        assert_eq!(snap.news_headlines, vec!["FDA nod".to_string()]);
        assert_eq!(snap.sector.as_deref(), Some("Healthcare"));
    }

    #[test]
    fn quote_rejects_unusable_price() {
        for price in [0.0, -1.0] {
            let parsed: QuoteResponse =
                serde_json::from_value(json!({"price": price, "changePercent": 0, "volume": 0}))
                    .unwrap();
            assert!(parsed.validate_and_into_snapshot(&ticker(), captured()).is_err());
        }
    }

    #[test]
    fn quote_error_body_does_not_deserialize() {
        let res = serde_json::from_value::<QuoteResponse>(json!({"error": "not found"}));
        assert!(res.is_err());
    }

    #[test]
    fn request_applies_documented_defaults() {
        let snap = QuoteSnapshot {
            ticker: ticker(),
            price: 3.0,
            change_percent: 1.0,
            volume: 10.0,
            relative_volume: None,
            average_volume_10d: None,
            news_headlines: vec![],
            sector: None,
            captured_at: captured(),
        };
        let req = AnalyzeRequest::from_snapshot(&snap);
        assert_eq!(req.relative_volume, DEFAULT_RELATIVE_VOLUME);
        assert_eq!(req.sector, DEFAULT_SECTOR);

        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["relativeVolume"], 1.5);
        assert_eq!(v["newsHeadlines"], json!([]));
        assert!(v.get("averageVolume10d").is_none());
    }

    #[test]
    fn empty_analysis_gets_defaults() {
        let parsed: AnalyzeResponse = serde_json::from_value(json!({})).unwrap();
        let a = parsed.validate_and_into_analysis(&ticker()).unwrap();
        assert_eq!(a.score, 0.0);
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert_eq!(a.recommendation, Recommendation::Hold);
        assert_eq!(a.summary, "");
        assert_eq!(a.matched_reference, None);
        assert!(a.bull_case.is_empty());
        assert_eq!(a.pop_probability, 0.0);
    }

    #[test]
    fn full_analysis_maps_fields() {
        let v = json!({
            "dnaScore": 88,
            "riskLevel": "Low",
            "recommendation": "Strong Buy",
            "aiSummary": " breakout ",
            "matchedLegend": {"ticker": "NVDA", "similarity": 0.91},
            "bullCase": ["volume surge", ""],
            "bearCase": ["dilution"],
            "popProbability": 42
        });
        let parsed: AnalyzeResponse = serde_json::from_value(v).unwrap();
        let a = parsed.validate_and_into_analysis(&ticker()).unwrap();
        assert_eq!(a.score, 88.0);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.recommendation, Recommendation::StrongBuy);
        assert_eq!(a.summary, "breakout");
        assert_eq!(a.matched_reference.unwrap().ticker, "NVDA");
        assert_eq!(a.bull_case, vec!["volume surge".to_string()]);
        assert!((a.pop_probability - 0.42).abs() < 1e-9);
    }

    #[test]
    fn analysis_falls_back_to_match_reasoning_and_drops_none_legend() {
        let v = json!({
            "dnaScore": 12.5,
            "matchReasoning": "looks like 2021 meme run",
            "matchedLegend": {"ticker": "None", "similarity": 0}
        });
        let parsed: AnalyzeResponse = serde_json::from_value(v).unwrap();
        let a = parsed.validate_and_into_analysis(&ticker()).unwrap();
        assert_eq!(a.summary, "looks like 2021 meme run");
        assert_eq!(a.matched_reference, None);
    }

    #[test]
    fn blank_summary_falls_back_to_match_reasoning() {
        let v = json!({"aiSummary": "   ", "matchReasoning": " volume spike like GME "});
        let parsed: AnalyzeResponse = serde_json::from_value(v).unwrap();
        let a = parsed.validate_and_into_analysis(&ticker()).unwrap();
        assert_eq!(a.summary, "volume spike like GME");

        let v = json!({"aiSummary": "", "matchReasoning": ""});
        let parsed: AnalyzeResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.validate_and_into_analysis(&ticker()).unwrap().summary, "");
    }

    #[test]
    fn analysis_error_body_is_rejected() {
        let parsed: AnalyzeResponse =
            serde_json::from_value(json!({"error": "OPENAI_API_KEY is not set"})).unwrap();
        assert!(parsed.validate_and_into_analysis(&ticker()).is_err());
    }

    #[test]
    fn probability_normalization() {
        assert_eq!(normalize_probability(None), 0.0);
        assert_eq!(normalize_probability(Some(0.25)), 0.25);
        assert_eq!(normalize_probability(Some(75.0)), 0.75);
        assert_eq!(normalize_probability(Some(-3.0)), 0.0);
        assert_eq!(normalize_probability(Some(500.0)), 1.0);
        assert_eq!(normalize_probability(Some(f64::NAN)), 0.0);
    }
}
