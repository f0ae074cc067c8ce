use crate::domain::quote::QuoteSnapshot;
use crate::domain::ticker::TickerSymbol;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scores at or above this are labelled [`Direction::Bullish`].
pub const BULLISH_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Lenient parse; anything unrecognized falls back to the default.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Strong Buy")]
    StrongBuy,
    Buy,
    #[default]
    Hold,
    Sell,
}

impl Recommendation {
    pub const ALL: [Recommendation; 4] = [Self::StrongBuy, Self::Buy, Self::Hold, Self::Sell];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "strong buy" => Some(Self::StrongBuy),
            "buy" => Some(Self::Buy),
            "hold" => Some(Self::Hold),
            "sell" => Some(Self::Sell),
            _ => None,
        }
    }

    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "Strong Buy",
            Self::Buy => "Buy",
            Self::Hold => "Hold",
            Self::Sell => "Sell",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// BULLISH iff `score >= 60`. NaN compares false and is BEARISH.
    pub fn from_score(score: f64) -> Self {
        if score >= BULLISH_THRESHOLD {
            Self::Bullish
        } else {
            Self::Bearish
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim() {
            "BULLISH" => Ok(Self::Bullish),
            "BEARISH" => Ok(Self::Bearish),
            other => anyhow::bail!("unknown predicted direction: {other:?}"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedReference {
    pub ticker: String,
    #[serde(default)]
    pub similarity: f64,
}

/// Output of one synthesis call. The serialized form (camelCase) is also the payload stored
/// in the analysis cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub ticker: TickerSymbol,
    #[serde(rename = "dnaScore")]
    pub score: f64,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    #[serde(rename = "aiSummary")]
    pub summary: String,
    #[serde(rename = "matchedLegend")]
    pub matched_reference: Option<MatchedReference>,
    pub bull_case: Vec<String>,
    pub bear_case: Vec<String>,
    pub pop_probability: f64,
}

impl AnalysisResult {
    pub fn direction(&self) -> Direction {
        Direction::from_score(self.score)
    }
}

/// A quote together with the analysis that was requested for it in the same attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSnapshot {
    pub quote: QuoteSnapshot,
    pub analysis: AnalysisResult,
}

impl ScoredSnapshot {
    pub fn ticker(&self) -> &TickerSymbol {
        &self.quote.ticker
    }
}
