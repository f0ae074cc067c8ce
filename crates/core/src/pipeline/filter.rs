//! Gate between synthesis and Triple-Sync. Only analyses that pass every check are saved.

use crate::domain::analysis::{AnalysisResult, Recommendation, RiskLevel};
use anyhow::Context;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanFilter {
    /// Inclusive.
    pub min_score: f64,
    pub forbidden_risks: Vec<RiskLevel>,
    pub allowed_recommendations: Vec<Recommendation>,
}

impl Default for ScanFilter {
    /// Lets everything through.
    fn default() -> Self {
        Self {
            min_score: 0.0,
            forbidden_risks: Vec::new(),
            allowed_recommendations: Recommendation::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Score,
    Risk,
    Recommendation,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Risk => "risk",
            Self::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScanFilter {
    /// Reads `SCAN_MIN_SCORE`, `SCAN_FORBIDDEN_RISKS` and `SCAN_ALLOWED_RECOMMENDATIONS`.
    /// Lists are comma separated. Unset or blank means "no restriction"; anything unparsable
    /// is an error rather than a silently widened filter.
    pub fn from_env() -> anyhow::Result<Self> {
        let var = |key: &str| std::env::var(key).ok();
        Self::from_values(
            var("SCAN_MIN_SCORE").as_deref(),
            var("SCAN_FORBIDDEN_RISKS").as_deref(),
            var("SCAN_ALLOWED_RECOMMENDATIONS").as_deref(),
        )
    }

    fn from_values(
        min_score: Option<&str>,
        forbidden_risks: Option<&str>,
        allowed_recommendations: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut filter = Self::default();

        if let Some(raw) = min_score.map(str::trim).filter(|s| !s.is_empty()) {
            let score: f64 = raw
                .parse()
                .with_context(|| format!("SCAN_MIN_SCORE is not a number: {raw:?}"))?;
            anyhow::ensure!(score.is_finite(), "SCAN_MIN_SCORE must be finite");
            filter.min_score = score;
        }

        if let Some(raw) = forbidden_risks {
            filter.forbidden_risks = parse_list(raw, "SCAN_FORBIDDEN_RISKS", RiskLevel::parse)?;
        }

        if let Some(raw) = allowed_recommendations {
            let allowed = parse_list(raw, "SCAN_ALLOWED_RECOMMENDATIONS", Recommendation::parse)?;
            if !allowed.is_empty() {
                filter.allowed_recommendations = allowed;
            }
        }

        Ok(filter)
    }

    pub fn is_permissive(&self) -> bool {
        self.min_score <= 0.0
            && self.forbidden_risks.is_empty()
            && Recommendation::ALL
                .iter()
                .all(|r| self.allowed_recommendations.contains(r))
    }

    /// Every check the analysis fails, in score/risk/recommendation order. Empty means it
    /// passes.
    pub fn check(&self, analysis: &AnalysisResult) -> Vec<Rejection> {
        let mut rejected = Vec::new();
        if analysis.score < self.min_score {
            rejected.push(Rejection::Score);
        }
        if self.forbidden_risks.contains(&analysis.risk_level) {
            rejected.push(Rejection::Risk);
        }
        if !self
            .allowed_recommendations
            .contains(&analysis.recommendation)
        {
            rejected.push(Rejection::Recommendation);
        }
        rejected
    }
}

fn parse_list<T: PartialEq>(
    raw: &str,
    variable: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> anyhow::Result<Vec<T>> {
    let mut out = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let value = parse(item).with_context(|| format!("{variable}: unknown value {item:?}"))?;
        if !out.contains(&value) {
            out.push(value);
        }
    }
    Ok(out)
}
