use muzestock_core::domain::ticker::TickerSymbol;
use muzestock_core::pipeline::orchestrator::{RunOutcome, RunReport};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Succeeded,
    Filtered,
    Failed,
    Skipped,
}

/// One line of the end-of-run table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub ticker: String,
    pub status: Status,
    pub score: Option<f64>,
    pub risk: String,
    pub recommendation: String,
    pub matched: String,
    pub note: String,
}

impl Row {
    pub fn skipped(ticker: &TickerSymbol, note: impl Into<String>) -> Self {
        Self {
            ticker: ticker.to_string(),
            status: Status::Skipped,
            score: None,
            risk: "-".to_string(),
            recommendation: "-".to_string(),
            matched: "-".to_string(),
            note: note.into(),
        }
    }

    pub fn lock_held(ticker: &TickerSymbol) -> Self {
        Self::skipped(ticker, "locked by another run")
    }

    pub fn lock_failed(ticker: &TickerSymbol, err: &anyhow::Error) -> Self {
        Self::skipped(ticker, format!("lock error: {err:#}"))
    }

    pub fn from_report(report: &RunReport) -> Self {
        match &report.outcome {
            RunOutcome::Completed {
                scored,
                persistence,
            } => {
                let analysis = &scored.analysis;
                let failed: Vec<String> = persistence
                    .failures()
                    .map(|f| f.destination.to_string())
                    .collect();
                Self {
                    ticker: report.ticker.to_string(),
                    status: Status::Succeeded,
                    score: Some(analysis.score),
                    risk: analysis.risk_level.to_string(),
                    recommendation: analysis.recommendation.to_string(),
                    matched: analysis
                        .matched_reference
                        .as_ref()
                        .map(|m| m.ticker.clone())
                        .unwrap_or_else(|| "-".to_string()),
                    note: if failed.is_empty() {
                        String::new()
                    } else {
                        format!("not synced: {}", failed.join(", "))
                    },
                }
            }
            RunOutcome::Filtered { scored, rejected } => {
                let analysis = &scored.analysis;
                let reasons: Vec<&str> = rejected.iter().map(|r| r.as_str()).collect();
                Self {
                    ticker: report.ticker.to_string(),
                    status: Status::Filtered,
                    score: Some(analysis.score),
                    risk: analysis.risk_level.to_string(),
                    recommendation: analysis.recommendation.to_string(),
                    matched: analysis
                        .matched_reference
                        .as_ref()
                        .map(|m| m.ticker.clone())
                        .unwrap_or_else(|| "-".to_string()),
                    note: format!("filtered: {}", reasons.join(", ")),
                }
            }
            RunOutcome::Exhausted { last_error } => Self {
                ticker: report.ticker.to_string(),
                status: Status::Failed,
                score: None,
                risk: "-".to_string(),
                recommendation: "-".to_string(),
                matched: "-".to_string(),
                note: format!("after {} attempts: {last_error}", report.attempts),
            },
        }
    }

    pub fn status_line(&self) -> String {
        match (self.status, self.score) {
            (Status::Succeeded, Some(score)) => format!(
                "score {score:.0} | {} | {}",
                self.risk, self.recommendation
            ),
            (Status::Filtered, Some(score)) => format!("score {score:.0} | {}", self.note),
            (Status::Skipped, _) => format!("skipped: {}", self.note),
            _ => format!("failed {}", self.note),
        }
    }
}

pub fn count(rows: &[Row], status: Status) -> usize {
    rows.iter().filter(|r| r.status == status).count()
}

pub fn render(rows: &[Row]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{:<8} {:>5}  {:<7} {:<11} {:<8} {}",
        "TICKER", "SCORE", "RISK", "REC", "MATCH", "NOTE"
    );
    for row in rows {
        let score = row
            .score
            .map(|s| format!("{s:.0}"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<8} {:>5}  {:<7} {:<11} {:<8} {}",
            row.ticker, score, row.risk, row.recommendation, row.matched, row.note
        );
    }
    let _ = writeln!(
        out,
        "\nsaved={} filtered={} failed={} skipped={}",
        count(rows, Status::Succeeded),
        count(rows, Status::Filtered),
        count(rows, Status::Failed),
        count(rows, Status::Skipped)
    );
    out
}
