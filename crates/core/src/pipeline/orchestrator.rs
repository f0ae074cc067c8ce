//! Sensing -> Synthesis -> Filter -> Triple-Sync for one ticker, with bounded retry around the
//! two upstream calls.

use crate::config::env_or;
use crate::domain::analysis::{AnalysisResult, ScoredSnapshot};
use crate::domain::ticker::TickerSymbol;
use crate::error::{SensingError, SynthesisError};
use crate::pipeline::filter::{Rejection, ScanFilter};
use crate::pipeline::sleep::Sleeper;
use crate::pipeline::writer::{PersistReport, TripleSyncWriter};
use crate::sensing::QuoteSource;
use crate::synthesis::AnalysisSource;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = env_or("PIPELINE_MAX_ATTEMPTS", defaults.max_attempts);
        let backoff_ms = env_or(
            "PIPELINE_BACKOFF_BASE_MS",
            defaults.backoff_base.as_millis() as u64,
        );
        Self::new(max_attempts, Duration::from_millis(backoff_ms))
    }

    /// Linear backoff: the wait after failed attempt `k` is `base * k`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sensing,
    Synthesizing,
    Persisting,
    Done,
    /// Scored but rejected by the scan filter; nothing was written.
    Filtered,
    Failed,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Sensing(#[from] SensingError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

impl AttemptError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Sensing(_) => Stage::Sensing,
            Self::Synthesis(_) => Stage::Synthesizing,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed {
        scored: ScoredSnapshot,
        persistence: PersistReport,
    },
    Filtered {
        scored: ScoredSnapshot,
        rejected: Vec<Rejection>,
    },
    /// Every attempt failed; carries the last failure.
    Exhausted { last_error: AttemptError },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub ticker: TickerSymbol,
    pub attempts: u32,
    /// Every state entered, in order.
    pub stages: Vec<Stage>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self.outcome, RunOutcome::Filtered { .. })
    }

    /// Present for saved and filtered runs alike.
    pub fn analysis(&self) -> Option<&AnalysisResult> {
        match &self.outcome {
            RunOutcome::Completed { scored, .. } | RunOutcome::Filtered { scored, .. } => {
                Some(&scored.analysis)
            }
            RunOutcome::Exhausted { .. } => None,
        }
    }

    /// The snapshot handed to Triple-Sync, if the run got that far.
    pub fn scored(&self) -> Option<&ScoredSnapshot> {
        match &self.outcome {
            RunOutcome::Completed { scored, .. } => Some(scored),
            RunOutcome::Filtered { .. } | RunOutcome::Exhausted { .. } => None,
        }
    }
}

pub struct Orchestrator {
    quotes: Arc<dyn QuoteSource>,
    analysis: Arc<dyn AnalysisSource>,
    writer: TripleSyncWriter,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    filter: ScanFilter,
}

impl Orchestrator {
    pub fn new(
        quotes: Arc<dyn QuoteSource>,
        analysis: Arc<dyn AnalysisSource>,
        writer: TripleSyncWriter,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            quotes,
            analysis,
            writer,
            sleeper,
            policy,
            filter: ScanFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: ScanFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs the pipeline for one ticker. Upstream failures are retried and, once the attempt
    /// budget is spent, reported as [`RunOutcome::Exhausted`]; this never returns an error.
    pub async fn run(&self, ticker: &TickerSymbol) -> RunReport {
        let mut stages = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.attempt(ticker, attempt, &mut stages).await {
                Ok(scored) => {
                    let rejected = self.filter.check(&scored.analysis);
                    if !rejected.is_empty() {
                        stages.push(Stage::Filtered);
                        tracing::info!(
                            %ticker,
                            attempt,
                            score = scored.analysis.score,
                            rejected = ?rejected,
                            "analysis filtered; not persisting"
                        );
                        return RunReport {
                            ticker: ticker.clone(),
                            attempts: attempt,
                            stages,
                            outcome: RunOutcome::Filtered { scored, rejected },
                        };
                    }

                    stages.push(Stage::Persisting);
                    tracing::info!(%ticker, attempt, score = scored.analysis.score, "persisting analysis");
                    let persistence = self.writer.persist(&scored, Utc::now()).await;
                    stages.push(Stage::Done);

                    let failed = persistence.failures().count();
                    tracing::info!(%ticker, attempt, failed_destinations = failed, "run completed");

                    return RunReport {
                        ticker: ticker.clone(),
                        attempts: attempt,
                        stages,
                        outcome: RunOutcome::Completed {
                            scored,
                            persistence,
                        },
                    };
                }
                Err(err) => {
                    if attempt >= self.policy.max_attempts {
                        stages.push(Stage::Failed);
                        tracing::error!(
                            %ticker,
                            attempts = attempt,
                            stage = ?err.stage(),
                            error = %err,
                            "retries exhausted; giving up on ticker"
                        );
                        return RunReport {
                            ticker: ticker.clone(),
                            attempts: attempt,
                            stages,
                            outcome: RunOutcome::Exhausted { last_error: err },
                        };
                    }

                    let backoff = self.policy.backoff_for(attempt);
                    tracing::warn!(
                        %ticker,
                        attempt,
                        stage = ?err.stage(),
                        ?backoff,
                        error = %err,
                        "attempt failed; retrying from sensing"
                    );
                    self.sleeper.sleep(backoff).await;
                }
            }
        }
    }

    // A retry always re-senses: a stale quote is never paired with a fresh analysis.
    async fn attempt(
        &self,
        ticker: &TickerSymbol,
        attempt: u32,
        stages: &mut Vec<Stage>,
    ) -> Result<ScoredSnapshot, AttemptError> {
        stages.push(Stage::Sensing);
        tracing::info!(%ticker, attempt, "sensing");
        let quote = self.quotes.fetch_quote(ticker).await?;
        tracing::info!(
            %ticker,
            price = quote.price,
            change_percent = quote.change_percent,
            relative_volume = ?quote.relative_volume,
            "quote received"
        );

        stages.push(Stage::Synthesizing);
        tracing::info!(%ticker, attempt, "synthesizing");
        let analysis = self.analysis.synthesize(&quote).await?;
        tracing::info!(
            %ticker,
            score = analysis.score,
            risk = %analysis.risk_level,
            recommendation = %analysis.recommendation,
            "analysis received"
        );

        Ok(ScoredSnapshot { quote, analysis })
    }
}
