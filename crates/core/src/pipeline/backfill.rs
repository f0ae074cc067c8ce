//! Fills in missing legend embeddings, one rate-limited call per legend.

use crate::config::env_or;
use crate::domain::records::LegendRecord;
use crate::embedding::EmbeddingProvider;
use crate::error::{detail, EmbeddingError};
use crate::pipeline::sleep::Sleeper;
use crate::storage::LegendStore;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CALL_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingTextVariant {
    /// Name, ticker, period and description.
    Basic,
    /// Basic plus the serialized metrics.
    #[default]
    Rich,
}

impl EmbeddingTextVariant {
    pub fn parse(raw: Option<&str>) -> anyhow::Result<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("rich") => Ok(Self::Rich),
            Some("basic") => Ok(Self::Basic),
            Some(other) => anyhow::bail!("unknown EMBEDDING_TEXT_VARIANT: {other:?}"),
        }
    }
}

/// Deterministic text a legend is embedded from. Metrics keys serialize in sorted order.
pub fn embedding_text(legend: &LegendRecord, variant: EmbeddingTextVariant) -> String {
    match variant {
        EmbeddingTextVariant::Basic => format!(
            "Stock: {} ({})\nPeriod: {}\nDescription: {}",
            legend.name, legend.ticker, legend.period, legend.description
        ),
        EmbeddingTextVariant::Rich => {
            let metrics = if legend.metrics.is_null() {
                "{}".to_string()
            } else {
                legend.metrics.to_string()
            };
            format!(
                "Stock: {} - {} ({})\nPattern Description: {}\nKey Metrics: {}",
                legend.ticker, legend.name, legend.period, legend.description, metrics
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    pub call_delay: Duration,
    pub variant: EmbeddingTextVariant,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            call_delay: DEFAULT_CALL_DELAY,
            variant: EmbeddingTextVariant::default(),
        }
    }
}

impl BackfillOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let delay_ms = env_or("EMBEDDING_DELAY_MS", DEFAULT_CALL_DELAY.as_millis() as u64);
        let variant =
            EmbeddingTextVariant::parse(std::env::var("EMBEDDING_TEXT_VARIANT").ok().as_deref())?;
        Ok(Self {
            call_delay: Duration::from_millis(delay_ms),
            variant,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    pub selected: usize,
    pub embedded: usize,
    pub failures: Vec<EmbeddingError>,
}

pub struct EmbeddingBackfill {
    store: Arc<dyn LegendStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    sleeper: Arc<dyn Sleeper>,
    options: BackfillOptions,
}

impl EmbeddingBackfill {
    pub fn new(
        store: Arc<dyn LegendStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        sleeper: Arc<dyn Sleeper>,
        options: BackfillOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            sleeper,
            options,
        }
    }

    /// Fails only if the initial selection fails. Per-legend failures are collected and the
    /// legend stays eligible for the next run.
    pub async fn run(&self) -> anyhow::Result<BackfillSummary> {
        let legends = self.store.legends_missing_embedding().await?;
        let mut summary = BackfillSummary {
            selected: legends.len(),
            ..Default::default()
        };

        if legends.is_empty() {
            tracing::info!("every legend already has an embedding");
            return Ok(summary);
        }

        tracing::info!(
            count = legends.len(),
            model = self.embedder.model(),
            "embedding legends"
        );

        for (idx, legend) in legends.iter().enumerate() {
            if idx != 0 {
                self.sleeper.sleep(self.options.call_delay).await;
            }

            match self.embed_one(legend).await {
                Ok(dims) => {
                    summary.embedded += 1;
                    tracing::info!(legend_id = %legend.id, ticker = %legend.ticker, dims, "legend embedded");
                }
                Err(err) => {
                    tracing::warn!(
                        legend_id = %legend.id,
                        ticker = %legend.ticker,
                        error = %err.detail,
                        "legend embedding failed; leaving it for the next run"
                    );
                    summary.failures.push(err);
                }
            }
        }

        Ok(summary)
    }

    async fn embed_one(&self, legend: &LegendRecord) -> Result<usize, EmbeddingError> {
        let to_error = |err: anyhow::Error| EmbeddingError {
            legend_id: legend.id,
            ticker: legend.ticker.clone(),
            detail: detail(&err),
        };

        let text = embedding_text(legend, self.options.variant);
        let vector = self.embedder.embed(&text).await.map_err(to_error)?;
        self.store
            .set_legend_embedding(legend.id, &vector)
            .await
            .map_err(to_error)?;
        Ok(vector.len())
    }
}
