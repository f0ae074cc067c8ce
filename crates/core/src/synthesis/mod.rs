use crate::config::Settings;
use crate::domain::analysis::AnalysisResult;
use crate::domain::quote::QuoteSnapshot;
use crate::error::SynthesisError;
use std::sync::Arc;

pub mod edge;
pub mod json;
pub mod openai;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    EdgeFunction,
    OpenAi,
}

impl Backend {
    pub fn parse(raw: Option<&str>) -> anyhow::Result<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("edge") => Ok(Self::EdgeFunction),
            Some("openai") => Ok(Self::OpenAi),
            Some(other) => anyhow::bail!("unknown ANALYSIS_BACKEND: {other:?} (expected edge|openai)"),
        }
    }
}

/// Reasoning capability. One upstream call per invocation; no internal retries.
#[async_trait::async_trait]
pub trait AnalysisSource: Send + Sync {
    fn backend(&self) -> Backend;

    async fn synthesize(&self, quote: &QuoteSnapshot) -> Result<AnalysisResult, SynthesisError>;
}

pub fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn AnalysisSource>> {
    Ok(match Backend::parse(settings.analysis_backend.as_deref())? {
        Backend::EdgeFunction => Arc::new(edge::AnalyzeStockClient::from_settings(settings)?),
        Backend::OpenAi => Arc::new(openai::OpenAiAnalysisClient::from_settings(settings)?),
    })
}
