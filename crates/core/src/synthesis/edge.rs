use crate::config::Settings;
use crate::domain::analysis::AnalysisResult;
use crate::domain::contract::{AnalyzeRequest, AnalyzeResponse};
use crate::domain::quote::QuoteSnapshot;
use crate::edge::EdgeFunctionClient;
use crate::error::{detail, SynthesisError};
use crate::synthesis::{AnalysisSource, Backend};
use anyhow::Context;

const DEFAULT_FUNCTION: &str = "analyze-stock";

/// Analysis source backed by the `analyze-stock` edge function.
#[derive(Debug, Clone)]
pub struct AnalyzeStockClient {
    edge: EdgeFunctionClient,
    function: String,
}

impl AnalyzeStockClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let edge = EdgeFunctionClient::from_settings(settings)?;
        let function = std::env::var("ANALYSIS_FUNCTION_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FUNCTION.to_string());
        Ok(Self { edge, function })
    }

    async fn synthesize_once(&self, quote: &QuoteSnapshot) -> anyhow::Result<AnalysisResult> {
        let req = AnalyzeRequest::from_snapshot(quote);
        let raw = self.edge.invoke(&self.function, &req).await?;
        let parsed = serde_json::from_value::<AnalyzeResponse>(raw.clone())
            .with_context(|| format!("analysis response has unexpected shape: {raw}"))?;
        parsed.validate_and_into_analysis(&quote.ticker)
    }
}

#[async_trait::async_trait]
impl AnalysisSource for AnalyzeStockClient {
    fn backend(&self) -> Backend {
        Backend::EdgeFunction
    }

    async fn synthesize(&self, quote: &QuoteSnapshot) -> Result<AnalysisResult, SynthesisError> {
        self.synthesize_once(quote)
            .await
            .map_err(|err| SynthesisError {
                ticker: quote.ticker.to_string(),
                detail: detail(&err),
            })
    }
}
