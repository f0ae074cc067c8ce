use crate::config::{env_or, Settings};
use crate::domain::analysis::AnalysisResult;
use crate::domain::contract::AnalyzeRequest;
use crate::domain::quote::QuoteSnapshot;
use crate::error::{detail, SynthesisError};
use crate::synthesis::json;
use crate::synthesis::{AnalysisSource, Backend};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Calls chat completions directly in JSON mode, using the same contract as the edge function.
#[derive(Debug, Clone)]
pub struct OpenAiAnalysisClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiAnalysisClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_openai_api_key()?.to_string();
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("OPENAI_ANALYSIS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = env_or("OPENAI_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
        })
    }

    fn system_prompt() -> String {
        [
            "You are a professional small-cap stock analyst.",
            "Analyze the provided market snapshot and return ONLY a JSON object with these keys:",
            "- dnaScore (number 0-100, be critical)",
            "- riskLevel (\"Low\" | \"Medium\" | \"High\")",
            "- recommendation (\"Strong Buy\" | \"Buy\" | \"Hold\" | \"Sell\")",
            "- aiSummary (string, 1-2 sentences)",
            "- bullCase (array of 3 short strings)",
            "- bearCase (array of 3 short strings)",
            "- popProbability (number 0-1, chance of a sharp upside move)",
            "No markdown, no prose, no extra keys.",
        ]
        .join("\n")
    }

    fn user_prompt(req: &AnalyzeRequest) -> anyhow::Result<String> {
        let snapshot = serde_json::to_string_pretty(req).context("failed to encode snapshot")?;
        Ok(format!("Analyze this stock snapshot:\n{snapshot}"))
    }

    async fn create_completion(
        &self,
        req: &ChatCompletionRequest,
    ) -> anyhow::Result<ChatCompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .context("OpenAI chat request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read OpenAI response body")?;
        if !status.is_success() {
            anyhow::bail!("OpenAI chat HTTP {status}: {text}");
        }

        serde_json::from_str::<ChatCompletionResponse>(&text)
            .with_context(|| format!("failed to decode OpenAI chat response: {text}"))
    }

    async fn synthesize_once(&self, quote: &QuoteSnapshot) -> anyhow::Result<AnalysisResult> {
        let analyze = AnalyzeRequest::from_snapshot(quote);
        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: Self::system_prompt(),
                },
                Message {
                    role: "user",
                    content: Self::user_prompt(&analyze)?,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let res = self.create_completion(&req).await?;
        let text = response_text(&res)?;
        json::parse_analysis(&text, &quote.ticker)
    }
}

fn response_text(res: &ChatCompletionResponse) -> anyhow::Result<String> {
    let choice = res
        .choices
        .first()
        .context("OpenAI response contained no choices")?;
    anyhow::ensure!(
        choice.finish_reason.as_deref() != Some("length"),
        "OpenAI output truncated (finish_reason=length)"
    );
    let content = choice
        .message
        .content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .context("OpenAI response message was empty")?;
    Ok(content.to_string())
}

#[async_trait::async_trait]
impl AnalysisSource for OpenAiAnalysisClient {
    fn backend(&self) -> Backend {
        Backend::OpenAi
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

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
