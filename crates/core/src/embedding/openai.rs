use crate::config::{env_or, Settings};
use crate::embedding::EmbeddingProvider;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_openai_api_key()?.to_string();
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("EMBEDDING_MODEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout_secs = env_or("OPENAI_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build embedding http client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
        })
    }
}

fn first_embedding(res: EmbeddingResponse) -> Result<Vec<f32>> {
    let vector = res
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .context("embedding response contained no data")?;
    anyhow::ensure!(!vector.is_empty(), "embedding vector is empty");
    anyhow::ensure!(
        vector.iter().all(|v| v.is_finite()),
        "embedding vector contains non-finite values"
    );
    Ok(vector)
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .context("OpenAI embeddings request failed")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embeddings HTTP {status}: {body}");
        }

        let parsed = res
            .json::<EmbeddingResponse>()
            .await
            .context("failed to parse OpenAI embeddings response")?;
        first_embedding(parsed)
    }
}
