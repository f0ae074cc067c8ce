//! Thin client for Supabase edge functions (`POST {SUPABASE_URL}/functions/v1/{name}`).

use crate::config::{env_or, Settings};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct EdgeFunctionClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl EdgeFunctionClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_supabase_url()?.to_string();
        let service_key = settings.require_supabase_service_role_key()?.to_string();
        let timeout_secs = env_or("EDGE_FUNCTION_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build edge function http client")?;

        Ok(Self {
            http,
            base_url,
            service_key,
        })
    }

    fn url(&self, function: &str) -> String {
        format!(
            "{}/functions/v1/{}",
            self.base_url.trim_end_matches('/'),
            function.trim_start_matches('/')
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))?,
        );
        headers.insert("apikey", HeaderValue::from_str(&self.service_key)?);
        Ok(headers)
    }

    /// Invokes `function` once. Non-2xx statuses and non-JSON bodies are errors; no retries.
    pub async fn invoke<B: Serialize + ?Sized>(&self, function: &str, body: &B) -> Result<Value> {
        let res = self
            .http
            .post(self.url(function))
            .headers(self.headers()?)
            .json(body)
            .send()
            .await
            .with_context(|| format!("edge function {function} request failed"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read edge function {function} response"))?;

        if !status.is_success() {
            anyhow::bail!("edge function {function} HTTP {status}: {text}");
        }

        anyhow::ensure!(
            !text.trim().is_empty() && text.trim() != "null",
            "edge function {function} returned an empty body"
        );

        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("edge function {function} returned invalid JSON: {text}"))
    }
}
