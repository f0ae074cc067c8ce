use crate::config::env_or;
use crate::domain::ticker::TickerSymbol;
use crate::movers::MoverSource;
use crate::pricing::yahoo::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, USER_AGENT};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const SCREENER_ID: &str = "most_actives";
/// Yahoo caps predefined screens at 250 rows.
pub const MAX_SCREEN_COUNT: usize = 250;

/// Yahoo's predefined "most actives" screen, US region.
#[derive(Debug, Clone)]
pub struct YahooScreenerClient {
    http: reqwest::Client,
    base_url: String,
}

impl YahooScreenerClient {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("YAHOO_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = env_or("YAHOO_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build yahoo screener http client")?;

        Ok(Self { http, base_url })
    }

    fn url(&self, count: usize) -> String {
        format!(
            "{}/v1/finance/screener/predefined/saved?scrIds={SCREENER_ID}&count={}&region=US&lang=en-US",
            self.base_url.trim_end_matches('/'),
            count.clamp(1, MAX_SCREEN_COUNT)
        )
    }
}

#[derive(Debug, Deserialize)]
struct ScreenerResponse {
    finance: ScreenerFinance,
}

#[derive(Debug, Deserialize)]
struct ScreenerFinance {
    #[serde(default)]
    result: Option<Vec<ScreenerResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ScreenerResult {
    #[serde(default)]
    quotes: Vec<ScreenerQuote>,
}

#[derive(Debug, Deserialize)]
struct ScreenerQuote {
    #[serde(default)]
    symbol: Option<String>,
}

fn extract_symbols(res: ScreenerResponse) -> Result<Vec<TickerSymbol>> {
    if let Some(err) = res.finance.error.filter(|e| !e.is_null()) {
        anyhow::bail!("yahoo screener error: {err}");
    }

    let quotes = res
        .finance
        .result
        .and_then(|r| r.into_iter().next())
        .map(|r| r.quotes)
        .unwrap_or_default();

    Ok(quotes
        .into_iter()
        .filter_map(|q| q.symbol)
        .filter_map(|s| match TickerSymbol::parse(&s) {
            Ok(t) => Some(t),
            Err(err) => {
                tracing::debug!(symbol = %s, error = %err, "skipping unusable screener symbol");
                None
            }
        })
        .collect())
}

#[async_trait::async_trait]
impl MoverSource for YahooScreenerClient {
    fn source_name(&self) -> &'static str {
        "yahoo_most_actives"
    }

    async fn most_active(&self, count: usize) -> Result<Vec<TickerSymbol>> {
        let res = self
            .http
            .get(self.url(count))
            .send()
            .await
            .context("yahoo screener request failed")?;

        let status = res.status();
        anyhow::ensure!(status.is_success(), "yahoo screener HTTP {status}");

        let parsed = res
            .json::<ScreenerResponse>()
            .await
            .context("failed to parse yahoo screener response")?;
        extract_symbols(parsed)
    }
}
