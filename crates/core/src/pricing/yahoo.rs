use crate::config::env_or;
use crate::domain::ticker::TickerSymbol;
use crate::pricing::PriceSource;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

pub(crate) const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Latest price from the Yahoo v8 chart API (no auth).
#[derive(Debug, Clone)]
pub struct YahooChartClient {
    http: reqwest::Client,
    base_url: String,
}

impl YahooChartClient {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("YAHOO_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = env_or("YAHOO_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build yahoo http client")?;

        Ok(Self { http, base_url })
    }

    fn url(&self, ticker: &TickerSymbol) -> String {
        format!(
            "{}/v8/finance/chart/{}?range=1d&interval=1d",
            self.base_url.trim_end_matches('/'),
            ticker
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    result: Option<Vec<ChartData>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
}

fn extract_price(res: ChartResponse) -> Result<Option<f64>> {
    if let Some(err) = res.chart.error.filter(|e| !e.is_null()) {
        anyhow::bail!("yahoo chart error: {err}");
    }

    let price = res
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .and_then(|d| d.meta.regular_market_price)
        .filter(|p| p.is_finite() && *p > 0.0);
    Ok(price)
}

#[async_trait::async_trait]
impl PriceSource for YahooChartClient {
    fn source_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn current_price(&self, ticker: &TickerSymbol) -> Result<Option<f64>> {
        let res = self
            .http
            .get(self.url(ticker))
            .send()
            .await
            .with_context(|| format!("yahoo chart request failed for {ticker}"))?;

        let status = res.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        anyhow::ensure!(status.is_success(), "yahoo chart HTTP {status} for {ticker}");

        let parsed = res
            .json::<ChartResponse>()
            .await
            .with_context(|| format!("failed to parse yahoo chart response for {ticker}"))?;
        extract_price(parsed)
    }
}
