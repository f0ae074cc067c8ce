use crate::config::Settings;
use crate::domain::contract::QuoteResponse;
use crate::domain::quote::QuoteSnapshot;
use crate::domain::ticker::TickerSymbol;
use crate::edge::EdgeFunctionClient;
use crate::error::{detail, SensingError};
use crate::pricing::PriceSource;
use crate::sensing::QuoteSource;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

const DEFAULT_FUNCTION: &str = "smart-quote";

/// Quote source backed by the `smart-quote` edge function.
#[derive(Debug, Clone)]
pub struct SmartQuoteClient {
    edge: EdgeFunctionClient,
    function: String,
}

impl SmartQuoteClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let edge = EdgeFunctionClient::from_settings(settings)?;
        let function = std::env::var("QUOTE_FUNCTION_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FUNCTION.to_string());
        Ok(Self { edge, function })
    }

    async fn invoke(&self, ticker: &TickerSymbol) -> anyhow::Result<Value> {
        self.edge
            .invoke(&self.function, &json!({ "ticker": ticker.as_str() }))
            .await
    }

    async fn fetch_once(&self, ticker: &TickerSymbol) -> anyhow::Result<QuoteSnapshot> {
        let raw = self.invoke(ticker).await?;
        parse_quote(raw, ticker, Utc::now())
    }
}

fn parse_quote(
    raw: Value,
    ticker: &TickerSymbol,
    captured_at: DateTime<Utc>,
) -> anyhow::Result<QuoteSnapshot> {
    let parsed = serde_json::from_value::<QuoteResponse>(raw.clone())
        .with_context(|| format!("quote response has unexpected shape: {raw}"))?;
    parsed.validate_and_into_snapshot(ticker, captured_at)
}

// Only the price matters here; a zero or non-finite price means "no price", not a failure.
fn parse_price(raw: Value) -> anyhow::Result<Option<f64>> {
    let parsed = serde_json::from_value::<QuoteResponse>(raw.clone())
        .with_context(|| format!("quote response has unexpected shape: {raw}"))?;
    Ok(Some(parsed.price).filter(|p| p.is_finite() && *p > 0.0))
}

#[async_trait::async_trait]
impl QuoteSource for SmartQuoteClient {
    fn source_name(&self) -> &'static str {
        "supabase_smart_quote"
    }

    async fn fetch_quote(&self, ticker: &TickerSymbol) -> Result<QuoteSnapshot, SensingError> {
        self.fetch_once(ticker).await.map_err(|err| SensingError {
            ticker: ticker.to_string(),
            detail: detail(&err),
        })
    }
}

#[async_trait::async_trait]
impl PriceSource for SmartQuoteClient {
    fn source_name(&self) -> &'static str {
        "supabase_smart_quote"
    }

    async fn current_price(&self, ticker: &TickerSymbol) -> anyhow::Result<Option<f64>> {
        parse_price(self.invoke(ticker).await?)
    }
}
