use crate::domain::ticker::TickerSymbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time market snapshot. Built fresh on every fetch and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub ticker: TickerSymbol,
    pub price: f64,
    pub change_percent: f64,
    pub volume: f64,
    pub relative_volume: Option<f64>,
    pub average_volume_10d: Option<f64>,
    pub news_headlines: Vec<String>,
    pub sector: Option<String>,
    pub captured_at: DateTime<Utc>,
}
