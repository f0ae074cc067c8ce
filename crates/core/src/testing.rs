//! In-memory fakes shared by the pipeline tests.

use crate::domain::analysis::{
    AnalysisResult, Direction, Recommendation, RiskLevel, ScoredSnapshot,
};
use crate::domain::quote::QuoteSnapshot;
use crate::domain::records::{
    AnalysisCacheRecord, Destination, DiscoveryRecord, LegendRecord, PendingPrediction,
    PersonaPerformance, PortfolioPosition, PositionStatus, PredictionGrade, PredictionRecord,
    Revaluation, PIPELINE_PERSONA,
};
use crate::domain::ticker::TickerSymbol;
use crate::embedding::EmbeddingProvider;
use crate::error::{SensingError, SynthesisError};
use crate::movers::MoverSource;
use crate::pipeline::sleep::Sleeper;
use crate::pricing::PriceSource;
use crate::sensing::QuoteSource;
use crate::storage::{AnalysisStore, LegendStore, PortfolioStore, PredictionStore};
use crate::synthesis::{AnalysisSource, Backend};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 14, 30, 0).unwrap()
}

fn ticker(s: &str) -> TickerSymbol {
    TickerSymbol::parse(s).unwrap()
}

fn quote(symbol: &TickerSymbol, price: f64) -> QuoteSnapshot {
    QuoteSnapshot {
        ticker: symbol.clone(),
        price,
        change_percent: 4.2,
        volume: 12_500_000.0,
        relative_volume: Some(2.3),
        average_volume_10d: Some(5_400_000.0),
        news_headlines: vec!["Company announces partnership".to_string()],
        sector: Some("Healthcare".to_string()),
        captured_at: fixed_time(),
    }
}

fn analysis(symbol: &TickerSymbol, score: f64) -> AnalysisResult {
    AnalysisResult {
        ticker: symbol.clone(),
        score,
        risk_level: RiskLevel::High,
        recommendation: Recommendation::Buy,
        summary: format!("{symbol} shows unusual volume"),
        matched_reference: None,
        bull_case: vec!["volume surge".to_string()],
        bear_case: vec!["dilution risk".to_string()],
        pop_probability: 0.4,
    }
}

pub fn scored(symbol: &str, price: f64, score: f64) -> ScoredSnapshot {
    let symbol = ticker(symbol);
    ScoredSnapshot {
        quote: quote(&symbol, price),
        analysis: analysis(&symbol, score),
    }
}

pub fn legend(symbol: &str, embedding: Option<Vec<f32>>) -> LegendRecord {
    LegendRecord {
        id: Uuid::new_v4(),
        ticker: symbol.to_string(),
        name: format!("{symbol} legend"),
        period: "2020-2021".to_string(),
        description: "multi-bagger breakout".to_string(),
        metrics: serde_json::json!({"max_gain": 12.0}),
        embedding,
    }
}

pub fn position(symbol: &str, entry_price: f64) -> PortfolioPosition {
    PortfolioPosition {
        id: Uuid::new_v4(),
        ticker: ticker(symbol),
        status: PositionStatus::Open,
        entry_price,
        current_price: None,
        pnl_percent: None,
        updated_at: fixed_time(),
    }
}

pub fn pending(
    symbol: &str,
    direction: Direction,
    start_price: Option<f64>,
    analysis_date: DateTime<Utc>,
) -> PendingPrediction {
    PendingPrediction {
        id: Uuid::new_v4(),
        ticker: ticker(symbol),
        dna_score: match direction {
            Direction::Bullish => 70.0,
            Direction::Bearish => 30.0,
        },
        predicted_direction: direction,
        start_price,
        persona_used: Some(PIPELINE_PERSONA.to_string()),
        analysis_date,
    }
}

/// Contents of the three Triple-Sync tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub discovery: BTreeMap<String, DiscoveryRecord>,
    pub analysis_cache: BTreeMap<String, AnalysisCacheRecord>,
    pub predictions: BTreeMap<(String, NaiveDate), PredictionRecord>,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    attempts: HashMap<Destination, usize>,
    legends: Vec<LegendRecord>,
    positions: Vec<PortfolioPosition>,
    pending: Vec<PendingPrediction>,
    grades: HashMap<Uuid, PredictionGrade>,
    personas: BTreeMap<String, PersonaPerformance>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing: HashSet<Destination>,
    failing_legends: Mutex<HashSet<Uuid>>,
    failing_positions: Mutex<HashSet<Uuid>>,
    failing_entry: bool,
}

impl MemoryStore {
    pub fn failing(mut self, destination: Destination) -> Self {
        self.failing.insert(destination);
        self
    }

    pub fn failing_portfolio_entry(mut self) -> Self {
        self.failing_entry = true;
        self
    }

    pub fn fail_legend_update(&self, id: Uuid) {
        self.failing_legends.lock().unwrap().insert(id);
    }

    pub fn fail_position_update(&self, id: Uuid) {
        self.failing_positions.lock().unwrap().insert(id);
    }

    /// Includes attempts that failed.
    pub fn write_attempts(&self, destination: Destination) -> usize {
        let state = self.state.lock().unwrap();
        state.attempts.get(&destination).copied().unwrap_or(0)
    }

    pub fn discovery(&self, symbol: &str) -> Option<DiscoveryRecord> {
        self.state.lock().unwrap().tables.discovery.get(symbol).cloned()
    }

    pub fn analysis_cache(&self, symbol: &str) -> Option<AnalysisCacheRecord> {
        self.state
            .lock()
            .unwrap()
            .tables
            .analysis_cache
            .get(symbol)
            .cloned()
    }

    pub fn predictions_for(&self, symbol: &str) -> Vec<PredictionRecord> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .predictions
            .iter()
            .filter(|((t, _), _)| t == symbol)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Tables {
        self.state.lock().unwrap().tables.clone()
    }

    pub fn insert_legend(&self, legend: LegendRecord) -> Uuid {
        let id = legend.id;
        self.state.lock().unwrap().legends.push(legend);
        id
    }

    pub fn legend(&self, id: Uuid) -> LegendRecord {
        let state = self.state.lock().unwrap();
        state.legends.iter().find(|l| l.id == id).cloned().unwrap()
    }

    pub fn insert_position(&self, position: PortfolioPosition) -> Uuid {
        let id = position.id;
        self.state.lock().unwrap().positions.push(position);
        id
    }

    pub fn position(&self, id: Uuid) -> PortfolioPosition {
        let state = self.state.lock().unwrap();
        state.positions.iter().find(|p| p.id == id).cloned().unwrap()
    }

    pub fn positions(&self) -> Vec<PortfolioPosition> {
        self.state.lock().unwrap().positions.clone()
    }

    pub fn insert_pending(&self, prediction: PendingPrediction) -> Uuid {
        let id = prediction.id;
        self.state.lock().unwrap().pending.push(prediction);
        id
    }

    pub fn grade(&self, id: Uuid) -> Option<PredictionGrade> {
        self.state.lock().unwrap().grades.get(&id).cloned()
    }

    pub fn persona(&self, name: &str) -> Option<PersonaPerformance> {
        self.state.lock().unwrap().personas.get(name).cloned()
    }

    fn begin_write(&self, destination: Destination) -> anyhow::Result<()> {
        *self
            .state
            .lock()
            .unwrap()
            .attempts
            .entry(destination)
            .or_default() += 1;
        anyhow::ensure!(
            !self.failing.contains(&destination),
            "connection reset writing {destination}"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnalysisStore for MemoryStore {
    async fn upsert_discovery(&self, record: &DiscoveryRecord) -> anyhow::Result<()> {
        self.begin_write(Destination::Discovery)?;
        self.state
            .lock()
            .unwrap()
            .tables
            .discovery
            .insert(record.ticker.to_string(), record.clone());
        Ok(())
    }

    async fn upsert_analysis_cache(&self, record: &AnalysisCacheRecord) -> anyhow::Result<()> {
        self.begin_write(Destination::AnalysisCache)?;
        self.state
            .lock()
            .unwrap()
            .tables
            .analysis_cache
            .insert(record.ticker.to_string(), record.clone());
        Ok(())
    }

    async fn upsert_prediction(&self, record: &PredictionRecord) -> anyhow::Result<()> {
        self.begin_write(Destination::Predictions)?;
        self.state.lock().unwrap().tables.predictions.insert(
            (record.ticker.to_string(), record.analysis_day()),
            record.clone(),
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl LegendStore for MemoryStore {
    async fn legends_missing_embedding(&self) -> anyhow::Result<Vec<LegendRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .legends
            .iter()
            .filter(|l| l.embedding.is_none())
            .cloned()
            .collect())
    }

    async fn set_legend_embedding(&self, id: Uuid, embedding: &[f32]) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.failing_legends.lock().unwrap().contains(&id),
            "update stock_legends timed out"
        );
        let mut state = self.state.lock().unwrap();
        let legend = state
            .legends
            .iter_mut()
            .find(|l| l.id == id && l.embedding.is_none())
            .ok_or_else(|| anyhow::anyhow!("legend {id} not found or already embedded"))?;
        legend.embedding = Some(embedding.to_vec());
        Ok(())
    }
}

#[async_trait::async_trait]
impl PortfolioStore for MemoryStore {
    async fn open_positions(&self) -> anyhow::Result<Vec<PortfolioPosition>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .cloned()
            .collect())
    }

    async fn update_valuation(&self, id: Uuid, revaluation: &Revaluation) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.failing_positions.lock().unwrap().contains(&id),
            "update paper_portfolio failed"
        );
        let mut state = self.state.lock().unwrap();
        let position = state
            .positions
            .iter_mut()
            .find(|p| p.id == id && p.status == PositionStatus::Open)
            .ok_or_else(|| anyhow::anyhow!("open position {id} not found"))?;
        position.current_price = Some(revaluation.current_price);
        position.pnl_percent = Some(revaluation.pnl_percent);
        position.updated_at = revaluation.updated_at;
        Ok(())
    }

    async fn open_position_if_absent(
        &self,
        ticker: &TickerSymbol,
        price: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        anyhow::ensure!(!self.failing_entry, "insert paper_portfolio failed");
        let mut state = self.state.lock().unwrap();
        if state.positions.iter().any(|p| &p.ticker == ticker) {
            return Ok(false);
        }
        state.positions.push(PortfolioPosition {
            id: Uuid::new_v4(),
            ticker: ticker.clone(),
            status: PositionStatus::Open,
            entry_price: price,
            current_price: Some(price),
            pnl_percent: Some(0.0),
            updated_at: now,
        });
        Ok(true)
    }
}

#[async_trait::async_trait]
impl PredictionStore for MemoryStore {
    async fn pending_predictions(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PendingPrediction>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<_> = state
            .pending
            .iter()
            .filter(|p| p.analysis_date >= since && !state.grades.contains_key(&p.id))
            .cloned()
            .collect();
        out.sort_by_key(|p| p.analysis_date);
        Ok(out)
    }

    async fn record_grade(&self, id: Uuid, grade: &PredictionGrade) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        anyhow::ensure!(
            state.pending.iter().any(|p| p.id == id) && !state.grades.contains_key(&id),
            "prediction {id} not found or already graded"
        );
        state.grades.insert(id, grade.clone());
        Ok(())
    }

    async fn upsert_persona_performance(
        &self,
        performance: &PersonaPerformance,
    ) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .personas
            .insert(performance.persona_name.clone(), performance.clone());
        Ok(())
    }
}

/// Quotes priced `base + (call - 1)`, so each call is distinguishable.
#[derive(Debug)]
pub struct FakeQuotes {
    base_price: f64,
    fail_first: u32,
    calls: Mutex<u32>,
}

impl FakeQuotes {
    pub fn new(base_price: f64) -> Self {
        Self {
            base_price,
            fail_first: 0,
            calls: Mutex::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(1.0).failing_times(u32::MAX)
    }

    pub fn failing_times(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl QuoteSource for FakeQuotes {
    fn source_name(&self) -> &'static str {
        "fake_quotes"
    }

    async fn fetch_quote(&self, ticker: &TickerSymbol) -> Result<QuoteSnapshot, SensingError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call <= self.fail_first {
            return Err(SensingError {
                ticker: ticker.to_string(),
                detail: format!("HTTP 503 on call {call}"),
            });
        }
        Ok(quote(ticker, self.base_price + f64::from(call - 1)))
    }
}

#[derive(Debug)]
pub struct FakeAnalysis {
    score: f64,
    fail_first: u32,
    quoted_prices: Mutex<Vec<f64>>,
}

impl FakeAnalysis {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            fail_first: 0,
            quoted_prices: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_times(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> u32 {
        self.quoted_prices.lock().unwrap().len() as u32
    }

    /// Price of the quote handed to each call, failed calls included.
    pub fn quoted_prices(&self) -> Vec<f64> {
        self.quoted_prices.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AnalysisSource for FakeAnalysis {
    fn backend(&self) -> Backend {
        Backend::EdgeFunction
    }

    async fn synthesize(&self, quote: &QuoteSnapshot) -> Result<AnalysisResult, SynthesisError> {
        let call = {
            let mut prices = self.quoted_prices.lock().unwrap();
            prices.push(quote.price);
            prices.len() as u32
        };
        if call <= self.fail_first {
            return Err(SynthesisError {
                ticker: quote.ticker.to_string(),
                detail: "model returned no JSON object".to_string(),
            });
        }
        Ok(analysis(&quote.ticker, self.score))
    }
}

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Embeds any text as a small fixed vector; fails for texts about the given ticker.
#[derive(Debug, Default)]
pub struct FakeEmbedder {
    fail_for: Option<String>,
    calls: Mutex<usize>,
}

impl FakeEmbedder {
    pub fn failing_for(symbol: &str) -> Self {
        Self {
            fail_for: Some(format!("Stock: {symbol} ")),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model(&self) -> &str {
        "fake-embedding"
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        *self.calls.lock().unwrap() += 1;
        if let Some(marker) = &self.fail_for {
            anyhow::ensure!(!text.contains(marker.as_str()), "HTTP 429 rate limited");
        }
        Ok(vec![0.1, 0.2, 0.3])
    }
}

/// Fixed prices per ticker. Unknown tickers have no price.
#[derive(Debug, Default)]
pub struct FakePrices {
    prices: HashMap<String, f64>,
    failing: HashSet<String>,
    calls: Mutex<usize>,
}

impl FakePrices {
    pub fn with(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn failing_for(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl PriceSource for FakePrices {
    fn source_name(&self) -> &'static str {
        "fake_prices"
    }

    async fn current_price(&self, ticker: &TickerSymbol) -> anyhow::Result<Option<f64>> {
        *self.calls.lock().unwrap() += 1;
        anyhow::ensure!(
            !self.failing.contains(ticker.as_str()),
            "price lookup for {ticker} failed"
        );
        Ok(self.prices.get(ticker.as_str()).copied())
    }
}

/// A fixed screen, or a screen that always errors.
#[derive(Debug, Default)]
pub struct FakeMovers {
    listed: Vec<String>,
    fails: bool,
    requested: Mutex<Vec<usize>>,
}

impl FakeMovers {
    pub fn listing(symbols: &[&str]) -> Self {
        Self {
            listed: symbols.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MoverSource for FakeMovers {
    fn source_name(&self) -> &'static str {
        "fake_movers"
    }

    async fn most_active(&self, count: usize) -> anyhow::Result<Vec<TickerSymbol>> {
        self.requested.lock().unwrap().push(count);
        anyhow::ensure!(!self.fails, "HTTP 401 invalid crumb");
        self.listed.iter().map(|s| TickerSymbol::parse(s)).collect()
    }
}
