use crate::domain::records::{
    AnalysisCacheRecord, DiscoveryRecord, LegendRecord, PendingPrediction, PersonaPerformance,
    PortfolioPosition, PredictionGrade, PredictionRecord, Revaluation,
};
use crate::domain::ticker::TickerSymbol;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod analysis_cache;
pub mod discovery;
pub mod legends;
pub mod lock;
pub mod portfolio;
pub mod predictions;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// The three Triple-Sync destinations. Every write is an idempotent upsert.
#[async_trait::async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn upsert_discovery(&self, record: &DiscoveryRecord) -> anyhow::Result<()>;

    async fn upsert_analysis_cache(&self, record: &AnalysisCacheRecord) -> anyhow::Result<()>;

    /// Keyed by ticker and analysis day.
    async fn upsert_prediction(&self, record: &PredictionRecord) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait LegendStore: Send + Sync {
    async fn legends_missing_embedding(&self) -> anyhow::Result<Vec<LegendRecord>>;

    /// Sets the embedding only if it is still null.
    async fn set_legend_embedding(&self, id: Uuid, embedding: &[f32]) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn open_positions(&self) -> anyhow::Result<Vec<PortfolioPosition>>;

    /// Applies a revaluation to a position that is still OPEN.
    async fn update_valuation(&self, id: Uuid, revaluation: &Revaluation) -> anyhow::Result<()>;

    /// Inserts an OPEN position unless the ticker already has one (open or closed).
    /// Returns whether a row was created.
    async fn open_position_if_absent(
        &self,
        ticker: &TickerSymbol,
        price: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
}

#[async_trait::async_trait]
pub trait PredictionStore: Send + Sync {
    async fn pending_predictions(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PendingPrediction>>;

    async fn record_grade(&self, id: Uuid, grade: &PredictionGrade) -> anyhow::Result<()>;

    async fn upsert_persona_performance(
        &self,
        performance: &PersonaPerformance,
    ) -> anyhow::Result<()>;
}

/// Postgres-backed implementation of every store trait. Construct once per process and share.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl AnalysisStore for PgStore {
    async fn upsert_discovery(&self, record: &DiscoveryRecord) -> anyhow::Result<()> {
        discovery::upsert(&self.pool, record).await
    }

    async fn upsert_analysis_cache(&self, record: &AnalysisCacheRecord) -> anyhow::Result<()> {
        analysis_cache::upsert(&self.pool, record).await
    }

    async fn upsert_prediction(&self, record: &PredictionRecord) -> anyhow::Result<()> {
        predictions::upsert(&self.pool, record).await
    }
}

#[async_trait::async_trait]
impl LegendStore for PgStore {
    async fn legends_missing_embedding(&self) -> anyhow::Result<Vec<LegendRecord>> {
        legends::missing_embedding(&self.pool).await
    }

    async fn set_legend_embedding(&self, id: Uuid, embedding: &[f32]) -> anyhow::Result<()> {
        legends::set_embedding(&self.pool, id, embedding).await
    }
}

#[async_trait::async_trait]
impl PortfolioStore for PgStore {
    async fn open_positions(&self) -> anyhow::Result<Vec<PortfolioPosition>> {
        portfolio::open_positions(&self.pool).await
    }

    async fn update_valuation(&self, id: Uuid, revaluation: &Revaluation) -> anyhow::Result<()> {
        portfolio::update_valuation(&self.pool, id, revaluation).await
    }

    async fn open_position_if_absent(
        &self,
        ticker: &TickerSymbol,
        price: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        portfolio::open_if_absent(&self.pool, ticker, price, now).await
    }
}

#[async_trait::async_trait]
impl PredictionStore for PgStore {
    async fn pending_predictions(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PendingPrediction>> {
        predictions::pending_since(&self.pool, since).await
    }

    async fn record_grade(&self, id: Uuid, grade: &PredictionGrade) -> anyhow::Result<()> {
        predictions::record_grade(&self.pool, id, grade).await
    }

    async fn upsert_persona_performance(
        &self,
        performance: &PersonaPerformance,
    ) -> anyhow::Result<()> {
        predictions::upsert_persona_performance(&self.pool, performance).await
    }
}
