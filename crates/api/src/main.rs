use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use muzestock_core::domain::records::{
    AnalysisCacheRecord, DiscoveryRecord, PendingPrediction, PersonaPerformance, PortfolioPosition,
};
use muzestock_core::domain::ticker::TickerSymbol;
use muzestock_core::storage;

const DEFAULT_DISCOVERY_LIMIT: i64 = 50;
const MAX_DISCOVERY_LIMIT: i64 = 200;
const PREDICTION_HISTORY_LIMIT: i64 = 30;
const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = muzestock_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let app = router(AppState { pool });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/discoveries", get(list_discoveries))
        .route("/analysis/:ticker", get(get_analysis))
        .route("/predictions/:ticker", get(list_predictions))
        .route("/portfolio", get(list_portfolio))
        .route("/personas", get(list_personas))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
}

impl AppState {
    fn pool(&self) -> Result<&PgPool, StatusCode> {
        self.pool.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn internal(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn parse_ticker(raw: &str) -> Result<TickerSymbol, StatusCode> {
    TickerSymbol::parse(raw).map_err(|_| StatusCode::BAD_REQUEST)
}

#[derive(Debug, Default, Deserialize)]
struct DiscoveryQuery {
    limit: Option<i64>,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_DISCOVERY_LIMIT)
        .clamp(1, MAX_DISCOVERY_LIMIT)
}

async fn list_discoveries(
    State(state): State<AppState>,
    Query(query): Query<DiscoveryQuery>,
) -> Result<Json<Vec<DiscoveryRecord>>, StatusCode> {
    let pool = state.pool()?;
    let rows = storage::discovery::list_top(pool, clamp_limit(query.limit))
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<AnalysisCacheRecord>, StatusCode> {
    let pool = state.pool()?;
    let ticker = parse_ticker(&ticker)?;
    let record = storage::analysis_cache::get(pool, &ticker)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(record))
}

async fn list_predictions(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Vec<PendingPrediction>>, StatusCode> {
    let pool = state.pool()?;
    let ticker = parse_ticker(&ticker)?;
    let rows = storage::predictions::for_ticker(pool, &ticker, PREDICTION_HISTORY_LIMIT)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

async fn list_portfolio(
    State(state): State<AppState>,
) -> Result<Json<Vec<PortfolioPosition>>, StatusCode> {
    let pool = state.pool()?;
    let rows = storage::portfolio::open_positions(pool)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

async fn list_personas(
    State(state): State<AppState>,
) -> Result<Json<Vec<PersonaPerformance>>, StatusCode> {
    let pool = state.pool()?;
    let rows = storage::predictions::persona_performance(pool)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// RUST_LOG wins when set; otherwise progress and warnings still reach the log.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_sentry(settings: &muzestock_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
