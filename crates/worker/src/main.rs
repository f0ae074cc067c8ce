use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use muzestock_core::config::{env_or, Settings};
use muzestock_core::domain::ticker::TickerSymbol;
use muzestock_core::movers::yahoo::YahooScreenerClient;
use muzestock_core::pipeline::sleep::{Sleeper, TokioSleeper};
use muzestock_core::pricing::PriceSource;
use muzestock_core::storage::PgStore;

mod summary;

const DEFAULT_TICKER: &str = "SNDL";
const DEFAULT_SCAN_COOLDOWN_MS: u64 = 3000;
const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn";

#[derive(Debug, Parser)]
#[command(name = "muzestock_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sense, synthesize and persist each ticker in turn.
    Analyze {
        /// Tickers to analyze. Defaults to SNDL.
        tickers: Vec<String>,

        /// Scan the N most active US tickers instead of a fixed list.
        #[arg(long, value_name = "N", conflicts_with = "tickers",
              value_parser = clap::value_parser!(u16).range(1..=250))]
        movers: Option<u16>,

        /// Pause between tickers. Overrides SCAN_COOLDOWN_MS.
        #[arg(long)]
        cooldown_ms: Option<u64>,
    },
    /// Embed every legend that has no embedding yet.
    BackfillEmbeddings,
    /// Mark every OPEN paper position to market.
    RevaluePositions {
        #[arg(long, value_enum, default_value_t = PriceSourceArg::Yahoo)]
        price_source: PriceSourceArg,
    },
    /// Grade the last week of predictions and refresh persona performance.
    VerifyPredictions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PriceSourceArg {
    Yahoo,
    Quote,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Analyze {
            tickers,
            movers,
            cooldown_ms,
        } => analyze(&settings, tickers, movers, cooldown_ms).await,
        Command::BackfillEmbeddings => backfill_embeddings(&settings).await,
        Command::RevaluePositions { price_source } => {
            revalue_positions(&settings, price_source).await
        }
        Command::VerifyPredictions => verify_predictions(&settings).await,
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker aborted");
    }
    result
}

async fn connect(settings: &Settings) -> anyhow::Result<sqlx::PgPool> {
    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    muzestock_core::storage::migrate(&pool).await?;
    Ok(pool)
}

fn parse_tickers(raw: Vec<String>) -> anyhow::Result<Vec<TickerSymbol>> {
    if raw.is_empty() {
        return Ok(vec![TickerSymbol::parse(DEFAULT_TICKER)?]);
    }
    let mut out: Vec<TickerSymbol> = Vec::with_capacity(raw.len());
    for s in raw {
        let ticker = TickerSymbol::parse(&s).with_context(|| format!("invalid ticker {s:?}"))?;
        if !out.contains(&ticker) {
            out.push(ticker);
        }
    }
    Ok(out)
}

/// Where an `analyze` run gets its tickers from.
enum Universe {
    Listed(Vec<TickerSymbol>),
    Movers {
        screener: YahooScreenerClient,
        count: usize,
    },
}

impl Universe {
    fn from_args(raw_tickers: Vec<String>, movers: Option<u16>) -> anyhow::Result<Self> {
        Ok(match movers {
            Some(count) => Self::Movers {
                screener: YahooScreenerClient::from_env()?,
                count: usize::from(count),
            },
            None => Self::Listed(parse_tickers(raw_tickers)?),
        })
    }

    async fn resolve(self) -> Vec<TickerSymbol> {
        match self {
            Self::Listed(tickers) => tickers,
            Self::Movers { screener, count } => {
                muzestock_core::movers::resolve_universe(&screener, count).await
            }
        }
    }
}

async fn analyze(
    settings: &Settings,
    raw_tickers: Vec<String>,
    movers: Option<u16>,
    cooldown_ms: Option<u64>,
) -> anyhow::Result<()> {
    use muzestock_core::pipeline::entry::enter_high_conviction;
    use muzestock_core::pipeline::filter::ScanFilter;
    use muzestock_core::pipeline::orchestrator::{Orchestrator, RetryPolicy};
    use muzestock_core::pipeline::writer::TripleSyncWriter;
    use muzestock_core::sensing::smart_quote::SmartQuoteClient;
    use muzestock_core::storage::lock::try_acquire_ticker_lock;

    // Everything that can fail on configuration is resolved before the first network call.
    let universe = Universe::from_args(raw_tickers, movers)?;
    let filter = ScanFilter::from_env()?;
    settings.require_database_url()?;
    let quotes = Arc::new(SmartQuoteClient::from_settings(settings)?);
    let analysis = muzestock_core::synthesis::from_settings(settings)?;
    let policy = RetryPolicy::from_env();
    let cooldown = Duration::from_millis(
        cooldown_ms.unwrap_or_else(|| env_or("SCAN_COOLDOWN_MS", DEFAULT_SCAN_COOLDOWN_MS)),
    );

    let tickers = universe.resolve().await;
    let pool = connect(settings).await?;
    let store = Arc::new(PgStore::new(pool.clone()));
    let sleeper = Arc::new(TokioSleeper);
    let orchestrator = Orchestrator::new(
        quotes,
        analysis.clone(),
        TripleSyncWriter::new(store.clone()),
        sleeper.clone(),
        policy,
    )
    .with_filter(filter.clone());

    tracing::info!(
        tickers = tickers.len(),
        backend = ?analysis.backend(),
        max_attempts = policy.max_attempts,
        min_score = filter.min_score,
        permissive_filter = filter.is_permissive(),
        "starting analyze run"
    );

    let mut rows = Vec::with_capacity(tickers.len());
    for (idx, ticker) in tickers.iter().enumerate() {
        if idx != 0 {
            tracing::info!(?cooldown, "cooling down before next ticker");
            sleeper.sleep(cooldown).await;
        }

        println!("[{}/{}] {ticker}", idx + 1, tickers.len());

        let lock = match try_acquire_ticker_lock(&pool, ticker).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                tracing::warn!(%ticker, "ticker lock held by another run; skipping");
                let row = summary::Row::lock_held(ticker);
                println!("  {}", row.status_line());
                rows.push(row);
                continue;
            }
            Err(err) => {
                tracing::warn!(%ticker, error = %format!("{err:#}"), "ticker lock failed; skipping");
                let row = summary::Row::lock_failed(ticker, &err);
                println!("  {}", row.status_line());
                rows.push(row);
                continue;
            }
        };

        let report = orchestrator.run(ticker).await;
        if let Some(scored) = report.scored() {
            enter_high_conviction(store.as_ref(), scored, Utc::now()).await;
        }

        if let Err(err) = lock.release().await {
            tracing::warn!(%ticker, error = %format!("{err:#}"), "ticker lock release failed");
        }

        let row = summary::Row::from_report(&report);
        println!("  {}", row.status_line());
        rows.push(row);
    }

    print!("{}", summary::render(&rows));
    tracing::info!(
        saved = summary::count(&rows, summary::Status::Succeeded),
        filtered = summary::count(&rows, summary::Status::Filtered),
        failed = summary::count(&rows, summary::Status::Failed),
        skipped = summary::count(&rows, summary::Status::Skipped),
        "analyze run finished"
    );
    Ok(())
}

async fn backfill_embeddings(settings: &Settings) -> anyhow::Result<()> {
    use muzestock_core::embedding::openai::OpenAiEmbeddingClient;
    use muzestock_core::pipeline::backfill::{BackfillOptions, EmbeddingBackfill};

    settings.require_database_url()?;
    let embedder = Arc::new(OpenAiEmbeddingClient::from_settings(settings)?);
    let options = BackfillOptions::from_env()?;

    let pool = connect(settings).await?;
    let job = EmbeddingBackfill::new(
        Arc::new(PgStore::new(pool)),
        embedder,
        Arc::new(TokioSleeper),
        options,
    );

    let summary = job.run().await?;
    for failure in &summary.failures {
        println!("  failed {} ({}): {}", failure.ticker, failure.legend_id, failure.detail);
    }
    println!(
        "embedding backfill: selected={} embedded={} failed={}",
        summary.selected,
        summary.embedded,
        summary.failures.len()
    );
    tracing::info!(
        selected = summary.selected,
        embedded = summary.embedded,
        failed = summary.failures.len(),
        "embedding backfill finished"
    );
    Ok(())
}

async fn revalue_positions(settings: &Settings, source: PriceSourceArg) -> anyhow::Result<()> {
    use muzestock_core::pipeline::revaluation::PositionRevaluation;

    settings.require_database_url()?;
    let prices = price_source(settings, source)?;

    let pool = connect(settings).await?;
    let job = PositionRevaluation::new(Arc::new(PgStore::new(pool)), prices);

    let summary = job.run(Utc::now()).await?;
    for failure in &summary.failures {
        println!("  failed {} ({}): {}", failure.ticker, failure.position_id, failure.detail);
    }
    println!(
        "position revaluation: open={} updated={} unpriced={} failed={}",
        summary.open,
        summary.updated,
        summary.unpriced,
        summary.failures.len()
    );
    tracing::info!(
        open = summary.open,
        updated = summary.updated,
        unpriced = summary.unpriced,
        failed = summary.failures.len(),
        "position revaluation finished"
    );
    Ok(())
}

async fn verify_predictions(settings: &Settings) -> anyhow::Result<()> {
    use muzestock_core::pipeline::verification::PredictionVerifier;

    settings.require_database_url()?;
    let prices = price_source(settings, PriceSourceArg::Quote)?;

    let pool = connect(settings).await?;
    let job = PredictionVerifier::new(Arc::new(PgStore::new(pool)), prices);

    let summary = job.run(Utc::now()).await?;
    for persona in &summary.personas {
        println!(
            "  {:<16} {}/{} correct, avg roi {:.2}%",
            persona.persona_name,
            persona.correct_predictions,
            persona.total_predictions,
            persona.avg_roi
        );
    }
    println!(
        "prediction verification: pending={} graded={} skipped={} failed={}",
        summary.pending,
        summary.graded,
        summary.skipped,
        summary.failures.len()
    );
    tracing::info!(
        pending = summary.pending,
        graded = summary.graded,
        skipped = summary.skipped,
        failed = summary.failures.len(),
        "prediction verification finished"
    );
    Ok(())
}

fn price_source(settings: &Settings, source: PriceSourceArg) -> anyhow::Result<Arc<dyn PriceSource>> {
    use muzestock_core::pricing::yahoo::YahooChartClient;
    use muzestock_core::sensing::smart_quote::SmartQuoteClient;

    Ok(match source {
        PriceSourceArg::Yahoo => Arc::new(YahooChartClient::from_env()?),
        PriceSourceArg::Quote => Arc::new(SmartQuoteClient::from_settings(settings)?),
    })
}

// RUST_LOG wins when set; otherwise progress and warnings still reach the log.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
