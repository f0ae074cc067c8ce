use crate::domain::ticker::TickerSymbol;
use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session. Used as a best-effort guard against two
// processes orchestrating the same ticker at once.
const LOCK_NAMESPACE: i64 = 0x4D55_5A45_5354; // "MUZEST"

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

// FNV-1a: stable across processes and releases, unlike std's hasher.
fn lock_key_for_ticker(ticker: &TickerSymbol) -> i64 {
    let mut hash = FNV_OFFSET;
    for byte in ticker.as_str().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    LOCK_NAMESPACE ^ (hash as i64)
}

/// Holds the session that owns the advisory lock. Release explicitly; dropping the guard returns
/// the connection to the pool with the lock still held until that session ends.
pub struct TickerLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

impl TickerLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(self.key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={})", self.key))?;
        Ok(())
    }
}

/// Returns `None` when another session already holds the lock for this ticker.
pub async fn try_acquire_ticker_lock(
    pool: &sqlx::PgPool,
    ticker: &TickerSymbol,
) -> anyhow::Result<Option<TickerLock>> {
    let key = lock_key_for_ticker(ticker);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for advisory lock")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock for {ticker} (key={key})"))?;

    Ok(acquired.0.then_some(TickerLock { conn, key }))
}
