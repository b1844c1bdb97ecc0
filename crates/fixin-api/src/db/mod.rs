//! # Database Persistence Layer
//!
//! PostgreSQL + PostGIS implementations of the dispatch store and
//! candidate locator, via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, requests,
//! balances and the ledger live in PostgreSQL and candidate lookup runs as a
//! PostGIS query. When absent, the service runs on the in-memory store from
//! `fixin-dispatch` (suitable for development and testing).
//!
//! ## Layout
//!
//! One row per request in `service_requests` holds the immutable request.
//! Its lifecycle position is the single bucket table holding a row for it:
//! `pending_requests`, `assigned_requests`, `completed_requests` or
//! `cancelled_requests`. Moves delete from one and insert into the next
//! inside the transition's transaction, while the `service_requests` row
//! is locked `FOR UPDATE`.

pub mod locator;
pub mod store;

pub use locator::PgLocator;
pub use store::{PgStore, PgTx};

use sqlx::postgres::{PgPool, PgPoolOptions};

use fixin_dispatch::StoreError;

/// Postgres SQLSTATE codes that mean "lost a lock race": lock_not_available,
/// deadlock_detected, serialization_failure.
const LOCK_CONFLICT_CODES: [&str; 3] = ["55P03", "40P01", "40001"];

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Classify a SQLx failure for the engine.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db
            .code()
            .is_some_and(|code| LOCK_CONFLICT_CODES.contains(&code.as_ref()))
        {
            return StoreError::LockTimeout;
        }
    }
    StoreError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_backend_failures() {
        assert!(matches!(
            store_error(sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
        assert!(matches!(
            store_error(sqlx::Error::PoolTimedOut),
            StoreError::Backend(_)
        ));
    }
}
