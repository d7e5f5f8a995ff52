use actix_web::web;
use anyhow::{Result, anyhow};
use chrono::{NaiveDateTime, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use tracing::{error, info};

use crate::error::ApiError;

// Database connection pool type
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Timestamps are stored as naive UTC. Rows stamp `created_at` with this
/// instead of relying on the server's session time zone.
pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Builds the pool without opening connections up front, so the server can
/// boot while the database is still coming up.
pub fn build_pool(database_url: &str, max_size: u32) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(max_size)
        .min_idle(Some(0))
        .test_on_check_out(true)
        .build(manager)
        .map_err(|e| anyhow!("Failed to create pool: {}", e))
}

/// Boot-time connectivity probe. Failure is logged, not fatal.
pub async fn check_connection(pool: &DbPool) -> bool {
    let result = run(pool, |conn| {
        diesel::sql_query("SELECT 1").execute(conn)?;
        Ok(())
    })
    .await;

    match result {
        Ok(()) => {
            info!("Database connected successfully");
            true
        }
        Err(e) => {
            error!(error = %e, "Database connection failed");
            false
        }
    }
}

/// Runs blocking diesel work on the actix blocking pool with a pooled
/// connection.
pub async fn run<F, T>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    web::block(move || {
        let mut conn = pool.get()?;
        f(&mut *conn)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn stored_clock_is_utc() {
        let before = Utc::now().naive_utc();
        let now = utc_now();
        let after = Utc::now().naive_utc();
        assert!(before <= now && now <= after);
    }
}
