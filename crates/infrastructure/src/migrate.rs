use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

use rolegate_core::{AppError, AppResult};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Applies the access control schema migrations to the connected database.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    info!("access control migrations applied");
    Ok(())
}
