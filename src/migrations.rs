//! Database migrations
//!
//! SQLx embedded migrations for the PostgreSQL primary tier and the SQLite
//! development tier, which create the same logical `proofs` table, and for
//! the SQLite mirror journal.

use sqlx::{PgPool, SqlitePool};

static POSTGRES_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/postgres");
static SQLITE_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/sqlite");
static JOURNAL_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/journal");

/// Apply pending PostgreSQL migrations
pub async fn run_postgres(pool: &PgPool) -> anyhow::Result<()> {
    POSTGRES_MIGRATOR.run(pool).await?;
    tracing::info!(
        migrations = POSTGRES_MIGRATOR.iter().count(),
        "PostgreSQL proof schema up to date"
    );
    Ok(())
}

/// Apply pending SQLite migrations
pub async fn run_sqlite(pool: &SqlitePool) -> anyhow::Result<()> {
    SQLITE_MIGRATOR.run(pool).await?;
    Ok(())
}

/// Apply pending mirror journal migrations
pub async fn run_journal(pool: &SqlitePool) -> anyhow::Result<()> {
    JOURNAL_MIGRATOR.run(pool).await?;
    Ok(())
}
