// src/storage/migrations.rs

use sqlx::migrate::Migrator;
use sqlx::PgPool;
use std::path::Path;
use tracing::{info, warn};

use crate::Result;

/// Outcome of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Up-migrations found in the directory
    pub discovered: usize,

    /// Migrations this run applied
    pub applied: usize,
}

impl MigrationReport {
    /// Nothing was pending. Not an error.
    pub fn is_no_change(&self) -> bool {
        self.applied == 0
    }
}

/// Apply every pending migration under `dir` in ascending version order.
///
/// Migration files are named `<version>_<description>.sql`. Already
/// applied versions are skipped; a modified applied migration, a failing
/// statement or an unreadable directory is an error.
pub async fn apply_migrations(pool: &PgPool, dir: &Path) -> Result<MigrationReport> {
    let migrator = Migrator::new(dir).await?;
    let discovered = migrator
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .count();

    info!(
        "Running database migrations from {} ({} found)",
        dir.display(),
        discovered
    );

    let before = applied_count(pool).await?;
    migrator.run(pool).await?;
    let after = applied_count(pool).await?;

    let report = MigrationReport {
        discovered,
        applied: after.saturating_sub(before),
    };

    if report.is_no_change() {
        warn!("No changes in migration");
    } else {
        info!("Applied {} migration(s)", report.applied);
    }

    Ok(report)
}

/// SQLSTATE `undefined_table`
const UNDEFINED_TABLE: &str = "42P01";

/// Successful rows in the sqlx bookkeeping table
async fn applied_count(pool: &PgPool) -> Result<usize> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await;
    count_or_absent(count)
}

/// A missing bookkeeping table means nothing was applied yet
fn count_or_absent(count: std::result::Result<i64, sqlx::Error>) -> Result<usize> {
    match count {
        Ok(count) => Ok(count.max(0) as usize),
        Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNDEFINED_TABLE) => Ok(0),
        Err(e) => Err(e.into()),
    }
}
