use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use super::StoreError;
use crate::domain::AccountKey;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meter_readings (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    account_key  TEXT    NOT NULL,
    period_start TEXT    NOT NULL,
    period_end   TEXT    NOT NULL,
    rate_a       INTEGER NOT NULL,
    rate_b       INTEGER NOT NULL,
    rate_c       INTEGER NOT NULL,
    total        INTEGER NOT NULL,
    created_at   TEXT    NOT NULL,
    updated_at   TEXT    NOT NULL,
    UNIQUE (account_key, period_start)
);
CREATE INDEX IF NOT EXISTS idx_meter_readings_period_start ON meter_readings (period_start);
"#;

/// Root of the per-account reading partitions.
///
/// Every account lives in its own SQLite file. Handles are cheap to open and
/// each logical query is expected to open and close its own.
#[derive(Debug, Clone)]
pub struct ReadingStore {
    data_dir: PathBuf,
}

impl ReadingStore {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn partition_path(&self, key: &AccountKey) -> PathBuf {
        self.data_dir.join(format!("readings_{key}.db"))
    }

    /// Open (creating if needed) the partition of one account.
    pub async fn open(&self, key: &AccountKey) -> Result<AccountPartition, StoreError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let options = SqliteConnectOptions::new()
            .filename(self.partition_path(key))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        tracing::debug!(account = %key, "opened reading partition");

        Ok(AccountPartition {
            key: key.clone(),
            pool,
        })
    }
}

/// An open handle on one account's readings.
///
/// Not meant to be shared between concurrent logical queries.
pub struct AccountPartition {
    key: AccountKey,
    pool: SqlitePool,
}

impl AccountPartition {
    pub fn key(&self) -> &AccountKey {
        &self.key
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
