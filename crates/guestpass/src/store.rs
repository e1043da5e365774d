use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::Result;

/// DDL for the two relations. `redemptions.code` is the primary key, so the
/// database refuses a second redemption of the same code regardless of what
/// the application checked first.
const SCHEMA: [&str; 3] = [
    r#"CREATE TABLE IF NOT EXISTS qr_codes (
        code        TEXT PRIMARY KEY NOT NULL,
        promoter_id TEXT NOT NULL,
        created_at  TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS redemptions (
        code        TEXT PRIMARY KEY NOT NULL REFERENCES qr_codes(code),
        redeemed_at TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_qr_codes_promoter_id
        ON qr_codes(promoter_id)"#,
];

/// Shared persistence handle. Cloning is cheap; all clones share one pool.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the pool described by `config` and make sure the schema exists.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.is_in_memory() {
            // The database lives and dies with its only connection
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;

        info!(
            "Opened store at {} ({} max connections)",
            config.database_url, config.max_connections
        );
        Ok(store)
    }

    /// Idempotent schema creation.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = Store::open(&StoreConfig::in_memory()).await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(tables, vec!["qr_codes", "redemptions"]);
    }

    #[tokio::test]
    async fn test_redemption_requires_existing_code() {
        let store = Store::open(&StoreConfig::in_memory()).await.unwrap();

        let result = sqlx::query("INSERT INTO redemptions (code, redeemed_at) VALUES (?, ?)")
            .bind("missing")
            .bind("2024-01-01T00:00:00Z")
            .execute(store.pool())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("passes.db").display());
        let config = StoreConfig::new(&url).with_max_connections(2);

        let store = Store::open(&config).await.unwrap();
        sqlx::query("INSERT INTO qr_codes (code, promoter_id, created_at) VALUES (?, ?, ?)")
            .bind("abc")
            .bind("promo")
            .bind("2024-01-01T00:00:00Z")
            .execute(store.pool())
            .await
            .unwrap();
        store.close().await;

        let reopened = Store::open(&config).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qr_codes")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
