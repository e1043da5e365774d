use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{GuestpassError, Result};
use crate::model::Code;
use crate::store::Store;

/// Mints codes and answers which promoter a code belongs to
#[derive(Clone, Debug)]
pub struct CodeRegistry {
    store: Store,
}

impl CodeRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create and persist a fresh code for `promoter_id`. The promoter string
    /// is stored exactly as given.
    pub async fn issue(&self, promoter_id: &str) -> Result<Code> {
        if promoter_id.is_empty() {
            return Err(GuestpassError::InvalidPromoter);
        }

        let code = Code {
            code: Uuid::new_v4().to_string(),
            promoter_id: promoter_id.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO qr_codes (code, promoter_id, created_at) VALUES (?, ?, ?)")
            .bind(&code.code)
            .bind(&code.promoter_id)
            .bind(code.created_at)
            .execute(self.store.pool())
            .await?;

        info!("Issued code {} for promoter {}", code.code, code.promoter_id);
        Ok(code)
    }

    pub async fn lookup(&self, code: &str) -> Result<String> {
        debug!("Looking up code {}", code);
        sqlx::query_scalar("SELECT promoter_id FROM qr_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or_else(|| GuestpassError::CodeNotFound(code.to_string()))
    }

    pub async fn get(&self, code: &str) -> Result<Option<Code>> {
        let record = sqlx::query_as::<_, Code>(
            "SELECT code, promoter_id, created_at FROM qr_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(self.store.pool())
        .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    async fn registry() -> CodeRegistry {
        let store = Store::open(&StoreConfig::in_memory()).await.unwrap();
        CodeRegistry::new(store)
    }

    #[tokio::test]
    async fn test_issue_twice_gives_distinct_codes() {
        let registry = registry().await;
        let first = registry.issue("alice").await.unwrap();
        let second = registry.issue("alice").await.unwrap();

        assert_ne!(first.code, second.code);
        assert_eq!(first.promoter_id, "alice");
        assert_eq!(second.promoter_id, "alice");
        assert!(Uuid::parse_str(&first.code).is_ok());
    }

    #[tokio::test]
    async fn test_lookup_returns_owner() {
        let registry = registry().await;
        let code = registry.issue("bob").await.unwrap();
        assert_eq!(registry.lookup(&code.code).await.unwrap(), "bob");
    }

    #[tokio::test]
    async fn test_lookup_unknown_code() {
        let registry = registry().await;
        let err = registry.lookup("nonexistent-code").await.unwrap_err();
        assert!(matches!(err, GuestpassError::CodeNotFound(c) if c == "nonexistent-code"));
    }

    #[tokio::test]
    async fn test_get_round_trips_record() {
        let registry = registry().await;
        let code = registry.issue("Promo Team ").await.unwrap();

        let stored = registry.get(&code.code).await.unwrap().unwrap();
        assert_eq!(stored.promoter_id, "Promo Team ");
        assert_eq!(stored.created_at, code.created_at);
        assert!(registry.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_promoter_rejected() {
        let registry = registry().await;
        assert!(matches!(
            registry.issue("").await,
            Err(GuestpassError::InvalidPromoter)
        ));
    }
}
