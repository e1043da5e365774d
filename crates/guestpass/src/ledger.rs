use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{GuestpassError, Result};
use crate::model::{CodeState, PromoterStats, RedemptionReceipt};
use crate::registry::CodeRegistry;
use crate::store::Store;

pub type RedemptionResult = Result<RedemptionReceipt>;

/// Records at most one redemption per code and aggregates them per promoter
#[derive(Clone, Debug)]
pub struct RedemptionLedger {
    store: Store,
    registry: CodeRegistry,
}

impl RedemptionLedger {
    pub fn new(store: Store) -> Self {
        let registry = CodeRegistry::new(store.clone());
        Self { store, registry }
    }

    pub fn registry(&self) -> &CodeRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Redeem `code`: Unknown → `CodeNotFound`, Issued → Redeemed,
    /// Redeemed → `AlreadyRedeemed`.
    ///
    /// The conditional insert is the first statement of the transaction, so
    /// the write lock is held before either check is observed. Concurrent
    /// redemptions of one code serialize on it and only the first inserts a
    /// row; the primary key on `redemptions.code` backs this up.
    pub async fn redeem(&self, code: &str) -> RedemptionResult {
        let redeemed_at = Utc::now();
        let mut tx = self.store.pool().begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO redemptions (code, redeemed_at)
             SELECT code, ? FROM qr_codes WHERE code = ?
             ON CONFLICT(code) DO NOTHING",
        )
        .bind(redeemed_at)
        .bind(code)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let promoter_id: Option<String> =
            sqlx::query_scalar("SELECT promoter_id FROM qr_codes WHERE code = ?")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(promoter_id) = promoter_id else {
            tx.rollback().await?;
            warn!("Rejected unknown code {}", code);
            return Err(GuestpassError::CodeNotFound(code.to_string()));
        };

        if inserted == 0 {
            tx.rollback().await?;
            warn!("Rejected second redemption of code {}", code);
            return Err(GuestpassError::AlreadyRedeemed(code.to_string()));
        }

        tx.commit().await?;
        info!("Redeemed code {} (promoter {})", code, promoter_id);

        Ok(RedemptionReceipt {
            code: code.to_string(),
            promoter_id,
            redeemed_at,
        })
    }

    pub async fn is_redeemed(&self, code: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM redemptions WHERE code = ?)")
                .bind(code)
                .fetch_one(self.store.pool())
                .await?;
        Ok(exists)
    }

    /// Where `code` currently sits in its lifecycle. Read in one statement so
    /// the promoter and redemption columns come from the same snapshot.
    pub async fn status(&self, code: &str) -> Result<CodeState> {
        let row: Option<(String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT c.promoter_id, r.redeemed_at
             FROM qr_codes c
             LEFT JOIN redemptions r ON r.code = c.code
             WHERE c.code = ?",
        )
        .bind(code)
        .fetch_optional(self.store.pool())
        .await?;

        Ok(match row {
            None => CodeState::Unknown,
            Some((promoter_id, None)) => CodeState::Issued { promoter_id },
            Some((promoter_id, Some(redeemed_at))) => CodeState::Redeemed {
                promoter_id,
                redeemed_at,
            },
        })
    }

    /// Issued and redeemed counts per promoter, ordered by promoter id.
    /// Promoters are grouped by their exact string.
    pub async fn stats(&self) -> Result<Vec<PromoterStats>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT c.promoter_id, COUNT(c.code), COUNT(r.code)
             FROM qr_codes c
             LEFT JOIN redemptions r ON r.code = c.code
             GROUP BY c.promoter_id
             ORDER BY c.promoter_id",
        )
        .fetch_all(self.store.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(promoter_id, issued, redeemed)| PromoterStats {
                promoter_id,
                issued: issued.max(0) as u64,
                redeemed: redeemed.max(0) as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    async fn ledger() -> RedemptionLedger {
        let store = Store::open(&StoreConfig::in_memory()).await.unwrap();
        RedemptionLedger::new(store)
    }

    async fn redemption_rows(ledger: &RedemptionLedger) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM redemptions")
            .fetch_one(ledger.store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_redeem_once_then_rejected() {
        let ledger = ledger().await;
        let code = ledger.registry().issue("alice").await.unwrap();

        let receipt = ledger.redeem(&code.code).await.unwrap();
        assert_eq!(receipt.promoter_id, "alice");
        assert_eq!(receipt.code, code.code);

        for _ in 0..3 {
            let err = ledger.redeem(&code.code).await.unwrap_err();
            assert!(matches!(err, GuestpassError::AlreadyRedeemed(_)));
        }
        assert_eq!(redemption_rows(&ledger).await, 1);
    }

    #[tokio::test]
    async fn test_rejected_redemption_keeps_first_timestamp() {
        let ledger = ledger().await;
        let code = ledger.registry().issue("alice").await.unwrap();
        let receipt = ledger.redeem(&code.code).await.unwrap();
        let _ = ledger.redeem(&code.code).await;

        match ledger.status(&code.code).await.unwrap() {
            CodeState::Redeemed { redeemed_at, .. } => {
                assert_eq!(redeemed_at, receipt.redeemed_at)
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redeem_unknown_code_writes_nothing() {
        let ledger = ledger().await;
        ledger.registry().issue("alice").await.unwrap();

        let err = ledger.redeem("nonexistent-code").await.unwrap_err();
        assert!(matches!(err, GuestpassError::CodeNotFound(_)));
        assert_eq!(redemption_rows(&ledger).await, 0);
    }

    #[tokio::test]
    async fn test_status_follows_lifecycle() {
        let ledger = ledger().await;
        assert_eq!(ledger.status("nope").await.unwrap(), CodeState::Unknown);

        let code = ledger.registry().issue("carol").await.unwrap();
        assert_eq!(
            ledger.status(&code.code).await.unwrap(),
            CodeState::Issued {
                promoter_id: "carol".into()
            }
        );
        assert!(!ledger.is_redeemed(&code.code).await.unwrap());

        ledger.redeem(&code.code).await.unwrap();
        assert!(ledger.status(&code.code).await.unwrap().is_redeemed());
        assert!(ledger.is_redeemed(&code.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_stats_counts_per_promoter() {
        let ledger = ledger().await;
        let mut a_codes = Vec::new();
        for _ in 0..3 {
            a_codes.push(ledger.registry().issue("A").await.unwrap());
        }
        for _ in 0..2 {
            ledger.registry().issue("B").await.unwrap();
        }
        ledger.redeem(&a_codes[0].code).await.unwrap();
        ledger.redeem(&a_codes[1].code).await.unwrap();
        // A rejected attempt must not be counted
        let _ = ledger.redeem(&a_codes[1].code).await;

        let stats = ledger.stats().await.unwrap();
        assert_eq!(
            stats,
            vec![
                PromoterStats {
                    promoter_id: "A".into(),
                    issued: 3,
                    redeemed: 2
                },
                PromoterStats {
                    promoter_id: "B".into(),
                    issued: 2,
                    redeemed: 0
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_stats_keeps_exact_promoter_spelling() {
        let ledger = ledger().await;
        ledger.registry().issue("promo").await.unwrap();
        ledger.registry().issue("Promo").await.unwrap();
        ledger.registry().issue("promo ").await.unwrap();

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.len(), 3);
        assert!(stats.iter().all(|s| s.issued == 1 && s.redeemed == 0));
    }

    #[tokio::test]
    async fn test_stats_empty_store() {
        let ledger = ledger().await;
        assert!(ledger.stats().await.unwrap().is_empty());
    }
}
