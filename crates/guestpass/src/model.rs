use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issued pass. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Code {
    /// Random v4 UUID in hyphenated form, also the QR payload
    pub code: String,
    pub promoter_id: String,
    pub created_at: DateTime<Utc>,
}

/// Successful outcome of a redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionReceipt {
    pub code: String,
    pub promoter_id: String,
    pub redeemed_at: DateTime<Utc>,
}

/// Lifecycle of a single code. Transitions only go forward:
/// `Issued` → `Redeemed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CodeState {
    Unknown,
    Issued {
        promoter_id: String,
    },
    Redeemed {
        promoter_id: String,
        redeemed_at: DateTime<Utc>,
    },
}

impl CodeState {
    pub fn is_redeemed(&self) -> bool {
        matches!(self, CodeState::Redeemed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoterStats {
    pub promoter_id: String,
    pub issued: u64,
    pub redeemed: u64,
}
