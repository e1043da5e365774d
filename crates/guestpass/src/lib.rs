//! Single-use guest passes bound to promoters.
//!
//! A [`CodeRegistry`] mints opaque codes for a promoter, a [`RedemptionLedger`]
//! lets each code be redeemed exactly once and reports per-promoter counts,
//! and a [`QrEncoder`] turns a code into a scannable PNG.
//!
//! ```rust,no_run
//! use guestpass::{RedemptionLedger, Store, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> guestpass::Result<()> {
//!     let store = Store::open(&StoreConfig::default()).await?;
//!     let ledger = RedemptionLedger::new(store);
//!
//!     let code = ledger.registry().issue("promoter-7").await?;
//!     let receipt = ledger.redeem(&code.code).await?;
//!     println!("Redeemed for {}", receipt.promoter_id);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod qr;
pub mod registry;
pub mod store;

pub use config::{StoreConfig, DEFAULT_DATABASE_URL};
pub use error::{GuestpassError, Result};
pub use ledger::{RedemptionLedger, RedemptionResult};
pub use model::{Code, CodeState, PromoterStats, RedemptionReceipt};
pub use qr::{code_from_file_name, png_file_name, QrEncoder};
pub use registry::CodeRegistry;
pub use store::Store;
