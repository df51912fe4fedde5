//! The bundled password-safe engine.
//!
//! This module provides:
//! - `Record`, `RecordField` and `FieldMask` (`record`)
//! - Binary safe file format with HMAC integrity (`format`)
//! - `SafeStore` for creating, opening, merging and saving safes (`store`)
//! - Identity-tagged lock files (`lock`)
//! - XML and text exports (`export`) and imports (`import`)

pub mod export;
pub mod format;
pub mod import;
pub mod lock;
pub mod record;
pub mod store;

// Re-export the most commonly used items.
pub use export::{ExportOptions, MatchRule, SubgroupFilter};
pub use format::{SafeHeader, StoredArgon2Params};
pub use lock::{LockError, SafeLock};
pub use record::{FieldMask, Record, RecordField};
pub use store::{MergeSummary, SafeStore};
