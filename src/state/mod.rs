//! Sync ledger.
//!
//! SQLite record of sync runs and of every upload with its destination URL.
//! The ledger is observational: the checkpoint file and the staging area stay
//! the sources of truth, so a run proceeds without it when it cannot be
//! opened.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{SqliteStateDb, StateDb};
pub use types::{LedgerSummary, SyncRunRecord, SyncRunStats, UploadRecord};
