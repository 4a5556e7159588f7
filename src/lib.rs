// src/lib.rs
//! Incident feed reconciliation.
//!
//! Feed snapshots (GeoJSON or GeoRSS) are normalized into [`report::Report`]s,
//! joined to stored incidents by a stable key, deduplicated by content hash,
//! and merged; incidents missing from a completed snapshot are retired.

pub mod config;
pub mod error;
pub mod feed;
pub mod reconcile;
pub mod report;
pub mod scheduler;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::SyncConfig;
pub use crate::error::{BatchError, EntryError, StoreError};
pub use crate::reconcile::{BatchSummary, ReconciliationEngine};
pub use crate::report::{Geometry, IncidentKey, Report};
pub use crate::store::{MemoryStore, PersistenceGateway, SqliteStore};
