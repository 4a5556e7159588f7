// src/store/mod.rs
//! Persistence gateway consumed by the reconciliation engine.
//!
//! The engine only needs the handful of lookups and commands below; any
//! durable store that can answer them will do.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::report::{ContentHash, IncidentKey, Report};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Assigned once when an incident is first persisted; never changes.
pub type StorageId = Uuid;
pub type ReportId = Uuid;

/// Closed interval `[from, to]` of publish times an incident has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Validity {
    pub fn at(t: DateTime<Utc>) -> Self {
        Self { from: t, to: t }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentRecord {
    pub storage_id: StorageId,
    pub key: IncidentKey,
    pub is_current: bool,
    pub validity: Validity,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn lookup_incident_by_key(
        &self,
        key: IncidentKey,
    ) -> Result<Option<IncidentRecord>, StoreError>;

    /// New incidents start current with validity `[first_seen, first_seen]`.
    /// Fails with `DuplicateInsertAttempted` if `key` already has a storage id.
    async fn insert_incident(
        &self,
        key: IncidentKey,
        first_seen: DateTime<Utc>,
    ) -> Result<StorageId, StoreError>;

    /// Insert a new incident together with its first report, all or nothing.
    /// The incident starts current with validity `[first.published_at, first.published_at]`.
    /// Fails with `DuplicateInsertAttempted` if `key` already has a storage id.
    async fn create_incident(
        &self,
        key: IncidentKey,
        first: &Report,
    ) -> Result<StorageId, StoreError>;

    /// Idempotent.
    async fn set_incident_current(&self, id: StorageId) -> Result<(), StoreError>;

    /// No-op when `new_upper` is not after the current upper bound.
    async fn extend_incident_validity_upper(
        &self,
        id: StorageId,
        new_upper: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Whether any stored report of the incident carries `hash`.
    async fn lookup_report_hash(
        &self,
        id: StorageId,
        hash: &ContentHash,
    ) -> Result<bool, StoreError>;

    async fn insert_report(&self, id: StorageId, report: &Report) -> Result<ReportId, StoreError>;

    /// Demote every current incident whose id is not in `keep`, in one
    /// operation. Returns how many were demoted.
    async fn mark_not_current_except(&self, keep: &HashSet<StorageId>) -> Result<u64, StoreError>;
}

#[async_trait]
impl<T: PersistenceGateway + ?Sized> PersistenceGateway for Arc<T> {
    async fn lookup_incident_by_key(
        &self,
        key: IncidentKey,
    ) -> Result<Option<IncidentRecord>, StoreError> {
        (**self).lookup_incident_by_key(key).await
    }

    async fn insert_incident(
        &self,
        key: IncidentKey,
        first_seen: DateTime<Utc>,
    ) -> Result<StorageId, StoreError> {
        (**self).insert_incident(key, first_seen).await
    }

    async fn create_incident(
        &self,
        key: IncidentKey,
        first: &Report,
    ) -> Result<StorageId, StoreError> {
        (**self).create_incident(key, first).await
    }

    async fn set_incident_current(&self, id: StorageId) -> Result<(), StoreError> {
        (**self).set_incident_current(id).await
    }

    async fn extend_incident_validity_upper(
        &self,
        id: StorageId,
        new_upper: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).extend_incident_validity_upper(id, new_upper).await
    }

    async fn lookup_report_hash(
        &self,
        id: StorageId,
        hash: &ContentHash,
    ) -> Result<bool, StoreError> {
        (**self).lookup_report_hash(id, hash).await
    }

    async fn insert_report(&self, id: StorageId, report: &Report) -> Result<ReportId, StoreError> {
        (**self).insert_report(id, report).await
    }

    async fn mark_not_current_except(&self, keep: &HashSet<StorageId>) -> Result<u64, StoreError> {
        (**self).mark_not_current_except(keep).await
    }
}
