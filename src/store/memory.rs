// src/store/memory.rs
//! In-memory gateway for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{IncidentRecord, PersistenceGateway, ReportId, StorageId, Validity};
use crate::error::StoreError;
use crate::report::{ContentHash, IncidentKey, Report};

#[derive(Debug, Clone)]
struct StoredReport {
    storage_id: StorageId,
    report: Report,
}

#[derive(Debug, Default)]
struct Inner {
    incidents: HashMap<StorageId, IncidentRecord>,
    by_key: HashMap<IncidentKey, StorageId>,
    // Insertion order is arrival order.
    reports: Vec<StoredReport>,
    // Simulated outage: remaining successful calls before every call fails.
    budget: Option<usize>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// After `ops` more gateway calls, every call fails with `StoreUnavailable`.
    pub fn fail_after(&self, ops: usize) {
        if let Ok(mut g) = self.inner.lock() {
            g.budget = Some(ops);
        }
    }

    pub fn recover(&self) {
        if let Ok(mut g) = self.inner.lock() {
            g.budget = None;
        }
    }

    pub fn incident(&self, key: IncidentKey) -> Option<IncidentRecord> {
        let g = self.inner.lock().ok()?;
        g.by_key.get(&key).and_then(|id| g.incidents.get(id)).cloned()
    }

    /// All incidents ordered by key.
    pub fn incidents(&self) -> Vec<IncidentRecord> {
        let Ok(g) = self.inner.lock() else {
            return Vec::new();
        };
        let mut v: Vec<_> = g.incidents.values().cloned().collect();
        v.sort_by_key(|i| i.key);
        v
    }

    /// Reports of one incident in arrival order.
    pub fn reports(&self, key: IncidentKey) -> Vec<Report> {
        let Ok(g) = self.inner.lock() else {
            return Vec::new();
        };
        let Some(id) = g.by_key.get(&key).copied() else {
            return Vec::new();
        };
        g.reports
            .iter()
            .filter(|r| r.storage_id == id)
            .map(|r| r.report.clone())
            .collect()
    }

    pub fn report_count(&self) -> usize {
        self.inner.lock().map(|g| g.reports.len()).unwrap_or(0)
    }

    fn guard(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|_| StoreError::StoreUnavailable("memory store lock poisoned".into()))?;
        let budget = g.budget;
        match budget {
            Some(0) => Err(StoreError::StoreUnavailable("simulated outage".into())),
            Some(n) => {
                g.budget = Some(n - 1);
                Ok(g)
            }
            None => Ok(g),
        }
    }
}

fn add_incident(
    g: &mut Inner,
    key: IncidentKey,
    first_seen: DateTime<Utc>,
) -> Result<StorageId, StoreError> {
    if let Some(existing) = g.by_key.get(&key) {
        return Err(StoreError::DuplicateInsertAttempted {
            key: key.0,
            storage_id: existing.to_string(),
        });
    }
    let id = Uuid::new_v4();
    g.by_key.insert(key, id);
    g.incidents.insert(
        id,
        IncidentRecord {
            storage_id: id,
            key,
            is_current: true,
            validity: Validity::at(first_seen),
        },
    );
    Ok(id)
}

fn incident_mut(g: &mut Inner, id: StorageId) -> Result<&mut IncidentRecord, StoreError> {
    g.incidents
        .get_mut(&id)
        .ok_or_else(|| StoreError::UnknownIncident(id.to_string()))
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn lookup_incident_by_key(
        &self,
        key: IncidentKey,
    ) -> Result<Option<IncidentRecord>, StoreError> {
        let g = self.guard()?;
        Ok(g.by_key.get(&key).and_then(|id| g.incidents.get(id)).cloned())
    }

    async fn insert_incident(
        &self,
        key: IncidentKey,
        first_seen: DateTime<Utc>,
    ) -> Result<StorageId, StoreError> {
        let mut g = self.guard()?;
        add_incident(&mut g, key, first_seen)
    }

    async fn create_incident(
        &self,
        key: IncidentKey,
        first: &Report,
    ) -> Result<StorageId, StoreError> {
        // One lock hold and one budget unit: both rows land or neither does.
        let mut g = self.guard()?;
        let id = add_incident(&mut g, key, first.published_at)?;
        g.reports.push(StoredReport {
            storage_id: id,
            report: first.clone(),
        });
        Ok(id)
    }

    async fn set_incident_current(&self, id: StorageId) -> Result<(), StoreError> {
        let mut g = self.guard()?;
        incident_mut(&mut g, id)?.is_current = true;
        Ok(())
    }

    async fn extend_incident_validity_upper(
        &self,
        id: StorageId,
        new_upper: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut g = self.guard()?;
        let inc = incident_mut(&mut g, id)?;
        if new_upper > inc.validity.to {
            inc.validity.to = new_upper;
        }
        Ok(())
    }

    async fn lookup_report_hash(
        &self,
        id: StorageId,
        hash: &ContentHash,
    ) -> Result<bool, StoreError> {
        let g = self.guard()?;
        Ok(g
            .reports
            .iter()
            .any(|r| r.storage_id == id && &r.report.content_hash == hash))
    }

    async fn insert_report(&self, id: StorageId, report: &Report) -> Result<ReportId, StoreError> {
        let mut g = self.guard()?;
        incident_mut(&mut g, id)?;
        g.reports.push(StoredReport {
            storage_id: id,
            report: report.clone(),
        });
        Ok(Uuid::new_v4())
    }

    async fn mark_not_current_except(&self, keep: &HashSet<StorageId>) -> Result<u64, StoreError> {
        let mut g = self.guard()?;
        let mut demoted = 0u64;
        for inc in g.incidents.values_mut() {
            if inc.is_current && !keep.contains(&inc.storage_id) {
                inc.is_current = false;
                demoted += 1;
            }
        }
        Ok(demoted)
    }
}
