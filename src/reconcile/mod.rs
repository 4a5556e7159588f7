// src/reconcile/mod.rs
//! # Reconciliation Engine
//! Merges one feed snapshot into the incident history.
//!
//! Per incident: `Absent → Created → Updated* → Retired`. The transform stage
//! runs in parallel; the merge stage is the only writer and applies results
//! in feed order. The end-of-batch sweep runs only after every entry has been
//! merged, so an aborted batch leaves currency exactly as the last good batch
//! left it.

pub mod pipeline;
pub mod summary;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{BatchError, StoreError};
use crate::feed::types::RawEntry;
use crate::report::fingerprint::{classify, Novelty};
use crate::report::{FeatureNormalizer, IncidentKey, Report};
use crate::store::{PersistenceGateway, StorageId};

use pipeline::{spawn_transform_stage, Transformed};
pub use summary::{BatchSummary, SkippedEntry};

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("reconcile_entries_total", "Feed entries offered to the engine.");
        describe_counter!(
            "reconcile_reports_inserted_total",
            "Reports persisted because their content was new."
        );
        describe_counter!(
            "reconcile_incidents_created_total",
            "Incidents seen for the first time."
        );
        describe_counter!(
            "reconcile_incidents_retired_total",
            "Incidents demoted to not-current by the sweep."
        );
        describe_counter!(
            "reconcile_entries_skipped_total",
            "Entries skipped because they could not be resolved or normalized."
        );
        describe_counter!(
            "reconcile_batches_aborted_total",
            "Batches aborted before the sweep."
        );
        describe_gauge!(
            "reconcile_last_batch_ts",
            "Unix ts of the last batch that completed its sweep."
        );
    });
}

/// Merge-stage bookkeeping for one batch.
#[derive(Debug, Default)]
struct BatchState {
    touched: HashSet<StorageId>,
    summary: BatchSummary,
}

pub struct ReconciliationEngine<S> {
    store: S,
    normalizer: Arc<FeatureNormalizer>,
    workers: usize,
    queue_capacity: usize,
}

impl<S: PersistenceGateway> ReconciliationEngine<S> {
    pub fn new(store: S, normalizer: FeatureNormalizer) -> Self {
        Self {
            store,
            normalizer: Arc::new(normalizer),
            workers: 4,
            queue_capacity: 64,
        }
    }

    pub fn from_config(store: S, cfg: &SyncConfig) -> anyhow::Result<Self> {
        Ok(Self::new(store, cfg.normalizer()?)
            .with_concurrency(cfg.transform_workers, cfg.queue_capacity))
    }

    pub fn with_concurrency(mut self, workers: usize, queue_capacity: usize) -> Self {
        self.workers = workers.max(1);
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile one feed snapshot, then sweep. On `Err` the sweep did not run.
    pub async fn run_batch(&self, entries: Vec<RawEntry>) -> Result<BatchSummary, BatchError> {
        ensure_metrics_described();

        let (mut rx, producer) = spawn_transform_stage(
            Arc::clone(&self.normalizer),
            entries,
            self.workers,
            self.queue_capacity,
        );

        let mut state = BatchState::default();
        while let Some(item) = rx.recv().await {
            if let Err(e) = self.merge(item, &mut state).await {
                rx.close();
                producer.abort();
                return Err(self.abort(e.into(), &state));
            }
        }

        match producer.await {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => return Err(self.abort(BatchError::Pipeline(msg), &state)),
            Err(join) => return Err(self.abort(BatchError::Pipeline(join.to_string()), &state)),
        }

        let retired = match self.store.mark_not_current_except(&state.touched).await {
            Ok(n) => n,
            Err(e) => return Err(self.abort(e.into(), &state)),
        };
        state.summary.incidents_retired = retired;

        let s = &state.summary;
        counter!("reconcile_entries_total").increment(s.entries_seen as u64);
        counter!("reconcile_reports_inserted_total").increment(s.reports_inserted as u64);
        counter!("reconcile_incidents_created_total").increment(s.incidents_created as u64);
        counter!("reconcile_incidents_retired_total").increment(retired);
        counter!("reconcile_entries_skipped_total").increment(s.skipped.len() as u64);
        gauge!("reconcile_last_batch_ts").set(chrono::Utc::now().timestamp() as f64);

        info!(
            target: "reconcile",
            entries = s.entries_seen,
            inserted = s.reports_inserted,
            unchanged = s.reports_unchanged,
            created = s.incidents_created,
            retired,
            skipped = s.skipped.len(),
            "batch reconciled"
        );
        Ok(state.summary)
    }

    fn abort(&self, err: BatchError, state: &BatchState) -> BatchError {
        counter!("reconcile_batches_aborted_total").increment(1);
        warn!(
            target: "reconcile",
            error = %err,
            merged = state.summary.entries_seen,
            "batch aborted; sweep skipped"
        );
        err
    }

    async fn merge(&self, item: Transformed, state: &mut BatchState) -> Result<(), StoreError> {
        state.summary.entries_seen += 1;
        match item {
            Transformed::Ready { index, key, report } => {
                self.apply_report(index, key, &report, state).await
            }
            Transformed::Skipped {
                index,
                key,
                external_id,
                title,
                error,
            } => {
                warn!(
                    target: "reconcile",
                    index,
                    %external_id,
                    %title,
                    reason = %error,
                    "skipping feed entry"
                );
                state
                    .summary
                    .skipped
                    .push(SkippedEntry::new(index, &external_id, &error));

                // A known incident with unreadable content is still present in the feed.
                if let Some(key) = key {
                    if let Some(existing) = self.store.lookup_incident_by_key(key).await? {
                        if !existing.is_current {
                            self.store.set_incident_current(existing.storage_id).await?;
                        }
                        state.touched.insert(existing.storage_id);
                    }
                }
                Ok(())
            }
        }
    }

    async fn apply_report(
        &self,
        index: usize,
        key: IncidentKey,
        report: &Report,
        state: &mut BatchState,
    ) -> Result<(), StoreError> {
        let Some(existing) = self.store.lookup_incident_by_key(key).await? else {
            let id = self.store.create_incident(key, report).await?;
            state.touched.insert(id);
            state.summary.incidents_created += 1;
            state.summary.reports_inserted += 1;
            debug!(target: "reconcile", index, %key, storage_id = %id, "incident created");
            return Ok(());
        };

        let id = existing.storage_id;
        state.touched.insert(id);
        if !existing.is_current {
            self.store.set_incident_current(id).await?;
            debug!(target: "reconcile", %key, storage_id = %id, "incident current again");
        }

        let prior = self.store.lookup_report_hash(id, &report.content_hash).await?;
        match classify(prior) {
            Novelty::Unchanged => {
                state.summary.reports_unchanged += 1;
            }
            Novelty::Changed => {
                self.store.insert_report(id, report).await?;
                state.summary.reports_inserted += 1;
                if report.published_at > existing.validity.to {
                    self.store
                        .extend_incident_validity_upper(id, report.published_at)
                        .await?;
                }
                debug!(target: "reconcile", index, %key, storage_id = %id, "report appended");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{RawGeometry, RawProperties};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn entry(id: i64, pub_date: &str, status: &str) -> RawEntry {
        RawEntry {
            properties: RawProperties {
                title: format!("Incident {id}"),
                guid: format!("tag:www.rfs.nsw.gov.au,2013-11-02:{id}"),
                pub_date: pub_date.into(),
                description: format!("STATUS: {status}"),
                ..Default::default()
            },
            geometry: Some(RawGeometry::new("Point", json!([151.0, -33.0]))),
        }
    }

    fn engine() -> ReconciliationEngine<Arc<MemoryStore>> {
        ReconciliationEngine::new(Arc::new(MemoryStore::new()), FeatureNormalizer::default())
            .with_concurrency(2, 2)
    }

    #[tokio::test]
    async fn two_reports_for_one_incident_in_one_batch() {
        let e = engine();
        let s = e
            .run_batch(vec![
                entry(1, "2013/10/31 00:00:00+00", "going"),
                entry(1, "2013/10/31 06:00:00+00", "contained"),
            ])
            .await
            .unwrap();
        assert_eq!(s.incidents_created, 1);
        assert_eq!(s.reports_inserted, 2);

        let reports = e.store().reports(IncidentKey(1));
        let statuses: Vec<_> = reports.iter().map(|r| r.status().unwrap()).collect();
        assert_eq!(statuses, ["going", "contained"]);
    }

    #[tokio::test]
    async fn failed_batch_does_not_sweep() {
        let e = engine();
        e.run_batch(vec![entry(1, "2013/10/31 00:00:00+00", "going")])
            .await
            .unwrap();

        // Only the first lookup succeeds.
        e.store().fail_after(1);
        let err = e
            .run_batch(vec![
                entry(2, "2013/11/01 00:00:00+00", "going"),
                entry(3, "2013/11/01 00:00:00+00", "going"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Store(StoreError::StoreUnavailable(_))));

        e.store().recover();
        assert!(e.store().incident(IncidentKey(1)).unwrap().is_current);
    }

    #[tokio::test]
    async fn outage_never_leaves_an_incident_without_reports() {
        // Budgets land the failure on each gateway call of a new incident.
        for budget in 0..4 {
            let e = engine();
            e.store().fail_after(budget);
            let _ = e
                .run_batch(vec![
                    entry(1, "2013/10/31 00:00:00+00", "going"),
                    entry(2, "2013/10/31 00:00:00+00", "going"),
                ])
                .await;
            e.store().recover();

            for inc in e.store().incidents() {
                assert!(
                    !e.store().reports(inc.key).is_empty(),
                    "budget {budget} left incident {} without a report",
                    inc.key
                );
            }
        }
    }

    #[tokio::test]
    async fn second_write_failure_rolls_back_the_new_incident() {
        let e = engine();
        // lookup(1), create(1), then lookup(2) fails.
        e.store().fail_after(2);
        assert!(e
            .run_batch(vec![
                entry(1, "2013/10/31 00:00:00+00", "going"),
                entry(2, "2013/10/31 00:00:00+00", "going"),
            ])
            .await
            .is_err());
        e.store().recover();

        assert_eq!(e.store().incidents().len(), 1);
        assert_eq!(e.store().reports(IncidentKey(1)).len(), 1);
        assert!(e.store().incident(IncidentKey(2)).is_none());
    }

    #[tokio::test]
    async fn unreadable_entry_keeps_known_incident_current() {
        let e = engine();
        e.run_batch(vec![entry(1, "2013/10/31 00:00:00+00", "going")])
            .await
            .unwrap();

        let mut broken = entry(1, "2013/10/31 06:00:00+00", "going");
        broken.geometry = Some(RawGeometry::new("Hexagon", json!([])));
        let s = e.run_batch(vec![broken]).await.unwrap();

        assert_eq!(s.skipped_count(), 1);
        assert_eq!(s.incidents_retired, 0);
        assert!(e.store().incident(IncidentKey(1)).unwrap().is_current);
    }
}
