// src/reconcile/pipeline.rs
//! Transform stage: raw entries → resolved reports, in parallel, feed order kept.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::EntryError;
use crate::feed::types::RawEntry;
use crate::report::identity::resolve_incident_key;
use crate::report::{FeatureNormalizer, IncidentKey, Report};

/// Result of the pure per-entry transform.
#[derive(Debug, Clone)]
pub enum Transformed {
    Ready {
        index: usize,
        key: IncidentKey,
        report: Box<Report>,
    },
    Skipped {
        index: usize,
        /// Set when identity resolved but the content did not normalize.
        key: Option<IncidentKey>,
        external_id: String,
        title: String,
        error: EntryError,
    },
}

/// Identity first, then content. Never touches the store.
pub fn transform(normalizer: &FeatureNormalizer, index: usize, entry: &RawEntry) -> Transformed {
    let skipped = |key, error| Transformed::Skipped {
        index,
        key,
        external_id: entry.properties.guid.trim().to_string(),
        title: entry.properties.title.trim().to_string(),
        error,
    };

    let key = match resolve_incident_key(&entry.properties.guid) {
        Ok(k) => k,
        Err(e) => return skipped(None, e),
    };
    match normalizer.normalize(entry) {
        Ok(report) => Transformed::Ready {
            index,
            key,
            report: Box::new(report),
        },
        Err(e) => skipped(Some(key), e),
    }
}

/// Spawn the transform stage. Up to `workers` entries are normalized at once
/// on the blocking pool; results are sent in feed order into a channel of
/// `capacity`. The handle yields `Err` if a transform task died.
pub fn spawn_transform_stage(
    normalizer: Arc<FeatureNormalizer>,
    entries: Vec<RawEntry>,
    workers: usize,
    capacity: usize,
) -> (mpsc::Receiver<Transformed>, JoinHandle<Result<(), String>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut results = stream::iter(entries.into_iter().enumerate())
            .map(|(index, entry)| {
                let n = Arc::clone(&normalizer);
                tokio::task::spawn_blocking(move || transform(&n, index, &entry))
            })
            .buffered(workers.max(1));

        while let Some(joined) = results.next().await {
            let item = joined.map_err(|e| format!("transform task failed: {e}"))?;
            if tx.send(item).await.is_err() {
                // Merge stage stopped; nothing left to deliver to.
                break;
            }
        }
        Ok::<(), String>(())
    });

    (rx, handle)
}
