// src/scheduler.rs
use anyhow::{Context, Result};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::feed::{self, types::FeedSource};
use crate::reconcile::{BatchSummary, ReconciliationEngine};
use crate::store::PersistenceGateway;

/// What one tick did, per fetched document.
#[derive(Debug, Default)]
pub struct TickReport {
    pub batches: Vec<(String, BatchSummary)>,
    /// Documents that could not be decoded (origin, error).
    pub undecodable: Vec<(String, String)>,
}

/// Fetch every available document and reconcile each as its own batch, in order.
///
/// Undecodable documents are skipped. A store failure stops the tick and is
/// returned; the next tick starts over.
pub async fn run_once<S: PersistenceGateway>(
    source: &dyn FeedSource,
    engine: &ReconciliationEngine<S>,
) -> Result<TickReport> {
    let docs = source
        .fetch_latest()
        .await
        .with_context(|| format!("fetching from {} source", source.name()))?;

    let mut report = TickReport::default();
    for doc in docs {
        let entries = match feed::parse_document(&doc) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = ?e, origin = %doc.origin, "skipping undecodable feed document");
                counter!("feed_decode_errors_total").increment(1);
                report.undecodable.push((doc.origin, format!("{e:#}")));
                continue;
            }
        };
        let summary = engine
            .run_batch(entries)
            .await
            .with_context(|| format!("reconciling {}", doc.origin))?;
        tracing::info!(
            target: "sync",
            origin = %doc.origin,
            summary = %serde_json::to_string(&summary).unwrap_or_default(),
            "document imported"
        );
        report.batches.push((doc.origin, summary));
    }
    Ok(report)
}

/// Tick forever at `interval`. Failed ticks are logged and retried on the next one.
pub fn spawn_scheduler<S>(
    interval: Duration,
    source: Arc<dyn FeedSource>,
    engine: Arc<ReconciliationEngine<S>>,
) -> JoinHandle<()>
where
    S: PersistenceGateway + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            counter!("sync_ticks_total").increment(1);

            match run_once(source.as_ref(), &*engine).await {
                Ok(r) => tracing::info!(
                    target: "sync",
                    batches = r.batches.len(),
                    undecodable = r.undecodable.len(),
                    "tick complete"
                ),
                Err(e) => {
                    counter!("sync_tick_failures_total").increment(1);
                    let msg = format!("{e:#}");
                    tracing::warn!(target: "sync", error = %msg, "tick failed; retrying next interval");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::sources::LocationSource;
    use crate::report::{FeatureNormalizer, IncidentKey};
    use crate::store::MemoryStore;

    const FEED: &str = r#"{"type":"FeatureCollection","features":[{
        "type":"Feature",
        "properties":{"title":"Turners Road","guid":"tag:www.rfs.nsw.gov.au,2013-11-02:80707",
                      "pubDate":"2013/10/31 00:00:00+00","description":"STATUS: going"},
        "geometry":{"type":"Point","coordinates":[151.4124,-32.9768]}}]}"#;

    #[tokio::test]
    async fn run_once_imports_and_skips_garbage() {
        let engine = ReconciliationEngine::new(MemoryStore::new(), FeatureNormalizer::default());

        let good = LocationSource::from_body("good", FEED);
        let r = run_once(&good, &engine).await.unwrap();
        assert_eq!(r.batches.len(), 1);
        assert_eq!(r.batches[0].1.incidents_created, 1);

        let bad = LocationSource::from_body("bad", "{ nope");
        let r = run_once(&bad, &engine).await.unwrap();
        assert!(r.batches.is_empty());
        assert_eq!(r.undecodable.len(), 1);
        assert_eq!(engine.store().incidents().len(), 1);
    }

    #[tokio::test]
    async fn error_bodies_never_retire_live_incidents() {
        let engine = ReconciliationEngine::new(MemoryStore::new(), FeatureNormalizer::default());
        let good = LocationSource::from_body("good", FEED);
        run_once(&good, &engine).await.unwrap();

        for body in [
            r#"{"message":"rate limited"}"#,
            "<Error><Code>AccessDenied</Code></Error>",
        ] {
            let src = LocationSource::from_body("upstream", body);
            let r = run_once(&src, &engine).await.unwrap();
            assert!(r.batches.is_empty(), "{body} was imported as a batch");
            assert_eq!(r.undecodable.len(), 1);

            let inc = engine.store().incident(IncidentKey(80707)).unwrap();
            assert!(inc.is_current, "{body} retired the incident");
        }
    }

    #[tokio::test]
    async fn store_outage_fails_the_tick() {
        let engine = ReconciliationEngine::new(MemoryStore::new(), FeatureNormalizer::default());
        engine.store().fail_after(0);
        let src = LocationSource::from_body("good", FEED);
        assert!(run_once(&src, &engine).await.is_err());
    }

    #[tokio::test]
    async fn scheduler_ticks_repeatedly() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(ReconciliationEngine::new(
            Arc::clone(&store),
            FeatureNormalizer::default(),
        ));
        let source: Arc<dyn FeedSource> = Arc::new(LocationSource::from_body("good", FEED));

        let handle = spawn_scheduler(Duration::from_millis(10), source, engine);
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.incidents().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        // A few more ticks over the same snapshot change nothing.
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert_eq!(store.incidents().len(), 1);
        assert_eq!(store.report_count(), 1);
    }
}
