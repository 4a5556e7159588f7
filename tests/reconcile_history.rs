// tests/reconcile_history.rs
use incident_feed_sync::feed::types::{RawEntry, RawGeometry, RawProperties};
use incident_feed_sync::report::FeatureNormalizer;
use incident_feed_sync::{IncidentKey, MemoryStore, ReconciliationEngine};
use serde_json::json;
use std::sync::Arc;

fn entry(id: i64, pub_date: &str, status: &str) -> RawEntry {
    RawEntry {
        properties: RawProperties {
            title: format!("Incident {id}"),
            category: "Advice".into(),
            guid: format!("tag:www.rfs.nsw.gov.au,2013-11-02:{id}"),
            pub_date: pub_date.into(),
            description: format!("ALERT LEVEL: Advice<br />STATUS: {status}"),
            ..Default::default()
        },
        geometry: Some(RawGeometry::new("Point", json!([151.0, -33.0]))),
    }
}

fn engine() -> ReconciliationEngine<Arc<MemoryStore>> {
    ReconciliationEngine::new(Arc::new(MemoryStore::new()), FeatureNormalizer::default())
        .with_concurrency(4, 8)
}

#[tokio::test]
async fn sweep_retires_only_untouched_incidents() {
    let e = engine();
    let first = e
        .run_batch(vec![
            entry(1, "2013/10/31 00:00:00+00", "going"),
            entry(2, "2013/10/31 00:00:00+00", "going"),
            entry(3, "2013/10/31 00:00:00+00", "going"),
        ])
        .await
        .unwrap();
    assert_eq!(first.incidents_created, 3);
    assert!(e.store().incidents().iter().all(|i| i.is_current));

    let second = e
        .run_batch(vec![
            entry(1, "2013/10/31 00:00:00+00", "going"),
            entry(3, "2013/10/31 00:00:00+00", "going"),
        ])
        .await
        .unwrap();
    assert_eq!(second.incidents_retired, 1);

    assert!(e.store().incident(IncidentKey(1)).unwrap().is_current);
    assert!(!e.store().incident(IncidentKey(2)).unwrap().is_current);
    assert!(e.store().incident(IncidentKey(3)).unwrap().is_current);
}

#[tokio::test]
async fn identical_batch_twice_is_idempotent() {
    let e = engine();
    let batch = || {
        vec![
            entry(10, "2013/10/31 00:00:00+00", "going"),
            entry(11, "2013/10/31 02:00:00+00", "contained"),
        ]
    };
    e.run_batch(batch()).await.unwrap();
    let before = e.store().incidents();
    let reports_before = e.store().report_count();

    let again = e.run_batch(batch()).await.unwrap();
    assert_eq!(again.reports_inserted, 0);
    assert_eq!(again.reports_unchanged, 2);
    assert_eq!(again.incidents_created, 0);
    assert_eq!(again.incidents_retired, 0);
    assert_eq!(e.store().report_count(), reports_before);
    assert_eq!(e.store().incidents(), before);
}

#[tokio::test]
async fn validity_upper_bound_never_shrinks() {
    let e = engine();
    e.run_batch(vec![entry(7, "2013/10/31 10:00:00+00", "going")])
        .await
        .unwrap();
    e.run_batch(vec![entry(7, "2013/10/31 12:00:00+00", "contained")])
        .await
        .unwrap();
    let s = e
        .run_batch(vec![entry(7, "2013/10/31 11:00:00+00", "patrol")])
        .await
        .unwrap();
    assert_eq!(s.reports_inserted, 1);

    let inc = e.store().incident(IncidentKey(7)).unwrap();
    assert_eq!(inc.validity.from.to_rfc3339(), "2013-10-31T10:00:00+00:00");
    assert_eq!(inc.validity.to.to_rfc3339(), "2013-10-31T12:00:00+00:00");
    assert_eq!(e.store().reports(IncidentKey(7)).len(), 3);
}

#[tokio::test]
async fn retired_incident_comes_back_under_the_same_storage_id() {
    let e = engine();
    e.run_batch(vec![entry(5, "2013/10/31 00:00:00+00", "going")])
        .await
        .unwrap();
    let original = e.store().incident(IncidentKey(5)).unwrap();

    e.run_batch(vec![entry(6, "2013/10/31 00:00:00+00", "going")])
        .await
        .unwrap();
    assert!(!e.store().incident(IncidentKey(5)).unwrap().is_current);

    let back = e
        .run_batch(vec![entry(5, "2013/11/01 00:00:00+00", "going")])
        .await
        .unwrap();
    assert_eq!(back.incidents_created, 0);

    let revived = e.store().incident(IncidentKey(5)).unwrap();
    assert!(revived.is_current);
    assert_eq!(revived.storage_id, original.storage_id);
}

#[tokio::test]
async fn bad_entries_are_reported_and_the_batch_goes_on() {
    let e = engine();
    let mut no_key = entry(0, "2013/10/31 00:00:00+00", "going");
    no_key.properties.guid = "tag:www.rfs.nsw.gov.au,2013-11-02:".into();
    let mut bad_date = entry(21, "yesterday-ish", "going");
    bad_date.properties.title = "Bad date".into();

    let s = e
        .run_batch(vec![
            entry(20, "2013/10/31 00:00:00+00", "going"),
            no_key,
            bad_date,
            entry(22, "2013/10/31 00:00:00+00", "going"),
        ])
        .await
        .unwrap();

    assert_eq!(s.entries_seen, 4);
    assert_eq!(s.incidents_created, 2);
    assert_eq!(
        s.skipped_by_kind(),
        vec![("date_parse_failure", 1), ("malformed_identifier", 1)]
    );
    let indexes: Vec<_> = s.skipped.iter().map(|k| k.index).collect();
    assert_eq!(indexes, [1, 2]);
    assert!(e.store().incident(IncidentKey(21)).is_none());
}
