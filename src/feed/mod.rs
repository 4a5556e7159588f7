// src/feed/mod.rs
pub mod geojson;
pub mod georss;
pub mod sources;
pub mod types;

use anyhow::Result;
use metrics::{counter, histogram};

use crate::feed::types::{FeedDocument, RawEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    GeoJson,
    GeoRss,
}

/// First non-whitespace byte `<` means XML; anything else is treated as GeoJSON.
pub fn sniff_format(body: &str) -> FeedFormat {
    let body = body.trim_start_matches('\u{feff}');
    match body.trim_start().as_bytes().first() {
        Some(b'<') => FeedFormat::GeoRss,
        _ => FeedFormat::GeoJson,
    }
}

/// Decode one fetched document into raw entries.
pub fn parse_document(doc: &FeedDocument) -> Result<Vec<RawEntry>> {
    let t0 = std::time::Instant::now();
    let format = sniff_format(&doc.body);
    let entries = match format {
        FeedFormat::GeoJson => geojson::parse_feature_collection(&doc.body)?,
        FeedFormat::GeoRss => georss::parse_georss(&doc.body)?,
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_entries_total").increment(entries.len() as u64);
    tracing::debug!(
        target: "feed",
        origin = %doc.origin,
        ?format,
        entries = entries.len(),
        "feed document decoded"
    );
    Ok(entries)
}
