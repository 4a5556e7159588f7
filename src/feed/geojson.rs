// src/feed/geojson.rs
use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::feed::types::RawEntry;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<RawEntry>,
}

/// `FeatureCollection.features[]` → raw entries. Geometry payloads are kept
/// untyped so a bad feature fails on its own later instead of failing the file.
///
/// Anything that is not a FeatureCollection with a `features` array (an error
/// body, say) is rejected rather than read as an empty snapshot.
pub fn parse_feature_collection(s: &str) -> Result<Vec<RawEntry>> {
    let fc: FeatureCollection =
        serde_json::from_str(s).context("parsing geojson feature collection")?;
    if fc.kind != "FeatureCollection" {
        bail!("geojson document is a {:?}, not a FeatureCollection", fc.kind);
    }
    Ok(fc.features)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "type": "FeatureCollection",
      "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:OGC:1.3:CRS84" } },
      "features": [{
        "type": "Feature",
        "properties": {
          "title": "Turners Road",
          "link": "http:\/\/www.rfs.nsw.gov.au\/dsp_content.cfm?cat_id=683",
          "category": "Advice",
          "guid": "tag:www.rfs.nsw.gov.au,2013-11-02:80707",
          "guid_isPermaLink": "false",
          "pubDate": "2013\/10\/31 00:00:00+00",
          "description": "ALERT LEVEL: Advice<br />STATUS: under control"
        },
        "geometry": { "type": "Polygon", "coordinates": [ [ [ 151.4124, -32.9768 ] ] ] }
      }, {
        "type": "Feature",
        "properties": { "guid": "tag:x,2013-11-02:1" },
        "geometry": { "type": "Hexagon", "coordinates": [] }
      }]
    }"#;

    #[test]
    fn reads_features_without_judging_geometry() {
        let entries = parse_feature_collection(SAMPLE).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].properties.title, "Turners Road");
        assert_eq!(entries[0].properties.pub_date, "2013/10/31 00:00:00+00");
        assert_eq!(entries[0].geometry.as_ref().unwrap().kind, "Polygon");
        assert_eq!(entries[1].geometry.as_ref().unwrap().kind, "Hexagon");
        assert_eq!(entries[1].properties.title, "");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feature_collection("{ not json").is_err());
    }

    #[test]
    fn non_feed_json_is_an_error() {
        assert!(parse_feature_collection(r#"{"message":"rate limited"}"#).is_err());
        assert!(parse_feature_collection(r#"{"type":"FeatureCollection"}"#).is_err());
        assert!(parse_feature_collection(r#"{"type":"Feature","features":[]}"#).is_err());
        assert!(parse_feature_collection("[]").is_err());
        assert!(parse_feature_collection(r#"{"type":"FeatureCollection","features":[]}"#)
            .unwrap()
            .is_empty());
    }
}
