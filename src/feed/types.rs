// src/feed/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Geometry exactly as the feed carried it; the type tag is not yet trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: serde_json::Value,
    #[serde(default)]
    pub geometries: Vec<RawGeometry>,
}

impl RawGeometry {
    pub fn new(kind: &str, coordinates: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            coordinates,
            geometries: Vec::new(),
        }
    }

    pub fn collection(geometries: Vec<RawGeometry>) -> Self {
        Self {
            kind: "GeometryCollection".to_string(),
            coordinates: serde_json::Value::Null,
            geometries,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProperties {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub guid: String,
    #[serde(default, rename = "pubDate")]
    pub pub_date: String,
    #[serde(default)]
    pub description: String,
}

/// One feed entry, format-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub properties: RawProperties,
    #[serde(default)]
    pub geometry: Option<RawGeometry>,
}

/// A fetched feed body plus where it came from (URL or file path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub origin: String,
    pub body: String,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Every document currently available, in import order.
    async fn fetch_latest(&self) -> Result<Vec<FeedDocument>>;
    fn name(&self) -> &str;
}
