//! Content hashing for change detection.
//!
//! The digest covers geometry and every textual property of a report, and
//! nothing that depends on when the feed was fetched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Write as _};

use super::{Attributes, Geometry, Report};

/// Lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Field order here is the canonical serialization order.
#[derive(Serialize)]
struct Canonical<'a> {
    external_id: &'a str,
    title: &'a str,
    category: &'a str,
    link: &'a str,
    published_at: &'a DateTime<Utc>,
    description: &'a str,
    attributes: &'a Attributes,
    geometry: &'a Geometry,
}

pub fn content_hash(report: &Report) -> ContentHash {
    let canonical = Canonical {
        external_id: &report.external_id,
        title: &report.title,
        category: &report.category,
        link: &report.link,
        published_at: &report.published_at,
        description: &report.description_raw,
        attributes: &report.attributes,
        geometry: &report.geometry,
    };
    // Strings, floats (non-finite ones become null), and a String-keyed map.
    let bytes =
        serde_json::to_vec(&canonical).expect("canonical report view is always serializable");

    let digest = Sha256::digest(&bytes);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{b:02x}");
    }
    ContentHash(out)
}

/// Change verdict against the previously stored state of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Novelty {
    Changed,
    Unchanged,
}

/// `prior` is whether the store already holds a report with this hash.
pub fn classify(prior: bool) -> Novelty {
    if prior {
        Novelty::Unchanged
    } else {
        Novelty::Changed
    }
}
