// src/report/mod.rs
//! Canonical report record and the pure transforms that build it.

pub mod description;
pub mod fingerprint;
pub mod geometry;
pub mod identity;
pub mod normalize;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use description::{Attributes, DescriptionParser};
pub use fingerprint::ContentHash;
pub use geometry::Geometry;
pub use identity::IncidentKey;
pub use normalize::FeatureNormalizer;

/// Advisory "last updated" time taken from the description text.
///
/// Keeps "no update info" apart from "update info present but unreadable".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum UpdatedAt {
    #[default]
    Absent,
    Unparsed(String),
    At(DateTime<Utc>),
}

impl UpdatedAt {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Unparsed(_))
    }
}

/// One observation of an incident, built from one feed entry. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub content_hash: ContentHash,
    pub external_id: String,
    pub title: String,
    pub category: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub updated_at: UpdatedAt,
    pub description_raw: String,
    pub attributes: Attributes,
    pub geometry: Geometry,
}

impl Report {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn alert_level(&self) -> Option<&str> {
        self.attr("alert_level")
    }

    pub fn location(&self) -> Option<&str> {
        self.attr("location")
    }

    pub fn council_area(&self) -> Option<&str> {
        self.attr("council_area")
    }

    pub fn status(&self) -> Option<&str> {
        self.attr("status")
    }

    /// The feed's `TYPE:` attribute.
    pub fn fire_type(&self) -> Option<&str> {
        self.attr("type")
    }

    pub fn is_fire(&self) -> bool {
        self.attr("fire") == Some("Yes")
    }

    pub fn size(&self) -> Option<&str> {
        self.attr("size")
    }

    pub fn responsible_agency(&self) -> Option<&str> {
        self.attr("responsible_agency")
    }

    pub fn extra(&self) -> Option<&str> {
        self.attr(description::EXTRA)
    }
}
