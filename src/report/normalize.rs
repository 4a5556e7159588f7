//! Raw feed entry → canonical [`Report`].
//!
//! Pure and side-effect free; safe to run on many entries in parallel.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::description::{DescriptionParser, UPDATED};
use super::fingerprint::{content_hash, ContentHash};
use super::geometry::{Geometry, Position};
use super::{Report, UpdatedAt};
use crate::error::EntryError;
use crate::feed::types::{RawEntry, RawGeometry};

/// Provider format for `pubDate` in GeoJSON feeds, e.g. `2013/10/31 00:00:00+00`.
const PUBDATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%#z";
/// Format of the `UPDATED:` description attribute, e.g. `5 Feb 2014 08:58`.
const UPDATED_FORMAT: &str = "%d %b %Y %H:%M";

#[derive(Debug, Clone)]
pub struct FeatureNormalizer {
    parser: DescriptionParser,
    updated_tz: Tz,
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::new(DescriptionParser::default(), chrono_tz::Australia::Sydney)
    }
}

impl FeatureNormalizer {
    pub fn new(parser: DescriptionParser, updated_tz: Tz) -> Self {
        Self { parser, updated_tz }
    }

    pub fn normalize(&self, entry: &RawEntry) -> Result<Report, EntryError> {
        let props = &entry.properties;

        let geometry = match &entry.geometry {
            Some(raw) => convert_geometry(raw)?,
            None => return Err(EntryError::UnrecognizedGeometryKind("null".into())),
        };
        let published_at = parse_published(&props.pub_date)?;

        let attributes = self.parser.parse(&props.description);
        let updated_at = match attributes.get(UPDATED) {
            None => UpdatedAt::Absent,
            Some(raw) => match parse_updated(raw, self.updated_tz) {
                Ok(t) => UpdatedAt::At(t),
                Err(e) => {
                    tracing::debug!(
                        target: "normalize",
                        guid = %props.guid,
                        error = %e,
                        "updated attribute unreadable; keeping report"
                    );
                    UpdatedAt::Unparsed(raw.clone())
                }
            },
        };

        let mut report = Report {
            content_hash: ContentHash::default(),
            external_id: props.guid.trim().to_string(),
            title: props.title.trim().to_string(),
            category: props.category.trim().to_string(),
            link: props.link.trim().to_string(),
            published_at,
            updated_at,
            description_raw: props.description.clone(),
            attributes,
            geometry,
        };
        report.content_hash = content_hash(&report);
        Ok(report)
    }
}

/// Dispatch on the type tag. Collections come back flattened.
pub fn convert_geometry(raw: &RawGeometry) -> Result<Geometry, EntryError> {
    let kind = raw.kind.as_str();
    let geometry = match kind {
        "Point" => {
            let p: Position = coords(raw)?;
            check_position(kind, &p)?;
            Geometry::Point { coordinates: p }
        }
        "LineString" => {
            let line: Vec<Position> = coords(raw)?;
            check_positions(kind, &line)?;
            Geometry::LineString { coordinates: line }
        }
        "Polygon" => {
            let rings: Vec<Vec<Position>> = coords(raw)?;
            if rings.is_empty() {
                return Err(EntryError::coordinates(kind, "polygon has no rings"));
            }
            for ring in &rings {
                check_positions(kind, ring)?;
            }
            Geometry::Polygon { coordinates: rings }
        }
        "GeometryCollection" => {
            let geometries = raw
                .geometries
                .iter()
                .map(convert_geometry)
                .collect::<Result<Vec<_>, _>>()?;
            Geometry::GeometryCollection { geometries }.flatten()
        }
        other => return Err(EntryError::UnrecognizedGeometryKind(other.to_string())),
    };
    Ok(geometry)
}

fn coords<T: DeserializeOwned>(raw: &RawGeometry) -> Result<T, EntryError> {
    serde_json::from_value(raw.coordinates.clone())
        .map_err(|e| EntryError::coordinates(&raw.kind, e.to_string()))
}

fn check_position(kind: &str, p: &[f64]) -> Result<(), EntryError> {
    if p.len() < 2 {
        return Err(EntryError::coordinates(kind, "position needs at least x and y"));
    }
    if !p.iter().all(|c| c.is_finite()) {
        return Err(EntryError::coordinates(kind, "non-finite coordinate"));
    }
    Ok(())
}

fn check_positions(kind: &str, ps: &[Position]) -> Result<(), EntryError> {
    if ps.is_empty() {
        return Err(EntryError::coordinates(kind, "empty coordinate list"));
    }
    ps.iter().try_for_each(|p| check_position(kind, p))
}

/// `pubDate` is mandatory. Accepts the GeoJSON provider format, RFC 2822
/// (GeoRSS) and RFC 3339.
pub fn parse_published(s: &str) -> Result<DateTime<Utc>, EntryError> {
    let s = s.trim();
    let fail = || EntryError::DateParseFailure {
        field: "pubDate",
        value: s.to_string(),
    };
    if s.is_empty() {
        return Err(fail());
    }

    if let Ok(dt) = DateTime::parse_from_str(s, PUBDATE_FORMAT) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc2822) {
        let nanos = odt.unix_timestamp_nanos();
        return Ok(Utc.timestamp_nanos(i64::try_from(nanos).map_err(|_| fail())?));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    Err(fail())
}

/// Local wall-clock time in `tz`. Ambiguous (DST fold) times take the earlier instant.
pub fn parse_updated(s: &str, tz: Tz) -> Result<DateTime<Utc>, EntryError> {
    let fail = || EntryError::DateParseFailure {
        field: "updated",
        value: s.to_string(),
    };
    let naive = NaiveDateTime::parse_from_str(s.trim(), UPDATED_FORMAT).map_err(|_| fail())?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(fail)
}
