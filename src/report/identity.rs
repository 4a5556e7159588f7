//! Stable incident identity from a feed GUID such as
//! `tag:www.rfs.nsw.gov.au,2013-11-02:80707`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EntryError;

/// Business key joining feed entries to stored incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentKey(pub i64);

impl fmt::Display for IncidentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The last colon-delimited segment must be an unsigned integer. A GUID with
/// no colon is a single segment, so a bare `80707` resolves to itself.
pub fn resolve_incident_key(external_id: &str) -> Result<IncidentKey, EntryError> {
    let malformed = || EntryError::MalformedIdentifier(external_id.to_string());

    let tail = external_id.trim().rsplit(':').next().unwrap_or_default().trim();
    if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    tail.parse::<i64>().map(IncidentKey).map_err(|_| malformed())
}
