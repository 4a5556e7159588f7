//! Error taxonomy for the reconciliation pipeline.
//!
//! Entry-level errors ([`EntryError`]) skip a single feed entry; store-level
//! errors ([`StoreError`]) abort the whole batch before the sweep runs.

use thiserror::Error;

/// Failure confined to one feed entry. The batch continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("malformed identifier {0:?}: no trailing integer segment")]
    MalformedIdentifier(String),

    #[error("unrecognized geometry kind {0:?}")]
    UnrecognizedGeometryKind(String),

    #[error("invalid coordinates for {kind}: {reason}")]
    InvalidCoordinates { kind: String, reason: String },

    #[error("cannot parse {field} date {value:?}")]
    DateParseFailure { field: &'static str, value: String },
}

impl EntryError {
    pub fn coordinates(kind: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCoordinates {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Short stable label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier(_) => "malformed_identifier",
            Self::UnrecognizedGeometryKind(_) => "unrecognized_geometry_kind",
            Self::InvalidCoordinates { .. } => "invalid_coordinates",
            Self::DateParseFailure { .. } => "date_parse_failure",
        }
    }
}

/// Failure reported by a persistence gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("incident {key} already has storage id {storage_id}")]
    DuplicateInsertAttempted { key: i64, storage_id: String },

    #[error("unknown incident storage id {0}")]
    UnknownIncident(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::StoreUnavailable(format!("encoding: {e}"))
    }
}

/// Batch-fatal outcome. The sweep did not run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("transform stage failed: {0}")]
    Pipeline(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_error_kinds_are_stable() {
        assert_eq!(
            EntryError::MalformedIdentifier("x".into()).kind(),
            "malformed_identifier"
        );
        assert_eq!(
            EntryError::coordinates("Point", "empty").kind(),
            "invalid_coordinates"
        );
    }

    #[test]
    fn sqlx_errors_become_store_unavailable() {
        let e: StoreError = sqlx::Error::PoolClosed.into();
        assert!(matches!(e, StoreError::StoreUnavailable(_)));
    }
}
