// src/reconcile/summary.rs
use serde::Serialize;

use crate::error::EntryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    /// Position in the feed document.
    pub index: usize,
    pub external_id: String,
    pub kind: &'static str,
    pub reason: String,
}

impl SkippedEntry {
    pub fn new(index: usize, external_id: &str, err: &EntryError) -> Self {
        Self {
            index,
            external_id: external_id.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// Outcome of one completed batch (sweep included).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub entries_seen: usize,
    pub reports_inserted: usize,
    pub reports_unchanged: usize,
    pub incidents_created: usize,
    pub incidents_retired: u64,
    pub skipped: Vec<SkippedEntry>,
}

impl BatchSummary {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Skip counts per error kind, sorted by kind.
    pub fn skipped_by_kind(&self) -> Vec<(&'static str, usize)> {
        let mut counts = std::collections::BTreeMap::new();
        for s in &self.skipped {
            *counts.entry(s.kind).or_insert(0usize) += 1;
        }
        counts.into_iter().collect()
    }
}
