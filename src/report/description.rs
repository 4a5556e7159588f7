//! Key/value extraction from the free-text incident description.
//!
//! Feeds pack structured fields into an HTML-ish fragment:
//! `ALERT LEVEL: Advice<br />STATUS: under control<br />...`.
//! Parsing never fails; anything that does not look like `label: value`
//! lands in the `extra` bucket.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::BTreeMap;

pub const DEFAULT_BREAK_MARKER: &str = "<br />";

/// Attribute name → trimmed value. Ordered so hashing and serialization are stable.
pub type Attributes = BTreeMap<String, String>;

pub const EXTRA: &str = "extra";
pub const UPDATED: &str = "updated";

fn re_field() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*([\w ]+):\s(.*)$").unwrap())
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn re_anchor() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)<a[\s>]").unwrap())
}

#[derive(Debug, Clone)]
pub struct DescriptionParser {
    marker: String,
}

impl Default for DescriptionParser {
    fn default() -> Self {
        Self::new(DEFAULT_BREAK_MARKER)
    }
}

impl DescriptionParser {
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        Self {
            marker: if marker.is_empty() {
                DEFAULT_BREAK_MARKER.to_string()
            } else {
                marker
            },
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn parse(&self, text: &str) -> Attributes {
        let mut attrs = Attributes::new();

        for segment in text.split(self.marker.as_str()) {
            if segment.trim().is_empty() {
                continue;
            }
            match re_field().captures(segment) {
                Some(caps) => {
                    let label = normalize_label(&caps[1]);
                    if label.is_empty() {
                        attrs.insert(EXTRA.to_string(), segment.to_string());
                        continue;
                    }
                    let value = html_escape::decode_html_entities(caps[2].trim()).to_string();
                    attrs.insert(label, value);
                }
                // Only the last unmatched segment is kept.
                None => {
                    attrs.insert(EXTRA.to_string(), segment.to_string());
                }
            }
        }

        if let Some(updated) = attrs.get_mut(UPDATED) {
            if let Some(m) = re_anchor().find(updated) {
                *updated = updated[..m.start()].trim().to_string();
            }
        }

        attrs
    }
}

/// `"Council Area "` → `"council_area"`.
fn normalize_label(raw: &str) -> String {
    re_ws()
        .replace_all(raw.trim(), "_")
        .to_lowercase()
}

/// Parse with the default `<br />` marker.
pub fn parse_description(text: &str) -> Attributes {
    DescriptionParser::default().parse(text)
}
