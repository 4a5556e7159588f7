// src/feed/georss.rs
//! GeoRSS (`rss/channel/item` + `georss:*`) → raw entries.

use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{json, Value};

use crate::feed::types::{RawEntry, RawGeometry, RawProperties};

#[derive(Debug, Default)]
struct ItemBuf {
    props: RawProperties,
    point: Option<String>,
    line: Option<String>,
    polygons: Vec<String>,
}

/// Parse an RSS document with GeoRSS-Simple geometry.
///
/// The root must be `<rss>` holding a `<channel>`; other XML (an error page,
/// say) is rejected rather than read as an empty snapshot.
pub fn parse_georss(s: &str) -> Result<Vec<RawEntry>> {
    let xml = scrub_html_entities_for_xml(s);
    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut item: Option<ItemBuf> = None;
    let mut root: Option<String> = None;
    let mut has_channel = false;

    loop {
        match reader.read_event().context("parsing georss xml")? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                note_element(&name, &path, &mut root, &mut has_channel);
                if name == "item" {
                    item = Some(ItemBuf::default());
                }
                path.push(name);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                path.pop();
                if name == "item" {
                    if let Some(buf) = item.take() {
                        out.push(buf.into_entry());
                    }
                }
            }
            Event::Text(t) => {
                let text = t.unescape().context("unescaping georss text")?;
                if let (Some(buf), Some(field)) = (item.as_mut(), path.last()) {
                    buf.push_text(field, &text);
                }
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                let text = String::from_utf8_lossy(&raw);
                if let (Some(buf), Some(field)) = (item.as_mut(), path.last()) {
                    buf.push_text(field, &text);
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                note_element(&name, &path, &mut root, &mut has_channel);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match root.as_deref() {
        Some("rss") if has_channel => Ok(out),
        Some("rss") => bail!("rss document has no <channel>"),
        Some(other) => bail!("xml document root is <{other}>, not <rss>"),
        None => bail!("xml document has no root element"),
    }
}

fn note_element(name: &str, path: &[String], root: &mut Option<String>, has_channel: &mut bool) {
    if path.is_empty() && root.is_none() {
        *root = Some(name.to_string());
    }
    if name == "channel" && path.len() == 1 && path[0] == "rss" {
        *has_channel = true;
    }
}

impl ItemBuf {
    fn push_text(&mut self, field: &str, text: &str) {
        let slot = match field {
            "title" => &mut self.props.title,
            "link" => &mut self.props.link,
            "category" => &mut self.props.category,
            "guid" => &mut self.props.guid,
            "pubDate" => &mut self.props.pub_date,
            "description" => &mut self.props.description,
            "point" => self.point.get_or_insert_with(String::new),
            "line" => self.line.get_or_insert_with(String::new),
            "polygon" => {
                self.polygons.push(text.to_string());
                return;
            }
            _ => return,
        };
        slot.push_str(text);
    }

    fn into_entry(self) -> RawEntry {
        let mut parts = Vec::new();
        if let Some(p) = &self.point {
            parts.push(match lat_lon_pairs(p) {
                Some(mut pts) if pts.len() == 1 => RawGeometry::new("Point", pts.remove(0)),
                _ => RawGeometry::new("Point", Value::String(p.clone())),
            });
        }
        if let Some(l) = &self.line {
            parts.push(match lat_lon_pairs(l) {
                Some(pts) => RawGeometry::new("LineString", Value::Array(pts)),
                None => RawGeometry::new("LineString", Value::String(l.clone())),
            });
        }
        for poly in &self.polygons {
            parts.push(match lat_lon_pairs(poly) {
                Some(pts) => RawGeometry::new("Polygon", json!([pts])),
                None => RawGeometry::new("Polygon", Value::String(poly.clone())),
            });
        }

        let geometry = match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(RawGeometry::collection(parts)),
        };

        RawEntry {
            properties: self.props,
            geometry,
        }
    }
}

/// `"lat lon lat lon ..."` → `[[lon, lat], ...]`. `None` on odd counts or bad numbers.
fn lat_lon_pairs(s: &str) -> Option<Vec<Value>> {
    let nums = s
        .split_whitespace()
        .map(|t| t.trim_end_matches(',').parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if nums.is_empty() || nums.len() % 2 != 0 {
        return None;
    }
    Some(nums.chunks(2).map(|c| json!([c[1], c[0]])).collect())
}

/// RSS descriptions often carry HTML entities that XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
