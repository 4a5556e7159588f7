// src/feed/sources.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::feed::types::{FeedDocument, FeedSource};

/// Feed location given on the command line: URL, file, directory, or an
/// in-memory body for tests.
pub struct LocationSource {
    mode: Mode,
}

enum Mode {
    Inline { origin: String, body: String },
    File(PathBuf),
    Directory(PathBuf),
    Http { url: String, client: reqwest::Client },
}

impl LocationSource {
    pub fn from_body(origin: &str, body: &str) -> Self {
        Self {
            mode: Mode::Inline {
                origin: origin.to_string(),
                body: body.to_string(),
            },
        }
    }

    pub fn from_url(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self {
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)
            .with_context(|| format!("feed location {} is not readable", path.display()))?;
        let mode = if meta.is_dir() {
            Mode::Directory(path.to_path_buf())
        } else {
            Mode::File(path.to_path_buf())
        };
        Ok(Self { mode })
    }

    /// Absolute `http(s)://` locations are fetched; anything else is a path.
    pub fn parse(location: &str, timeout: Duration) -> Result<Self> {
        match reqwest::Url::parse(location) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => Self::from_url(location, timeout),
            Ok(u) if u.scheme() == "file" => {
                let p = u
                    .to_file_path()
                    .map_err(|_| anyhow!("bad file url {location}"))?;
                Self::from_path(p)
            }
            _ => Self::from_path(location),
        }
    }
}

#[async_trait]
impl FeedSource for LocationSource {
    async fn fetch_latest(&self) -> Result<Vec<FeedDocument>> {
        match &self.mode {
            Mode::Inline { origin, body } => Ok(vec![FeedDocument {
                origin: origin.clone(),
                body: body.clone(),
            }]),
            Mode::File(path) => Ok(vec![read_document(path).await?]),
            Mode::Directory(dir) => read_directory(dir).await,
            Mode::Http { url, client } => {
                let resp = match client.get(url.as_str()).send().await {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::warn!(error = ?e, source = %url, "feed http error");
                        counter!("feed_fetch_errors_total").increment(1);
                        return Err(e).context("feed http get()");
                    }
                };
                let resp = resp.error_for_status().context("feed http status")?;
                let body = resp.text().await.context("feed http .text()")?;
                Ok(vec![FeedDocument {
                    origin: url.clone(),
                    body,
                }])
            }
        }
    }

    fn name(&self) -> &str {
        match &self.mode {
            Mode::Inline { .. } => "inline",
            Mode::File(_) => "file",
            Mode::Directory(_) => "directory",
            Mode::Http { .. } => "http",
        }
    }
}

async fn read_document(path: &Path) -> Result<FeedDocument> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading feed {}", path.display()))?;
    Ok(FeedDocument {
        origin: path.display().to_string(),
        body,
    })
}

/// Every `*.json` / `*.xml` file, lexical order. Unreadable files are skipped.
async fn read_directory(dir: &Path) -> Result<Vec<FeedDocument>> {
    let mut paths = Vec::new();
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("listing {}", dir.display()))?;
    while let Some(e) = rd.next_entry().await? {
        let path = e.path();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if matches!(ext.as_str(), "json" | "geojson" | "xml" | "rss") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for p in paths {
        match read_document(&p).await {
            Ok(doc) => out.push(doc),
            Err(e) => {
                tracing::warn!(error = ?e, path = %p.display(), "skipping unreadable feed file");
                counter!("feed_fetch_errors_total").increment(1);
            }
        }
    }
    Ok(out)
}
