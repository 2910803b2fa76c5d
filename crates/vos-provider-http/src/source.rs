//! A single polled source (§4.7): its configuration, conditional-GET
//! bookkeeping, and the fetch step the background loop and `Start` both
//! drive.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::parser::{self, Parser};
use crate::slug::{slugify_base, unique_filename};

/// Static configuration for one source, as given to `Add` or produced by a
/// loader.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub parser: Parser,
    pub headers: HashMap<String, String>,
}

/// A file produced by parsing a source's response body.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub slug: String,
    pub content: Vec<u8>,
    pub modified: DateTime<Utc>,
}

/// What changed in the namespace as a result of a fetch, so the caller can
/// emit the right events (§6: "`Create` when a new slug appears and
/// `Write` when an existing slug's content changes").
#[derive(Debug, Default)]
pub struct FetchDelta {
    pub created: Vec<String>,
    pub updated: Vec<String>,
}

/// Mutable per-source state: conditional-GET bookkeeping plus the files
/// produced by the most recent successful fetch.
pub struct SourceState {
    pub config: SourceConfig,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    /// Stable item id → assigned slug, so a re-fetched item updates its
    /// existing file in place instead of spawning a duplicate.
    id_to_slug: HashMap<String, String>,
    pub files: BTreeMap<String, ParsedFile>,
}

impl SourceState {
    #[must_use]
    pub fn new(config: SourceConfig) -> Self {
        SourceState {
            config,
            etag: None,
            last_modified: None,
            updated: None,
            id_to_slug: HashMap::new(),
            files: BTreeMap::new(),
        }
    }

    /// Perform one conditional-GET fetch cycle (§4.7 steps 1-6):
    /// 1. Build the request with `If-None-Match`/`If-Modified-Since` from
    ///    the last successful fetch.
    /// 2. Issue it.
    /// 3. A `304` leaves state untouched.
    /// 4. Otherwise parse the body into items.
    /// 5. Assign each item a stable slug, updating in place when its id
    ///    was already seen, appending when it's new.
    /// 6. Record the new `ETag`/`Last-Modified` and the fetch instant.
    pub async fn fetch(&mut self, client: &Client) -> Result<FetchDelta, String> {
        let mut req = client.get(&self.config.url);
        for (k, v) in &self.config.headers {
            req = req.header(k, v);
        }
        if let Some(etag) = &self.etag {
            req = req.header("If-None-Match", etag.clone());
        }
        if let Some(lm) = &self.last_modified {
            req = req.header("If-Modified-Since", lm.clone());
        }

        let resp = req.send().await.map_err(|e| e.to_string())?;
        if resp.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchDelta::default());
        }
        if !resp.status().is_success() {
            return Err(format!("{}: {}", self.config.name, resp.status()));
        }

        let etag = resp.headers().get("etag").and_then(|v| v.to_str().ok()).map(ToString::to_string);
        let last_modified = resp.headers().get("last-modified").and_then(|v| v.to_str().ok()).map(ToString::to_string);
        let body = resp.bytes().await.map_err(|e| e.to_string())?;

        let items = parser::parse(&self.config.parser, &body, &self.config.name);
        let delta = self.apply_items(items);

        self.etag = etag;
        self.last_modified = last_modified;
        self.updated = Some(Utc::now());
        Ok(delta)
    }

    /// Assign each parsed item a stable slug, updating its file in place
    /// when the item's id was already seen and appending a fresh,
    /// collision-free slug otherwise (§4.7 step 5). Split out from
    /// [`Self::fetch`] so it can be exercised without a network call.
    fn apply_items(&mut self, items: Vec<parser::ParsedItem>) -> FetchDelta {
        let mut delta = FetchDelta::default();
        let mut existing_names: std::collections::HashSet<String> = self.files.keys().cloned().collect();

        for item in items {
            if let Some(slug) = self.id_to_slug.get(&item.id).cloned() {
                let changed = self.files.get(&slug).map_or(true, |f| f.content.as_slice() != item.content.as_bytes());
                self.files.insert(
                    slug.clone(),
                    ParsedFile { slug: slug.clone(), content: item.content.into_bytes(), modified: item.modified },
                );
                if changed {
                    delta.updated.push(slug);
                }
            } else {
                let base = slugify_base(&item.title);
                let filename = unique_filename(&base, &existing_names);
                existing_names.insert(filename.clone());
                self.id_to_slug.insert(item.id, filename.clone());
                self.files.insert(
                    filename.clone(),
                    ParsedFile { slug: filename.clone(), content: item.content.into_bytes(), modified: item.modified },
                );
                delta.created.push(filename);
            }
        }

        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedItem;

    fn item(id: &str, title: &str, content: &str) -> ParsedItem {
        ParsedItem { id: id.to_string(), title: title.to_string(), content: content.to_string(), modified: Utc::now() }
    }

    fn config() -> SourceConfig {
        SourceConfig { name: "feed".to_string(), url: "https://example.test/feed".to_string(), parser: Parser::Auto, headers: HashMap::new() }
    }

    #[test]
    fn new_items_are_created() {
        let mut state = SourceState::new(config());
        let delta = state.apply_items(vec![item("1", "First Post", "body")]);
        assert_eq!(delta.created, vec!["first-post.txt"]);
        assert!(delta.updated.is_empty());
        assert_eq!(state.files.len(), 1);
    }

    #[test]
    fn same_id_updates_in_place_when_content_changes() {
        let mut state = SourceState::new(config());
        state.apply_items(vec![item("1", "First Post", "body v1")]);
        let delta = state.apply_items(vec![item("1", "First Post", "body v2")]);
        assert!(delta.created.is_empty());
        assert_eq!(delta.updated, vec!["first-post.txt"]);
        assert_eq!(state.files.len(), 1);
        assert_eq!(state.files["first-post.txt"].content, b"body v2");
    }

    #[test]
    fn same_id_unchanged_content_reports_no_delta() {
        let mut state = SourceState::new(config());
        state.apply_items(vec![item("1", "First Post", "body")]);
        let delta = state.apply_items(vec![item("1", "First Post", "body")]);
        assert!(delta.created.is_empty());
        assert!(delta.updated.is_empty());
    }

    #[test]
    fn colliding_titles_get_distinct_slugs() {
        let mut state = SourceState::new(config());
        let delta = state.apply_items(vec![item("1", "Launch", "a"), item("2", "Launch", "b")]);
        assert_eq!(delta.created, vec!["launch.txt", "launch-2.txt"]);
    }
}
