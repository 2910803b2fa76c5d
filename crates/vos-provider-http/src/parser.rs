//! Parsing a fetched response body into named files (§4.7).
//!
//! `Parser::Auto` tries RSS/Atom first (most feeds this provider polls are
//! feeds) and falls back to a single raw file when the body isn't XML it
//! recognizes.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// How a source's response body becomes one or more files.
#[derive(Debug, Clone, PartialEq)]
pub enum Parser {
    RssAtom,
    Json {
        array_field: Option<String>,
        name_field: Option<String>,
        id_field: Option<String>,
    },
    Raw {
        filename: Option<String>,
    },
    Auto,
}

impl Parser {
    #[must_use]
    pub fn json(array_field: Option<String>, name_field: Option<String>, id_field: Option<String>) -> Self {
        Parser::Json { array_field, name_field, id_field }
    }
}

/// One item extracted from a response body, before slugification.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    /// Stable identity across fetches (guid/id/link, or a JSON id field).
    pub id: String,
    pub title: String,
    pub content: String,
    pub modified: DateTime<Utc>,
}

/// Parse `body` per `parser`, falling back from `Auto` to raw when no
/// feed items are recognized.
pub fn parse(parser: &Parser, body: &[u8], fallback_name: &str) -> Vec<ParsedItem> {
    match parser {
        Parser::RssAtom => parse_feed(body),
        Parser::Json { array_field, name_field, id_field } => {
            parse_json(body, array_field.as_deref(), name_field.as_deref(), id_field.as_deref())
        }
        Parser::Raw { filename } => vec![parse_raw(body, filename.as_deref().unwrap_or(fallback_name))],
        Parser::Auto => {
            let items = parse_feed(body);
            if items.is_empty() {
                vec![parse_raw(body, fallback_name)]
            } else {
                items
            }
        }
    }
}

fn parse_raw(body: &[u8], name: &str) -> ParsedItem {
    let content = String::from_utf8_lossy(body).into_owned();
    ParsedItem {
        id: name.to_string(),
        title: name.to_string(),
        content,
        modified: Utc::now(),
    }
}

/// Parse an RSS `<item>` or Atom `<entry>` feed. Returns an empty vec for
/// anything that isn't well-formed XML with a recognizable root.
fn parse_feed(body: &[u8]) -> Vec<ParsedItem> {
    let text = String::from_utf8_lossy(body);
    let doc = match roxmltree::Document::parse(&text) {
        Ok(d) => d,
        Err(_) => return Vec::new(),
    };
    let root = doc.root_element();
    let entry_tag = match root.tag_name().name() {
        "rss" => "item",
        "feed" => "entry",
        _ => return Vec::new(),
    };

    root.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == entry_tag)
        .map(feed_entry_to_item)
        .collect()
}

fn child_text<'a>(node: roxmltree::Node<'a, 'a>, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(child) = node.children().find(|c| c.is_element() && c.tag_name().name() == *name) {
            let text = child.text().unwrap_or("").trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn feed_entry_to_item(node: roxmltree::Node) -> ParsedItem {
    let title = child_text(node, &["title"]).unwrap_or_default();
    let link = child_text(node, &["link"]).or_else(|| {
        node.children()
            .find(|c| c.is_element() && c.tag_name().name() == "link")
            .and_then(|c| c.attribute("href"))
            .map(ToString::to_string)
    });
    let id = child_text(node, &["guid", "id"])
        .or_else(|| link.clone())
        .or_else(|| (!title.is_empty()).then(|| title.clone()))
        .unwrap_or_else(|| "untitled".to_string());
    let body = child_text(node, &["description", "summary", "content"]).unwrap_or_default();
    let date_text = child_text(node, &["pubDate", "published", "updated"]);
    let modified = date_text
        .as_deref()
        .and_then(parse_feed_date)
        .unwrap_or_else(Utc::now);

    let mut content = String::new();
    if !title.is_empty() {
        content.push_str(&format!("Title: {title}\n"));
    }
    if let Some(link) = &link {
        content.push_str(&format!("Link: {link}\n"));
    }
    if let Some(date) = &date_text {
        content.push_str(&format!("Date: {date}\n"));
    }
    if !content.is_empty() {
        content.push('\n');
    }
    content.push_str(&body);

    ParsedItem { id, title, content, modified }
}

fn parse_feed_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .map(|d| d.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|d| d.with_timezone(&Utc)))
        .ok()
}

fn parse_json(body: &[u8], array_field: Option<&str>, name_field: Option<&str>, id_field: Option<&str>) -> Vec<ParsedItem> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let array = match array_field {
        Some(field) => value.get(field).and_then(Value::as_array),
        None => value.as_array(),
    };
    let Some(array) = array else { return Vec::new() };

    array
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let name = name_field
                .and_then(|f| item.get(f))
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("item-{i}"));
            let id = id_field
                .and_then(|f| item.get(f))
                .map(value_to_string)
                .unwrap_or_else(|| name.clone());
            let content = serde_json::to_string_pretty(item).unwrap_or_default();
            ParsedItem { id, title: name, content, modified: Utc::now() }
        })
        .collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rss_items() {
        let xml = r#"<rss><channel>
            <item><title>First</title><link>http://x/1</link><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate><description>body one</description></item>
            <item><title>Second</title><guid>g2</guid><description>body two</description></item>
        </channel></rss>"#;
        let items = parse(&Parser::RssAtom, xml.as_bytes(), "feed");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "http://x/1");
        assert!(items[0].content.contains("body one"));
        assert_eq!(items[1].id, "g2");
    }

    #[test]
    fn parses_atom_entries() {
        let xml = r#"<feed><entry><title>Hi</title><id>urn:1</id><updated>2024-01-01T00:00:00Z</updated><summary>sum</summary></entry></feed>"#;
        let items = parse(&Parser::RssAtom, xml.as_bytes(), "feed");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "urn:1");
    }

    #[test]
    fn auto_falls_back_to_raw_for_non_feed_body() {
        let items = parse(&Parser::Auto, b"just some text", "note");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "note");
        assert_eq!(items[0].content, "just some text");
    }

    #[test]
    fn parses_json_array_with_name_and_id_fields() {
        let body = br#"{"data":[{"id":"a1","name":"Alpha"},{"id":"a2","name":"Beta"}]}"#;
        let items = parse(&Parser::json(Some("data".into()), Some("name".into()), Some("id".into())), body, "x");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "a1");
        assert_eq!(items[0].title, "Alpha");
    }

    #[test]
    fn parses_bare_json_array_without_array_field() {
        let body = br#"[{"name":"only"}]"#;
        let items = parse(&Parser::json(None, Some("name".into()), None), body, "x");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "only");
    }
}
