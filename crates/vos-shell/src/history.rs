//! Command history persistence (§4.9.4): `<command> ## <RFC3339 timestamp>`
//! lines in `<HOME>/.bash_history`, trimmed to the most recent 1,000 on load.

use chrono::{DateTime, Utc};

const MAX_ENTRIES: usize = 1000;
const SEPARATOR: &str = " ## ";

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub command: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    #[must_use]
    pub fn now(command: impl Into<String>) -> Self {
        HistoryEntry { command: command.into(), timestamp: Utc::now() }
    }

    fn format(&self) -> String {
        format!("{}{SEPARATOR}{}", self.command, self.timestamp.to_rfc3339())
    }

    fn parse(line: &str) -> Option<Self> {
        let (command, ts) = line.rsplit_once(SEPARATOR)?;
        let timestamp = DateTime::parse_from_rfc3339(ts.trim()).ok()?.with_timezone(&Utc);
        Some(HistoryEntry { command: command.to_string(), timestamp })
    }
}

/// Parse a `.bash_history`-style file, keeping only the most recent
/// [`MAX_ENTRIES`] lines (§4.9.4).
#[must_use]
pub fn load(text: &str) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = text.lines().filter_map(HistoryEntry::parse).collect();
    if entries.len() > MAX_ENTRIES {
        entries = entries.split_off(entries.len() - MAX_ENTRIES);
    }
    entries
}

/// Render entries back into `.bash_history` form.
#[must_use]
pub fn render(entries: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.format());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_format_and_parse() {
        let entry = HistoryEntry::now("ls -la");
        let rendered = render(&[entry.clone()]);
        let parsed = load(&rendered);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].command, "ls -la");
    }

    #[test]
    fn load_trims_to_most_recent_1000() {
        let mut text = String::new();
        for i in 0..1005 {
            text.push_str(&format!("cmd{i}{SEPARATOR}2024-01-01T00:00:00Z\n"));
        }
        let entries = load(&text);
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].command, "cmd5");
        assert_eq!(entries.last().unwrap().command, "cmd1004");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let entries = load("not a history line\nls ## 2024-01-01T00:00:00Z\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "ls");
    }
}
