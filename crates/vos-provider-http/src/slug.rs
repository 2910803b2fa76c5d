//! Stable slugification (§4.7): lowercase, hyphenate, cap at 60 characters
//! breaking on the last hyphen past the midpoint, default to `untitled`,
//! `.txt` suffix, de-duplicated against already-assigned names.

use std::collections::HashSet;

const MAX_LEN: usize = 60;

/// Lowercase `input`, collapse every run of non-alphanumerics into a single
/// `-`, trim leading/trailing `-`, and cap the result at [`MAX_LEN`]
/// characters (breaking on the last `-` past the midpoint when one exists
/// there, to avoid cutting mid-word).
#[must_use]
pub fn slugify_base(input: &str) -> String {
    let mut out = String::new();
    let mut last_was_dash = false;
    for c in input.to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }

    let trimmed: String = out.trim_matches('-').to_string();
    let base = if trimmed.is_empty() { "untitled".to_string() } else { trimmed };

    let chars: Vec<char> = base.chars().collect();
    if chars.len() <= MAX_LEN {
        return base;
    }

    let window = &chars[..MAX_LEN];
    let half = MAX_LEN / 2;
    match window.iter().rposition(|&c| c == '-') {
        Some(idx) if idx >= half => window[..idx].iter().collect(),
        _ => window.iter().collect(),
    }
}

/// Produce a unique `<base>.txt` filename against `existing`, appending
/// `-2`, `-3`, … on collision.
#[must_use]
pub fn unique_filename(base: &str, existing: &HashSet<String>) -> String {
    let candidate = format!("{base}.txt");
    if !existing.contains(&candidate) {
        return candidate;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}.txt");
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates() {
        assert_eq!(slugify_base("Hello, World!"), "hello-world");
    }

    #[test]
    fn collapses_runs_and_trims() {
        assert_eq!(slugify_base("  --Foo___Bar--  "), "foo-bar");
    }

    #[test]
    fn empty_defaults_to_untitled() {
        assert_eq!(slugify_base("***"), "untitled");
    }

    #[test]
    fn caps_length_breaking_on_hyphen() {
        let long = "word-".repeat(20); // 100 chars, hyphen every 5
        let slug = slugify_base(&long);
        assert!(slug.chars().count() <= 60);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn dedupes_with_numeric_suffix() {
        let mut existing = HashSet::new();
        existing.insert("post.txt".to_string());
        existing.insert("post-2.txt".to_string());
        assert_eq!(unique_filename("post", &existing), "post-3.txt");
    }
}
