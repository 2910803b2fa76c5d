//! The expansion pipeline (§4.9.2), applied in strict order: command
//! substitution, environment-variable expansion, tilde expansion, then
//! glob expansion against the virtual namespace.

use vos_provider::{ListOptions, VfsResult};

use crate::ast::Word;
use crate::Shell;

const GLOB_CHARS: [char; 3] = ['*', '?', '['];

/// Expand one lexical word into zero or more argv words. Only glob
/// expansion can multiply a single token into several; every other stage
/// is 1:1.
pub(crate) async fn expand_word(word: &Word, shell: &Shell) -> VfsResult<Vec<String>> {
    let literal = expand_quoted_text(&word.raw, shell, true).await?;

    if word.quoted {
        return Ok(vec![literal]);
    }

    let tilded = expand_tilde(&literal, shell.env_snapshot().home());

    if !tilded.contains(GLOB_CHARS) {
        return Ok(vec![tilded]);
    }

    let matches = expand_glob(&tilded, shell.env_snapshot().pwd(), shell).await;
    Ok(if matches.is_empty() { vec![tilded] } else { matches })
}

/// Expand `$VAR`/`${VAR}` and `$( … )`/backtick command substitution in
/// free text (a here-doc body) with no quote-stripping: quote characters
/// are ordinary bytes there.
pub(crate) async fn expand_text(raw: &str, shell: &Shell) -> VfsResult<String> {
    expand_quoted_text(raw, shell, false).await
}

/// Core substitution scanner. When `honor_quotes` is true, `'…'` suppresses
/// all substitution and both quote kinds are stripped from the output
/// (§4.9.1/§4.9.2 word semantics); when false (here-doc bodies), quote
/// characters pass through literally and substitution always applies.
async fn expand_quoted_text(raw: &str, shell: &Shell, honor_quotes: bool) -> VfsResult<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    let mut out = String::new();
    let mut in_single = false;
    let mut in_double = false;

    while i < chars.len() {
        let c = chars[i];

        if honor_quotes && c == '\'' && !in_double {
            in_single = !in_single;
            i += 1;
            continue;
        }
        if honor_quotes && c == '"' && !in_single {
            in_double = !in_double;
            i += 1;
            continue;
        }
        if honor_quotes && in_single {
            out.push(c);
            i += 1;
            continue;
        }
        if honor_quotes && in_double && c == '\\' && matches!(chars.get(i + 1), Some('$') | Some('`') | Some('"') | Some('\\')) {
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }

        // Unquoted backslash: quote removal per bash word semantics, it
        // escapes the next character and is itself dropped.
        if honor_quotes && !in_single && !in_double && c == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                out.push(next);
                i += 2;
            } else {
                out.push(c);
                i += 1;
            }
            continue;
        }

        if c == '$' && chars.get(i + 1) == Some(&'(') {
            i += 2;
            let start = i;
            let mut depth = 1;
            while i < chars.len() && depth > 0 {
                match chars[i] {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                if depth > 0 {
                    i += 1;
                }
            }
            let cmd: String = chars[start..i].iter().collect();
            if i < chars.len() {
                i += 1;
            }
            out.push_str(&run_command_substitution(&cmd, shell).await?);
            continue;
        }

        if c == '`' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != '`' {
                i += 1;
            }
            let cmd: String = chars[start..i].iter().collect();
            if i < chars.len() {
                i += 1;
            }
            out.push_str(&run_command_substitution(&cmd, shell).await?);
            continue;
        }

        if c == '$' && chars.get(i + 1) == Some(&'{') {
            i += 2;
            let start = i;
            while i < chars.len() && chars[i] != '}' {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            if i < chars.len() {
                i += 1;
            }
            out.push_str(shell.env_snapshot().get(&name).unwrap_or(""));
            continue;
        }

        if c == '$' && chars.get(i + 1).is_some_and(|c2| c2.is_alphabetic() || *c2 == '_') {
            i += 1;
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            out.push_str(shell.env_snapshot().get(&name).unwrap_or(""));
            continue;
        }

        out.push(c);
        i += 1;
    }

    Ok(out)
}

/// Run `cmd` recursively through the shell, trim trailing newlines, and
/// fold any embedded newline into a space (§4.9.2).
async fn run_command_substitution(cmd: &str, shell: &Shell) -> VfsResult<String> {
    let result = Box::pin(shell.execute(cmd)).await;
    let trimmed = result.output.trim_end_matches('\n');
    Ok(trimmed.replace('\n', " "))
}

fn expand_tilde(s: &str, home: &str) -> String {
    if s == "~" {
        return home.to_string();
    }
    if let Some(rest) = s.strip_prefix("~/") {
        return vos_path::join(home, rest);
    }
    s.to_string()
}

/// Expand a glob pattern against the virtual namespace, segment by segment,
/// honoring a relative pattern's resolution against `pwd` and re-shortening
/// the results back to relative form afterward (§4.9.2).
async fn expand_glob(pattern: &str, pwd: &str, shell: &Shell) -> Vec<String> {
    let absolute = pattern.starts_with('/');
    let full = if absolute { pattern.to_string() } else { vos_path::join(pwd, pattern) };
    let segments: Vec<&str> = full.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();

    let mut current = vec!["/".to_string()];
    for seg in segments {
        let mut next = Vec::new();
        if seg.contains(GLOB_CHARS) {
            let Ok(glob_pat) = glob::Pattern::new(seg) else {
                return Vec::new();
            };
            for base in &current {
                let entries = shell.facade().list(base, &ListOptions::default()).await.unwrap_or_default();
                let mut names: Vec<&str> = entries
                    .iter()
                    .map(|e| e.name.as_str())
                    .filter(|n| !n.starts_with('.') && glob_pat.matches(n))
                    .collect();
                names.sort_unstable();
                for name in names {
                    next.push(vos_path::join(base, name));
                }
            }
        } else {
            for base in &current {
                next.push(vos_path::join(base, seg));
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }

    current.sort();

    if absolute {
        current
    } else {
        current
            .into_iter()
            .map(|p| vos_path::strip_prefix(pwd, &p).map_or(p.clone(), |rel| rel))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vos_provider::Permission;
    use vos_provider_memory::MemoryProvider;
    use vos_vfs::VirtualOs;

    fn shell() -> Shell {
        let mem = Arc::new(MemoryProvider::new());
        mem.add_file("/a.txt", Permission::RW, b"one".to_vec());
        mem.add_file("/b.txt", Permission::RW, b"two".to_vec());
        let facade = Arc::new(VirtualOs::new(mem));
        Shell::new(facade, "tester")
    }

    #[tokio::test]
    async fn env_var_expands_known_and_unknown() {
        let shell = shell();
        let out = expand_text("user=$USER missing=$NOPE", &shell).await.unwrap();
        assert_eq!(out, "user=tester missing=");
    }

    #[tokio::test]
    async fn braced_var_expands() {
        let shell = shell();
        let out = expand_text("${USER}!", &shell).await.unwrap();
        assert_eq!(out, "tester!");
    }

    #[tokio::test]
    async fn single_quotes_suppress_all_expansion() {
        let shell = shell();
        let word = Word { raw: "'$USER'".into(), quoted: true };
        let out = expand_word(&word, &shell).await.unwrap();
        assert_eq!(out, vec!["$USER".to_string()]);
    }

    #[tokio::test]
    async fn glob_expands_against_virtual_namespace_sorted() {
        let shell = shell();
        let word = Word { raw: "*.txt".into(), quoted: false };
        let out = expand_word(&word, &shell).await.unwrap();
        assert_eq!(out, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn glob_with_no_match_stays_literal() {
        let shell = shell();
        let word = Word { raw: "*.missing".into(), quoted: false };
        let out = expand_word(&word, &shell).await.unwrap();
        assert_eq!(out, vec!["*.missing".to_string()]);
    }

    #[tokio::test]
    async fn command_substitution_trims_trailing_newline_and_folds_embedded() {
        let shell = shell();
        let out = expand_text("$(echo -e 'a\\nb')", &shell).await.unwrap();
        assert_eq!(out, "a b");
    }

    #[tokio::test]
    async fn tilde_expands_to_home() {
        let shell = shell();
        let word = Word { raw: "~/docs".into(), quoted: false };
        let out = expand_word(&word, &shell).await.unwrap();
        assert_eq!(out, vec!["/home/tester/docs".to_string()]);
    }
}
