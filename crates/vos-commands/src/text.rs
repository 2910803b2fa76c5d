//! Text-processing commands: `cat`, `grep`, `sed`, `wc`, `head`, `tail`.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use vos_provider::{ByteReader, Environment, VfsResult};
use vos_provider_memory::MemoryFunc;
use vos_vfs::VirtualOs;

use crate::util::{read_all, read_stdin, reader_of, resolve, split_lines};

pub struct Cat(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Cat {
    async fn call(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        if args.is_empty() {
            return Ok(reader_of(read_stdin(stdin).await));
        }
        let mut out = Vec::new();
        for arg in &args {
            let path = resolve(arg, env);
            match read_all(&self.0, &path).await {
                Ok(mut bytes) => out.append(&mut bytes),
                Err(e) => out.extend_from_slice(format!("cat: {path}: {e}\n").as_bytes()),
            }
        }
        Ok(reader_of(out))
    }
}

pub struct Grep(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Grep {
    async fn call(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        let mut line_numbers = false;
        let mut count_only = false;
        let mut invert = false;
        let mut rest: Vec<&str> = Vec::new();

        for a in &args {
            match a.as_str() {
                "-n" => line_numbers = true,
                "-c" => count_only = true,
                "-v" => invert = true,
                other => rest.push(other),
            }
        }

        let Some((pattern, files)) = rest.split_first() else {
            return Ok(reader_of(b"usage: grep [-n] [-c] [-v] <pattern> [file...]\n".to_vec()));
        };

        let Ok(re) = Regex::new(pattern) else {
            return Ok(reader_of(format!("grep: invalid pattern: {pattern}\n").into_bytes()));
        };

        let multi = files.len() > 1;
        let mut out = String::new();

        if files.is_empty() {
            let text = String::from_utf8_lossy(&read_stdin(stdin).await).into_owned();
            render_grep(&text, &re, invert, line_numbers, count_only, None, &mut out);
        } else {
            for file in files {
                let path = resolve(file, env);
                match read_all(&self.0, &path).await {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        let label = if multi { Some(path.as_str()) } else { None };
                        render_grep(&text, &re, invert, line_numbers, count_only, label, &mut out);
                    }
                    Err(e) => out.push_str(&format!("grep: {path}: {e}\n")),
                }
            }
        }

        Ok(reader_of(out.into_bytes()))
    }
}

/// Render one file's worth of matches. With `-c`, prints a single
/// `<count>` line (or `<file>:<count>` when `label` is set): per-file
/// counts, no aggregate across files (see DESIGN.md).
fn render_grep(text: &str, re: &Regex, invert: bool, numbers: bool, count_only: bool, label: Option<&str>, out: &mut String) {
    let mut count = 0usize;
    for (i, line) in split_lines(text).iter().enumerate() {
        let is_match = re.is_match(line) != invert;
        if !is_match {
            continue;
        }
        count += 1;
        if count_only {
            continue;
        }
        if let Some(label) = label {
            out.push_str(label);
            out.push(':');
        }
        if numbers {
            out.push_str(&format!("{}:", i + 1));
        }
        out.push_str(line);
        out.push('\n');
    }
    if count_only {
        if let Some(label) = label {
            out.push_str(&format!("{label}:{count}\n"));
        } else {
            out.push_str(&format!("{count}\n"));
        }
    }
}

pub struct Sed(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Sed {
    async fn call(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        let Some((script, files)) = args.split_first() else {
            return Ok(reader_of(b"usage: sed <script> [file...]\n".to_vec()));
        };

        let Some((pattern, replacement, global)) = parse_substitution(script) else {
            return Ok(reader_of(format!("sed: invalid script: {script}\n").into_bytes()));
        };
        let Ok(re) = Regex::new(&pattern) else {
            return Ok(reader_of(format!("sed: invalid pattern: {pattern}\n").into_bytes()));
        };

        let text = if files.is_empty() {
            String::from_utf8_lossy(&read_stdin(stdin).await).into_owned()
        } else {
            let mut combined = String::new();
            for file in files {
                let path = resolve(file, env);
                match read_all(&self.0, &path).await {
                    Ok(bytes) => combined.push_str(&String::from_utf8_lossy(&bytes)),
                    Err(e) => return Ok(reader_of(format!("sed: {path}: {e}\n").into_bytes())),
                }
            }
            combined
        };

        let replaced = if global {
            re.replace_all(&text, replacement.as_str()).into_owned()
        } else {
            re.replace(&text, replacement.as_str()).into_owned()
        };
        Ok(reader_of(replaced.into_bytes()))
    }
}

/// Parse a `s/pattern/replacement/[g]` script. Delimiter is always `/`;
/// escaped delimiters (`\/`) inside pattern or replacement are unescaped.
fn parse_substitution(script: &str) -> Option<(String, String, bool)> {
    let rest = script.strip_prefix("s/")?;
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'/') {
            current.push('/');
            chars.next();
        } else if c == '/' {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if parts.len() < 2 {
        return None;
    }
    let pattern = parts[0].clone();
    let replacement = parts[1].clone();
    let flags = current;
    Some((pattern, replacement, flags.contains('g')))
}

pub struct Wc(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Wc {
    async fn call(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        let mut lines_only = false;
        let mut words_only = false;
        let mut bytes_only = false;
        let mut files: Vec<&str> = Vec::new();

        for a in &args {
            match a.as_str() {
                "-l" => lines_only = true,
                "-w" => words_only = true,
                "-c" => bytes_only = true,
                other => files.push(other),
            }
        }
        let all = !lines_only && !words_only && !bytes_only;

        let mut out = String::new();
        let mut total = (0usize, 0usize, 0usize);

        let render = |lines: usize, words: usize, bytes: usize, name: Option<&str>, out: &mut String| {
            let mut fields = Vec::new();
            if all || lines_only {
                fields.push(lines.to_string());
            }
            if all || words_only {
                fields.push(words.to_string());
            }
            if all || bytes_only {
                fields.push(bytes.to_string());
            }
            out.push_str(&fields.join(" "));
            if let Some(name) = name {
                out.push(' ');
                out.push_str(name);
            }
            out.push('\n');
        };

        if files.is_empty() {
            let bytes = read_stdin(stdin).await;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let lines = split_lines(&text).len();
            let words = text.split_whitespace().count();
            render(lines, words, bytes.len(), None, &mut out);
        } else {
            for file in &files {
                let path = resolve(file, env);
                match read_all(&self.0, &path).await {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        let lines = split_lines(&text).len();
                        let words = text.split_whitespace().count();
                        total.0 += lines;
                        total.1 += words;
                        total.2 += bytes.len();
                        render(lines, words, bytes.len(), Some(&path), &mut out);
                    }
                    Err(e) => out.push_str(&format!("wc: {path}: {e}\n")),
                }
            }
            if files.len() > 1 {
                render(total.0, total.1, total.2, Some("total"), &mut out);
            }
        }

        Ok(reader_of(out.into_bytes()))
    }
}

enum Edge {
    Head,
    Tail,
}

async fn take_lines(
    facade: &VirtualOs,
    args: &[String],
    stdin: Option<ByteReader>,
    env: &Environment,
    edge: Edge,
) -> Vec<u8> {
    let mut count = 10usize;
    let mut files: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "-n" {
            if let Some(n) = args.get(i + 1).and_then(|s| s.parse().ok()) {
                count = n;
            }
            i += 2;
        } else {
            files.push(&args[i]);
            i += 1;
        }
    }

    let text = if files.is_empty() {
        String::from_utf8_lossy(&read_stdin(stdin).await).into_owned()
    } else {
        let path = resolve(files[0], env);
        match read_all(facade, &path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => return format!("{path}: {e}\n").into_bytes(),
        }
    };

    let lines = split_lines(&text);
    let selected: Vec<&str> = match edge {
        Edge::Head => lines.iter().take(count).copied().collect(),
        Edge::Tail => lines.iter().rev().take(count).rev().copied().collect(),
    };

    let mut out = selected.join("\n");
    if !selected.is_empty() {
        out.push('\n');
    }
    out.into_bytes()
}

pub struct Head(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Head {
    async fn call(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        Ok(reader_of(take_lines(&self.0, &args, stdin, env, Edge::Head).await))
    }
}

pub struct Tail(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Tail {
    async fn call(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        Ok(reader_of(take_lines(&self.0, &args, stdin, env, Edge::Tail).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_substitution() {
        let (pattern, replacement, global) = parse_substitution("s/foo/bar/").unwrap();
        assert_eq!(pattern, "foo");
        assert_eq!(replacement, "bar");
        assert!(!global);
    }

    #[test]
    fn parses_global_flag() {
        let (_, _, global) = parse_substitution("s/foo/bar/g").unwrap();
        assert!(global);
    }

    #[test]
    fn escaped_delimiter_survives() {
        let (pattern, _, _) = parse_substitution(r"s/a\/b/c/").unwrap();
        assert_eq!(pattern, "a/b");
    }
}
