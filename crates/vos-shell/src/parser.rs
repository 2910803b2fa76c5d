//! Structural parsing (§4.9.3): here-doc extraction, then `;` → `&&`/`||` →
//! `|` → per-stage redirection extraction, with minimal brace-group support.

use crate::ast::{HereDoc, LogicalChain, LogicalOp, Pipeline, Redirect, RedirectKind, Sequence, Stage, Word};
use crate::lexer::{self, Tok};

const HEREDOC_MARK: char = '\u{1}';

/// Parse a (possibly multi-line, for here-doc bodies) chunk of shell input
/// into a [`Sequence`].
#[must_use]
pub fn parse(input: &str) -> Sequence {
    let (line, bodies) = extract_heredocs(input);
    let toks = lexer::tokenize(&line);
    build_sequence(&toks, &bodies)
}

/// Scan `input` for unquoted `<<DELIM` here-docs, replacing each with a
/// placeholder word the structural parser recognizes, and collecting the
/// literal body text consumed from the following physical lines.
fn extract_heredocs(input: &str) -> (String, Vec<HereDoc>) {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut out = String::new();
    let mut bodies = Vec::new();
    let mut in_single = false;
    let mut in_double = false;

    while i < chars.len() {
        let c = chars[i];

        if !in_single && !in_double && c == '<' && chars.get(i + 1) == Some(&'<') && chars.get(i + 2) != Some(&'<') {
            i += 2;
            while matches!(chars.get(i), Some(' ') | Some('\t')) {
                i += 1;
            }
            let mut delim = String::new();
            let mut expand = true;
            if matches!(chars.get(i), Some('\'') | Some('"')) {
                let q = chars[i];
                expand = false;
                i += 1;
                while i < chars.len() && chars[i] != q {
                    delim.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    i += 1;
                }
            } else {
                while i < chars.len() && !matches!(chars[i], ' ' | '\t' | '\n') {
                    delim.push(chars[i]);
                    i += 1;
                }
            }

            let mut rest_of_line = String::new();
            while i < chars.len() && chars[i] != '\n' {
                rest_of_line.push(chars[i]);
                i += 1;
            }
            if i < chars.len() {
                i += 1;
            }

            let mut body = String::new();
            loop {
                if i >= chars.len() {
                    break;
                }
                let mut body_line = String::new();
                while i < chars.len() && chars[i] != '\n' {
                    body_line.push(chars[i]);
                    i += 1;
                }
                let had_newline = i < chars.len();
                if had_newline {
                    i += 1;
                }
                if body_line.trim_end_matches('\r') == delim {
                    break;
                }
                body.push_str(&body_line);
                body.push('\n');
                if !had_newline {
                    break;
                }
            }

            let idx = bodies.len();
            bodies.push(HereDoc { body, expand });
            out.push_str("<< ");
            out.push(HEREDOC_MARK);
            out.push_str(&idx.to_string());
            out.push(' ');
            out.push_str(&rest_of_line);
            out.push('\n');
            continue;
        }

        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                out.push(c);
                i += 1;
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    (out, bodies)
}

fn is_word(tok: &Tok, text: &str) -> bool {
    matches!(tok, Tok::Word { raw, .. } if raw == text)
}

fn build_sequence(toks: &[Tok], bodies: &[HereDoc]) -> Sequence {
    let mut chains = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0i32;

    for tok in toks {
        if is_word(tok, "{") {
            depth += 1;
        } else if is_word(tok, "}") {
            depth -= 1;
        }
        if depth == 0 && matches!(tok, Tok::Semi) {
            if !current.is_empty() {
                chains.push(build_chain(&current, bodies));
            }
            current = Vec::new();
        } else {
            current.push(tok.clone());
        }
    }
    if !current.is_empty() {
        chains.push(build_chain(&current, bodies));
    }
    Sequence { chains }
}

fn build_chain(toks: &[Tok], bodies: &[HereDoc]) -> LogicalChain {
    let mut pipelines = Vec::new();
    let mut ops = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0i32;

    for tok in toks {
        if is_word(tok, "{") {
            depth += 1;
        } else if is_word(tok, "}") {
            depth -= 1;
        }
        match tok {
            Tok::And if depth == 0 => {
                pipelines.push(build_pipeline(&current, bodies));
                ops.push(LogicalOp::And);
                current = Vec::new();
            }
            Tok::Or if depth == 0 => {
                pipelines.push(build_pipeline(&current, bodies));
                ops.push(LogicalOp::Or);
                current = Vec::new();
            }
            _ => current.push(tok.clone()),
        }
    }
    pipelines.push(build_pipeline(&current, bodies));
    LogicalChain { pipelines, ops }
}

fn build_pipeline(toks: &[Tok], bodies: &[HereDoc]) -> Pipeline {
    let mut stages = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0i32;

    for tok in toks {
        if is_word(tok, "{") {
            depth += 1;
        } else if is_word(tok, "}") {
            depth -= 1;
        }
        if depth == 0 && matches!(tok, Tok::Pipe) {
            stages.push(build_stage(&current, bodies));
            current = Vec::new();
        } else {
            current.push(tok.clone());
        }
    }
    stages.push(build_stage(&current, bodies));
    Pipeline { stages }
}

fn build_stage(toks: &[Tok], bodies: &[HereDoc]) -> Stage {
    if let Some(first) = toks.first() {
        if is_word(first, "{") {
            if let Some(close_idx) = toks.iter().rposition(|t| is_word(t, "}")) {
                let inner = &toks[1..close_idx];
                let after = &toks[close_idx + 1..];
                let mut stage = Stage {
                    group: Some(Box::new(build_sequence(inner, bodies))),
                    ..Stage::default()
                };
                fill_stage(&mut stage, after, bodies);
                return stage;
            }
        }
    }

    let mut stage = Stage::default();
    fill_stage(&mut stage, toks, bodies);
    stage
}

fn fill_stage(stage: &mut Stage, toks: &[Tok], bodies: &[HereDoc]) {
    let mut i = 0;
    while i < toks.len() {
        match &toks[i] {
            Tok::Word { raw, quoted } => {
                if stage.group.is_none() {
                    stage.words.push(Word { raw: raw.clone(), quoted: *quoted });
                }
                i += 1;
            }
            Tok::HereDoc => {
                if let Some(Tok::Word { raw, .. }) = toks.get(i + 1) {
                    if let Some(idx) = raw.strip_prefix(HEREDOC_MARK).and_then(|s| s.parse::<usize>().ok()) {
                        if let Some(h) = bodies.get(idx) {
                            stage.stdin_heredoc = Some(h.clone());
                        }
                    }
                }
                i += 2;
            }
            Tok::RedirectOut | Tok::RedirectAppend | Tok::RedirectErr | Tok::RedirectErrAppend
            | Tok::RedirectBoth | Tok::RedirectBothAppend => {
                let kind = match &toks[i] {
                    Tok::RedirectOut => RedirectKind::StdoutOverwrite,
                    Tok::RedirectAppend => RedirectKind::StdoutAppend,
                    Tok::RedirectErr => RedirectKind::StderrOverwrite,
                    Tok::RedirectErrAppend => RedirectKind::StderrAppend,
                    Tok::RedirectBoth => RedirectKind::BothOverwrite,
                    Tok::RedirectBothAppend => RedirectKind::BothAppend,
                    _ => unreachable!(),
                };
                if let Some(Tok::Word { raw, .. }) = toks.get(i + 1) {
                    stage.redirects.push(Redirect { kind, target: raw.clone() });
                    i += 2;
                } else {
                    i += 1;
                }
            }
            Tok::RedirectErrToOut => {
                stage.redirects.push(Redirect {
                    kind: RedirectKind::StderrToStdout,
                    target: String::new(),
                });
                i += 1;
            }
            _ => i += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pipeline() {
        let seq = parse("cat a.txt | grep foo");
        assert_eq!(seq.chains.len(), 1);
        assert_eq!(seq.chains[0].pipelines[0].stages.len(), 2);
        assert_eq!(seq.chains[0].pipelines[0].stages[0].words[0].raw, "cat");
        assert_eq!(seq.chains[0].pipelines[0].stages[1].words[0].raw, "grep");
    }

    #[test]
    fn parses_and_or_semi_chains() {
        let seq = parse("a && b || c; d");
        let chain = &seq.chains[0];
        assert_eq!(chain.ops, vec![LogicalOp::And, LogicalOp::Or]);
        assert_eq!(chain.pipelines.len(), 3);
        assert_eq!(seq.chains[1].pipelines[0].stages[0].words[0].raw, "d");
    }

    #[test]
    fn extracts_redirects() {
        let seq = parse("cmd > out.txt 2>> err.txt");
        let stage = &seq.chains[0].pipelines[0].stages[0];
        assert_eq!(stage.words[0].raw, "cmd");
        assert_eq!(stage.redirects.len(), 2);
        assert_eq!(stage.redirects[0].kind, RedirectKind::StdoutOverwrite);
        assert_eq!(stage.redirects[0].target, "out.txt");
        assert_eq!(stage.redirects[1].kind, RedirectKind::StderrAppend);
    }

    #[test]
    fn extracts_heredoc_body_up_to_delimiter() {
        let seq = parse("cat << EOF\nline one\nline two\nEOF\n");
        let stage = &seq.chains[0].pipelines[0].stages[0];
        let heredoc = stage.stdin_heredoc.as_ref().unwrap();
        assert_eq!(heredoc.body, "line one\nline two\n");
        assert!(heredoc.expand);
    }

    #[test]
    fn quoted_heredoc_delimiter_suppresses_expansion() {
        let seq = parse("cat << 'EOF'\n$HOME\nEOF\n");
        let stage = &seq.chains[0].pipelines[0].stages[0];
        assert!(!stage.stdin_heredoc.as_ref().unwrap().expand);
    }

    #[test]
    fn brace_group_parses_inner_sequence() {
        let seq = parse("{ echo a; echo b; } > out.txt");
        let stage = &seq.chains[0].pipelines[0].stages[0];
        let group = stage.group.as_ref().unwrap();
        assert_eq!(group.chains.len(), 2);
        assert_eq!(stage.redirects.len(), 1);
    }
}
