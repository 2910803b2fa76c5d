//! `jsonq`: a minimal dot-path query over a JSON document, in the spirit of
//! `jq` but covering only field/index navigation (no pipes, no filters).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use vos_provider::{ByteReader, Environment, VfsResult};
use vos_provider_memory::MemoryFunc;
use vos_vfs::VirtualOs;

use crate::util::{read_all, read_stdin, reader_of, resolve};

pub struct JsonQ(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for JsonQ {
    async fn call(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        let Some((query, files)) = args.split_first() else {
            return Ok(reader_of(b"usage: jsonq <.path.expr> [file]\n".to_vec()));
        };

        let bytes = if let Some(file) = files.first() {
            let path = resolve(file, env);
            match read_all(&self.0, &path).await {
                Ok(b) => b,
                Err(e) => return Ok(reader_of(format!("jsonq: {path}: {e}\n").into_bytes())),
            }
        } else {
            read_stdin(stdin).await
        };

        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => return Ok(reader_of(format!("jsonq: invalid JSON: {e}\n").into_bytes())),
        };

        match navigate(&value, query) {
            Some(found) => {
                let rendered = match found {
                    Value::String(s) => s.clone(),
                    other => serde_json::to_string_pretty(other).unwrap_or_default(),
                };
                let mut out = rendered;
                out.push('\n');
                Ok(reader_of(out.into_bytes()))
            }
            None => Ok(reader_of(format!("jsonq: no match for {query}\n").into_bytes())),
        }
    }
}

/// Navigate `.a.b[2].c`-style paths. A leading `.` is optional; the empty
/// path (`"."` or `""`) returns the whole document.
fn navigate<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix('.').unwrap_or(path);
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for segment in split_segments(path) {
        match segment {
            Segment::Field(name) => current = current.get(name)?,
            Segment::Index(i) => current = current.get(i)?,
        }
    }
    Some(current)
}

enum Segment<'a> {
    Field(&'a str),
    Index(usize),
}

fn split_segments(path: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    for field_part in path.split('.') {
        let mut rest = field_part;
        if let Some(bracket) = rest.find('[') {
            let (name, tail) = rest.split_at(bracket);
            if !name.is_empty() {
                segments.push(Segment::Field(name));
            }
            rest = tail;
            while let Some(stripped) = rest.strip_prefix('[') {
                if let Some(end) = stripped.find(']') {
                    if let Ok(idx) = stripped[..end].parse::<usize>() {
                        segments.push(Segment::Index(idx));
                    }
                    rest = &stripped[end + 1..];
                } else {
                    break;
                }
            }
        } else if !rest.is_empty() {
            segments.push(Segment::Field(rest));
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigates_nested_fields() {
        let value: Value = serde_json::from_str(r#"{"a":{"b":"hi"}}"#).unwrap();
        assert_eq!(navigate(&value, ".a.b").unwrap(), "hi");
    }

    #[test]
    fn navigates_array_index() {
        let value: Value = serde_json::from_str(r#"{"items":[{"id":1},{"id":2}]}"#).unwrap();
        assert_eq!(navigate(&value, ".items[1].id").unwrap(), 2);
    }

    #[test]
    fn missing_path_is_none() {
        let value: Value = serde_json::from_str(r#"{"a":1}"#).unwrap();
        assert!(navigate(&value, ".b").is_none());
    }
}
