//! Shared helpers for resolving arguments against the calling shell's
//! environment and reading/writing through the façade.

use vos_provider::{ByteReader, Environment, VfsResult};
use vos_vfs::VirtualOs;

/// Resolve `arg` against `env.pwd()` unless it is already absolute. Tilde
/// and variable expansion have already happened in the shell before the
/// argument reaches a command (§4.9.2); this only handles the remaining
/// relative-to-`PWD` case (§4.9.4 item 2).
#[must_use]
pub fn resolve(arg: &str, env: &Environment) -> String {
    if arg.starts_with('/') {
        vos_path::normalize(arg)
    } else {
        vos_path::join(env.pwd(), arg)
    }
}

pub async fn read_all(facade: &VirtualOs, path: &str) -> VfsResult<Vec<u8>> {
    let mut f = facade.open(path).await?;
    f.read_to_end().await
}

pub async fn read_stdin(stdin: Option<ByteReader>) -> Vec<u8> {
    let Some(mut reader) = stdin else {
        return Vec::new();
    };
    let mut buf = Vec::new();
    use tokio::io::AsyncReadExt;
    let _ = reader.read_to_end(&mut buf).await;
    buf
}

/// Split text into lines, preserving whether the final line carried a
/// trailing newline so callers can reassemble exactly what they read.
#[must_use]
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

pub fn ok(output: impl Into<String>) -> (Vec<u8>, i32) {
    (output.into().into_bytes(), 0)
}

pub fn err(output: impl Into<String>) -> (Vec<u8>, i32) {
    (output.into().into_bytes(), 1)
}

pub fn reader_of(bytes: Vec<u8>) -> ByteReader {
    Box::new(std::io::Cursor::new(bytes))
}
