//! Streaming file handles (§3, §9 "Streaming files").
//!
//! A file handle must expose a reader and optionally a seeker and/or
//! exec-invoker. Per the design notes this is modeled as an enum with one
//! variant per capability combination, rather than coupling the handle to
//! any specific backend: a host-directory file is `Seek`, an in-memory or
//! HTTP-polling file is plain `Read`, and a function-backed entry from the
//! in-memory provider is `Exec`.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::env::Environment;
use crate::error::{VfsError, VfsResult};

/// A boxed, owned byte stream.
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// A boxed, owned byte sink, used by providers that stream writes in.
pub type ByteWriter = Box<dyn AsyncWriteMarker>;

/// Marker alias so `ByteWriter` reads naturally; re-exported for providers
/// that need to name the bound directly.
pub trait AsyncWriteMarker: tokio::io::AsyncWrite + Send + Unpin {}
impl<T: tokio::io::AsyncWrite + Send + Unpin> AsyncWriteMarker for T {}

/// A file handle whose underlying stream also supports seeking.
pub trait SeekableFile: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableFile for T {}

/// Re-invokes a file handle as an executable, per §3: "Calling the
/// executable variant of a file without `Exec` being supported fails with
/// `ErrNotExecutable`."
#[async_trait]
pub trait Executor: Send + Sync {
    async fn exec(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader>;
}

enum FileKind {
    /// Base capability: read plus close.
    Read(ByteReader),
    /// Read plus seek (host-directory files).
    Seek(Box<dyn SeekableFile>),
    /// Read plus the ability to be invoked as an executable (function
    /// entries in the in-memory provider).
    Exec(ByteReader, Box<dyn Executor>),
}

/// A polymorphic handle with capability set `{read byte stream, close}`,
/// optionally extended with `{seek}` or `{execute with args and stdin}`.
///
/// Created by the provider that served it; owns the lifetime of its
/// underlying reader (dropping it releases any resources the provider held).
pub struct VfsFile {
    path: String,
    kind: FileKind,
}

impl VfsFile {
    #[must_use]
    pub fn from_reader(path: impl Into<String>, reader: ByteReader) -> Self {
        VfsFile {
            path: path.into(),
            kind: FileKind::Read(reader),
        }
    }

    #[must_use]
    pub fn from_seekable(path: impl Into<String>, file: Box<dyn SeekableFile>) -> Self {
        VfsFile {
            path: path.into(),
            kind: FileKind::Seek(file),
        }
    }

    #[must_use]
    pub fn from_executable(
        path: impl Into<String>,
        help_doc: ByteReader,
        executor: Box<dyn Executor>,
    ) -> Self {
        VfsFile {
            path: path.into(),
            kind: FileKind::Exec(help_doc, executor),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read into `buf`, returning the number of bytes read (0 at EOF).
    pub async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = match &mut self.kind {
            FileKind::Read(r) => r.read(buf).await,
            FileKind::Seek(r) => r.read(buf).await,
            FileKind::Exec(r, _) => r.read(buf).await,
        };
        n.map_err(|e| VfsError::io(self.path.clone(), e))
    }

    /// Read the entire remaining stream into memory.
    pub async fn read_to_end(&mut self) -> VfsResult<Vec<u8>> {
        let mut buf = Vec::new();
        let n = match &mut self.kind {
            FileKind::Read(r) => r.read_to_end(&mut buf).await,
            FileKind::Seek(r) => r.read_to_end(&mut buf).await,
            FileKind::Exec(r, _) => r.read_to_end(&mut buf).await,
        };
        n.map_err(|e| VfsError::io(self.path.clone(), e))?;
        Ok(buf)
    }

    /// Seek within the stream, failing with `NotSupported` when the handle
    /// was not opened as seekable.
    pub async fn seek(&mut self, pos: std::io::SeekFrom) -> VfsResult<u64> {
        match &mut self.kind {
            FileKind::Seek(r) => r
                .seek(pos)
                .await
                .map_err(|e| VfsError::io(self.path.clone(), e)),
            _ => Err(VfsError::not_supported(self.path.clone(), "seek")),
        }
    }

    /// Invoke the file as an executable with `args` and an optional stdin
    /// stream. Fails with [`VfsError::NotExecutable`] unless the handle was
    /// opened with [`VfsFile::from_executable`].
    pub async fn exec(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        match &self.kind {
            FileKind::Exec(_, executor) => executor.exec(args, stdin, env).await,
            _ => Err(VfsError::NotExecutable {
                path: self.path.clone(),
            }),
        }
    }

    /// Close the handle. Resources are released on drop regardless; this
    /// exists so callers can observe close-time errors for backends that
    /// flush on close (none of the bundled providers do).
    pub async fn close(self) -> VfsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn read_variant_reads_bytes() {
        let mut f = VfsFile::from_reader("/x", Box::new(Cursor::new(b"hello".to_vec())));
        let bytes = f.read_to_end().await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn read_variant_rejects_seek_and_exec() {
        let mut f = VfsFile::from_reader("/x", Box::new(Cursor::new(b"hi".to_vec())));
        assert!(f.seek(std::io::SeekFrom::Start(0)).await.is_err());
        assert!(f.exec(vec![], None, &Environment::new()).await.is_err());
    }

    struct Echo;
    #[async_trait]
    impl Executor for Echo {
        async fn exec(&self, args: Vec<String>, _stdin: Option<ByteReader>, _env: &Environment) -> VfsResult<ByteReader> {
            Ok(Box::new(Cursor::new(args.join(" ").into_bytes())))
        }
    }

    #[tokio::test]
    async fn exec_variant_invokes_executor() {
        let f = VfsFile::from_executable(
            "/bin/echo",
            Box::new(Cursor::new(b"help".to_vec())),
            Box::new(Echo),
        );
        let mut out = f.exec(vec!["a".into(), "b".into()], None, &Environment::new()).await.unwrap();
        let mut buf = Vec::new();
        out.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"a b");
    }

    #[tokio::test]
    async fn seekable_file_can_seek() {
        let mut f = VfsFile::from_seekable("/x", Box::new(Cursor::new(b"0123456789".to_vec())));
        f.seek(std::io::SeekFrom::Start(5)).await.unwrap();
        let rest = f.read_to_end().await.unwrap();
        assert_eq!(rest, b"56789");
    }
}
