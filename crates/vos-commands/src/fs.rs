//! Namespace-inspecting commands: `ls`, `find`, `touch`.

use std::sync::Arc;

use async_trait::async_trait;
use vos_provider::{ByteReader, Environment, ListOptions, VfsResult};
use vos_provider_memory::MemoryFunc;
use vos_vfs::VirtualOs;

use crate::util::{read_all, reader_of, resolve};

pub struct Ls(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Ls {
    async fn call(&self, args: Vec<String>, _stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        let targets: Vec<String> = if args.is_empty() { vec![env.pwd().to_string()] } else { args };
        let multi = targets.len() > 1;
        let mut out = String::new();

        for target in &targets {
            let path = resolve(target, env);
            match self.0.list(&path, &ListOptions::default()).await {
                Ok(entries) => {
                    if multi {
                        out.push_str(&format!("{path}:\n"));
                    }
                    for entry in entries {
                        out.push_str(&entry.name);
                        if entry.is_dir {
                            out.push('/');
                        }
                        out.push('\n');
                    }
                }
                Err(e) => out.push_str(&format!("ls: {path}: {e}\n")),
            }
        }

        Ok(reader_of(out.into_bytes()))
    }
}

pub struct Touch(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Touch {
    async fn call(&self, args: Vec<String>, _stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        if args.is_empty() {
            return Ok(reader_of(b"usage: touch <path>...\n".to_vec()));
        }
        let mut out = String::new();
        for arg in &args {
            let path = resolve(arg, env);
            if let Err(e) = self.0.touch(&path).await {
                out.push_str(&format!("touch: {path}: {e}\n"));
            }
        }
        Ok(reader_of(out.into_bytes()))
    }
}

pub struct Cp(pub Arc<VirtualOs>);

#[async_trait]
impl MemoryFunc for Cp {
    async fn call(&self, args: Vec<String>, _stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        let Some((src, dest)) = args.first().zip(args.get(1)) else {
            return Ok(reader_of(b"usage: cp <src> <dest>\n".to_vec()));
        };
        let src_path = resolve(src, env);
        let dest_path = resolve(dest, env);

        let bytes = match read_all(&self.0, &src_path).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(reader_of(format!("cp: {src_path}: {e}\n").into_bytes())),
        };

        // A destination ending in `/` must already exist as a directory; cp
        // never creates one (the ambiguity this resolves is recorded in
        // DESIGN.md).
        let target = if dest.ends_with('/') {
            match self.0.stat(&dest_path).await {
                Ok(entry) if entry.is_dir => vos_path::join(&dest_path, &vos_path::basename(&src_path)),
                Ok(_) => return Ok(reader_of(format!("cp: {dest_path}: not a directory\n").into_bytes())),
                Err(_) => return Ok(reader_of(format!("cp: {dest_path}: No such file or directory\n").into_bytes())),
            }
        } else {
            dest_path
        };

        match self.0.write(&target, reader_of(bytes)).await {
            Ok(()) => Ok(reader_of(Vec::new())),
            Err(e) => Ok(reader_of(format!("cp: {target}: {e}\n").into_bytes())),
        }
    }
}

pub struct Find(pub Arc<VirtualOs>);

impl Find {
    /// Depth-first walk, printing every entry (file or directory) whose name
    /// matches `name_pattern` (or all entries when no pattern was given).
    async fn walk(&self, path: &str, name_pattern: Option<&glob::Pattern>, out: &mut String) {
        let Ok(entries) = self.0.list(path, &ListOptions::default()).await else {
            return;
        };
        for entry in entries {
            let child = vos_path::join(path, &entry.name);
            let matches = name_pattern.map_or(true, |p| p.matches(&entry.name));
            if matches {
                out.push_str(&child);
                out.push('\n');
            }
            if entry.is_dir {
                Box::pin(self.walk(&child, name_pattern, out)).await;
            }
        }
    }
}

#[async_trait]
impl MemoryFunc for Find {
    async fn call(&self, args: Vec<String>, _stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        let mut start = env.pwd().to_string();
        let mut name_pattern = None;
        let mut i = 0;
        let mut positional_seen = false;

        while i < args.len() {
            match args[i].as_str() {
                "-name" if i + 1 < args.len() => {
                    name_pattern = glob::Pattern::new(&args[i + 1]).ok();
                    i += 2;
                }
                other if !positional_seen => {
                    start = resolve(other, env);
                    positional_seen = true;
                    i += 1;
                }
                _ => i += 1,
            }
        }

        let mut out = String::new();
        match self.0.stat(&start).await {
            Ok(_) => {
                out.push_str(&start);
                out.push('\n');
                self.walk(&start, name_pattern.as_ref(), &mut out).await;
            }
            Err(e) => out.push_str(&format!("find: {start}: {e}\n")),
        }

        Ok(reader_of(out.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use vos_provider_memory::MemoryProvider;

    fn facade() -> Arc<VirtualOs> {
        Arc::new(VirtualOs::new(Arc::new(MemoryProvider::new())))
    }

    fn env() -> Environment {
        let mut env = Environment::new();
        env.set("PWD", "/");
        env
    }

    #[tokio::test]
    async fn cp_to_plain_path_writes_exact_bytes() {
        let facade = facade();
        facade.write("/a.txt", Box::new(Cursor::new(b"hi".to_vec()))).await.unwrap();
        Cp(Arc::clone(&facade)).call(vec!["/a.txt".to_string(), "/b.txt".to_string()], None, &env()).await.unwrap();
        let mut f = facade.open("/b.txt").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn cp_to_trailing_slash_requires_existing_directory() {
        let facade = facade();
        facade.write("/a.txt", Box::new(Cursor::new(b"hi".to_vec()))).await.unwrap();
        let mut out = Cp(Arc::clone(&facade)).call(vec!["/a.txt".to_string(), "/missing/".to_string()], None, &env()).await.unwrap();
        let mut buf = Vec::new();
        use tokio::io::AsyncReadExt;
        out.read_to_end(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf).contains("No such file or directory"));
    }

    #[tokio::test]
    async fn cp_to_existing_directory_with_trailing_slash_uses_source_basename() {
        let facade = facade();
        facade.mkdir("/dest", vos_provider::Permission::RWX).await.unwrap();
        facade.write("/a.txt", Box::new(Cursor::new(b"hi".to_vec()))).await.unwrap();
        Cp(Arc::clone(&facade)).call(vec!["/a.txt".to_string(), "/dest/".to_string()], None, &env()).await.unwrap();
        let mut f = facade.open("/dest/a.txt").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"hi");
    }
}
