//! `true` and `false` (§8 S9): fixed exit codes, no output.

use async_trait::async_trait;
use vos_provider::{ByteReader, Environment, VfsError, VfsResult};
use vos_provider_memory::MemoryFunc;

use crate::util::reader_of;

pub struct True;

#[async_trait]
impl MemoryFunc for True {
    async fn call(&self, _args: Vec<String>, _stdin: Option<ByteReader>, _env: &Environment) -> VfsResult<ByteReader> {
        Ok(reader_of(Vec::new()))
    }
}

pub struct False;

/// `Exec` carries no exit code (§4.3: "no exit code is carried at this
/// layer"), only success or error. `false` signals its non-zero status as
/// an error with an empty message; the shell recognizes that shape and
/// reports it as a silent failure rather than printing `false: `
/// (see DESIGN.md).
#[async_trait]
impl MemoryFunc for False {
    async fn call(&self, _args: Vec<String>, _stdin: Option<ByteReader>, _env: &Environment) -> VfsResult<ByteReader> {
        Err(VfsError::Other { message: String::new() })
    }
}
