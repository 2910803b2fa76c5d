//! The virtual OS façade crate (§4.3): `VirtualOs` is the single entry point
//! through which every other layer (the shell, the built-in commands, a
//! caller embedding the library directly) performs filesystem operations.
//! It owns the [`vos_mount::MountTable`] and never exposes a provider
//! directly.

mod events;
mod facade;

pub use events::{Event, Watcher};
pub use facade::VirtualOs;

pub use vos_mount::{MountInfo, MountTable, Resolved};
pub use vos_provider::{
    ByteReader, ByteWriter, Entry, Environment, ListOptions, Permission, Provider, SearchOptions,
    SearchResult, VfsError, VfsFile, VfsResult,
};
