//! The POSIX-flavored shell engine (§4.9): lexing, the expansion pipeline,
//! structural parsing, command resolution, and execution, all driven
//! against a [`vos_vfs::VirtualOs`] façade rather than a real process table.

pub mod ast;
pub mod expand;
pub mod history;
pub mod lexer;
pub mod parser;
mod shell;

pub use history::HistoryEntry;
pub use shell::{Shell, ShellResult};
