//! The ordinary exec functions a shell expects on its `PATH` (§1: "ordinary
//! exec functions registered on an in-memory provider"): `ls`, `cat`,
//! `grep`, `sed`, `wc`, `find`, `jsonq`, `head`, `tail`, `touch`, `cp`,
//! `true`, `false`. None of this is part of the core design: it exists so
//! the shell has collaborators to resolve through `PATH`.

mod fs;
mod json;
mod status;
mod text;
mod util;

use std::sync::Arc;

use vos_provider_memory::MemoryProvider;
use vos_vfs::VirtualOs;

/// Register every built-in command at `/bin/<name>` on `provider`, the same
/// provider mounted at `facade`'s root (§4.4's `AddFunc`/`AddExecFunc`
/// registry). Call once at startup, before handing the façade to a shell.
pub fn register_builtins(provider: &MemoryProvider, facade: Arc<VirtualOs>) {
    provider.add_exec_func("/bin/ls", "ls - list directory contents\nUsage: ls [path...]", Arc::new(fs::Ls(Arc::clone(&facade))));
    provider.add_exec_func(
        "/bin/find",
        "find - walk the namespace\nUsage: find [path] [-name pattern]",
        Arc::new(fs::Find(Arc::clone(&facade))),
    );
    provider.add_exec_func("/bin/touch", "touch - create or update mtime\nUsage: touch <path>...", Arc::new(fs::Touch(Arc::clone(&facade))));
    provider.add_exec_func("/bin/cp", "cp - copy a file\nUsage: cp <src> <dest>", Arc::new(fs::Cp(Arc::clone(&facade))));

    provider.add_exec_func("/bin/cat", "cat - print file contents\nUsage: cat [file...]", Arc::new(text::Cat(Arc::clone(&facade))));
    provider.add_exec_func(
        "/bin/grep",
        "grep - print lines matching a pattern\nUsage: grep [-n] [-c] [-v] <pattern> [file...]",
        Arc::new(text::Grep(Arc::clone(&facade))),
    );
    provider.add_exec_func("/bin/sed", "sed - stream editor\nUsage: sed 's/pat/repl/[g]' [file...]", Arc::new(text::Sed(Arc::clone(&facade))));
    provider.add_exec_func("/bin/wc", "wc - count lines, words, bytes\nUsage: wc [-l] [-w] [-c] [file...]", Arc::new(text::Wc(Arc::clone(&facade))));
    provider.add_exec_func("/bin/head", "head - print the first lines\nUsage: head [-n N] [file]", Arc::new(text::Head(Arc::clone(&facade))));
    provider.add_exec_func("/bin/tail", "tail - print the last lines\nUsage: tail [-n N] [file]", Arc::new(text::Tail(Arc::clone(&facade))));

    provider.add_exec_func("/bin/jsonq", "jsonq - query a JSON document by dot path\nUsage: jsonq <.path> [file]", Arc::new(json::JsonQ(Arc::clone(&facade))));

    provider.add_exec_func("/bin/true", "true - succeed\nUsage: true", Arc::new(status::True));
    provider.add_exec_func("/bin/false", "false - fail\nUsage: false", Arc::new(status::False));
}
