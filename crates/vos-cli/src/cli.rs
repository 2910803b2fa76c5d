//! CLI subcommands and global options (§3.3 of the expanded spec), following
//! the `clap` derive idiom of `stencila-cli`'s own `Cli`/`Command` pair, and
//! `Cli::run`'s role as the top-level, instrumented entry function called
//! after logging is set up.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use vos_provider::{Permission, Provider};
use vos_provider_hostfs::HostFsProvider;
use vos_provider_memory::MemoryProvider;
use vos_shell::Shell;
use vos_vfs::VirtualOs;

use crate::logging::LoggingLevel;

/// CLI flags and the entry point for the interactive shell loop.
#[derive(Debug, Parser)]
#[command(name = "vos", author, version, about = "An in-process virtual operating system shell")]
pub struct Cli {
    /// The minimum log level to output
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: LoggingLevel,

    /// A filter for log entries from other crates (e.g. `reqwest=info`)
    #[arg(long, default_value = "", global = true)]
    pub log_filter: String,

    /// Bind-mount a host directory into the namespace, `SRC[:DEST]`
    /// (DEST defaults to `/mnt/host`). May be repeated.
    #[arg(long = "mount", value_name = "SRC[:DEST]")]
    pub mounts: Vec<String>,

    /// The user name the shell session runs as; sets `$USER` and `$HOME`
    #[arg(long, default_value = "guest")]
    pub user: String,

    /// Run a single command line non-interactively instead of starting a
    /// REPL, exiting with its code
    #[arg(short = 'c', long = "command")]
    pub command: Option<String>,
}

impl Cli {
    /// Build the virtual OS, wire up the shell, and either run one command
    /// or start an interactive REPL over stdin/stdout.
    pub async fn run(self) -> Result<i32> {
        let root = Arc::new(MemoryProvider::new());
        let facade = Arc::new(VirtualOs::new(Arc::clone(&root) as Arc<dyn Provider>));
        vos_commands::register_builtins(&root, Arc::clone(&facade));

        for spec in &self.mounts {
            let (src, dest) = parse_mount(spec);
            let provider = HostFsProvider::new(src, Permission::RWX);
            facade.mount(&dest, Arc::new(provider))?;
        }

        let shell = Shell::new(Arc::clone(&facade), &self.user);
        shell.load_history().await;

        if let Some(command) = &self.command {
            let result = shell.execute(command).await;
            print!("{}", result.output);
            std::io::Write::flush(&mut std::io::stdout())?;
            return Ok(result.code);
        }

        self.run_repl(&shell).await
    }

    async fn run_repl(&self, shell: &Shell) -> Result<i32> {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        let mut last_code = 0;

        loop {
            let env = shell.env_snapshot();
            let prompt = format!("{}@vos:{}$ ", env.user(), env.pwd());
            stdout.write_all(prompt.as_bytes()).await?;
            stdout.flush().await?;

            let Some(line) = stdin.next_line().await? else {
                stdout.write_all(b"\n").await?;
                break;
            };

            let trimmed = line.trim();
            if trimmed == "exit" || trimmed == "quit" {
                break;
            }

            let result = shell.execute(&line).await;
            stdout.write_all(result.output.as_bytes()).await?;
            stdout.flush().await?;
            last_code = result.code;
        }

        Ok(last_code)
    }
}

/// Split a `SRC[:DEST]` mount spec, defaulting `DEST` to `/mnt/host`.
fn parse_mount(spec: &str) -> (PathBuf, String) {
    match spec.split_once(':') {
        Some((src, dest)) => (PathBuf::from(src), dest.to_string()),
        None => (PathBuf::from(spec), "/mnt/host".to_string()),
    }
}
