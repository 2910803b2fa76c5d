//! `tracing-subscriber` setup (§3.1 of the expanded spec), following the
//! entry-point idiom of `stencila-cli`'s own `logging::setup`: an
//! `EnvFilter` built from a minimum level plus an optional per-crate filter
//! string, written to stderr.

use clap::ValueEnum;
use eyre::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// The minimum `tracing` level to emit, settable from the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum LoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LoggingLevel {
    fn as_str(self) -> &'static str {
        match self {
            LoggingLevel::Trace => "trace",
            LoggingLevel::Debug => "debug",
            LoggingLevel::Info => "info",
            LoggingLevel::Warn => "warn",
            LoggingLevel::Error => "error",
        }
    }
}

/// Install the global `tracing` subscriber. `filter` adds fine-grained
/// per-crate overrides on top of `level` (e.g. `"reqwest=warn"`), mirroring
/// `stencila-cli`'s `--log-filter` flag.
pub fn setup(level: LoggingLevel, filter: &str) -> Result<()> {
    let directives = if filter.is_empty() {
        level.as_str().to_string()
    } else {
        format!("{},{}", level.as_str(), filter)
    };

    let env_filter = EnvFilter::builder()
        .parse(&directives)
        .wrap_err_with(|| format!("unable to parse logging filter: {directives}"))?;

    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    tracing::trace!("logging set up");
    Ok(())
}
