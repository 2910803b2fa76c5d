use clap::Parser;
use eyre::Result;

mod cli;
mod logging;

use cli::Cli;

/// Main entry function
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup(cli.log_level, &cli.log_filter)?;

    let code = cli.run().await?;
    std::process::exit(code);
}
