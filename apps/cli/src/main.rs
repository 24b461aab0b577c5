//! docsetgen CLI: offline docset builder for rendered Nix documentation.
//!
//! Turns per-revision HTML manuals into searchable Dash/Zeal docset
//! archives, one per revision.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
