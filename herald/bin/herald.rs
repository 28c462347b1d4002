#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use herald::{Herald, config::find_config_file};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file, instead of searching `HERALD_CONFIG` and the default paths
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let herald = Herald::load(&config_path)?;

    if args.check {
        herald.check()?;
        println!("{}: configuration OK", config_path.display());
        return Ok(());
    }

    herald.run().await
}
