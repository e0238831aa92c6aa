//! Space Engineers Blueprint Calculator
//!
//! Computes the components, ingots, ores and production time needed to
//! build a ship blueprint from scratch.

mod calculator;
mod db;
mod extract;
mod models;
mod normalize;
mod pipeline;
mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::pipeline::GameInstall;

#[derive(Parser)]
#[command(name = "se-calculator")]
#[command(about = "Material and time calculator for Space Engineers blueprints")]
#[command(version)]
struct Cli {
    /// Path to the ship blueprint (bp.sbc)
    blueprint: PathBuf,

    /// Steamapps directory containing the Space Engineers installation
    #[arg(
        short,
        long,
        env = "SE_STEAMAPPS_FOLDER",
        default_value = r"C:\Program Files (x86)\Steam\steamapps"
    )]
    steamapps_folder: PathBuf,

    /// Rebuild the component cost database from game files
    #[arg(short, long)]
    rebuild: bool,

    /// Path to the component cost database cache
    #[arg(short, long, default_value = "components_db.sqlite")]
    cache: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let request = extract::read_ship_blueprint(&cli.blueprint)
        .with_context(|| format!("Failed to read blueprint {}", cli.blueprint.display()))?;
    info!(
        "Blueprint {} contains {} kinds of blocks",
        cli.blueprint.display(),
        request.len()
    );

    let install = GameInstall {
        steamapps_folder: cli.steamapps_folder,
        cache_path: cli.cache,
    };
    let result = pipeline::run(&install, &request, cli.rebuild)?;

    print!("{}", report::summarize(&result));
    Ok(())
}
