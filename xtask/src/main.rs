use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod tasks;

#[derive(Parser)]
#[command(
    name = "burn-hierarchy",
    about = "Hierarchical classification loss toolkit",
    author,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a JSON nested array into a NumPy .npy file
    TransformData(tasks::transform_data::TransformDataArgs),
    /// Validate a label map and print its level layout
    Inspect(tasks::inspect::InspectArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::TransformData(args) => tasks::transform_data::run(args),
        Commands::Inspect(args) => tasks::inspect::run(args),
    }
}
