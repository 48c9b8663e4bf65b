mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "echelle", about = "Echelle spectrograph background light correction")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure and subtract the background of a single-fiber frame
    Fit(commands::fit::FitArgs),
    /// Subtract matched, rescaled backgrounds from a multi-fiber frame
    Match(commands::match_cmd::MatchArgs),
    /// Show the contents of a stored background (.bkg)
    Info(commands::info::InfoArgs),
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Fit(args) => commands::fit::run(args),
        Commands::Match(args) => commands::match_cmd::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
