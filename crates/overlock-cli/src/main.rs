#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "overlock")]
#[command(author, version, about = "Lockfile dependency inspector for package overrides", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Report every occurrence of the given packages in the lockfile tree
    Search {
        /// Package names to look up
        #[arg(required = true)]
        targets: Vec<String>,

        /// Package manager whose lockfile to read (npm, pnpm, yarn)
        #[arg(long, default_value = "npm")]
        pm: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let cwd = match cli.cwd {
        Some(path) => path,
        None => std::env::current_dir().into_diagnostic()?,
    };

    match cli.command {
        Commands::Search { targets, pm } => commands::search::run(&pm, &cwd, &targets, cli.json),
    }
}
