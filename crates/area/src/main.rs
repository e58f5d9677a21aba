// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Area - automation broker linking service actions to reactions.
//!
//! This is the binary entry point.

mod catalog;
mod serve;
mod status;

use std::path::PathBuf;

use area_config::AreaConfig;
use clap::{Parser, Subcommand};

/// Area - automation broker linking service actions to reactions.
#[derive(Parser, Debug)]
#[command(name = "area", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Without it the standard search path is used.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the API server and the evaluation engine.
    Serve,
    /// Create the database and apply pending migrations.
    Migrate,
    /// Print the built-in service catalog.
    Catalog {
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Check whether a server is answering on the configured address.
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> AreaConfig {
    let loaded = match path {
        Some(path) => area_config::load_and_validate_path(path),
        None => area_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            area_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(load_config(cli.config.as_ref())).await,
        Some(Commands::Migrate) => serve::run_migrate(&load_config(cli.config.as_ref())).await,
        Some(Commands::Catalog { json }) => catalog::run_catalog(json),
        Some(Commands::Status { json }) => status::run_status(&load_config(cli.config.as_ref()), json).await,
        None => {
            println!("area: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
