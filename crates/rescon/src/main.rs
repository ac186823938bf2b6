// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! rescon - resource container host.
//!
//! Loads the bundles named in a descriptor file and serves the resources
//! they register until interrupted.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod inspect;
mod run;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// rescon - resource container host.
#[derive(Parser, Debug)]
#[command(name = "rescon", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the default search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Host the bundles of a descriptor file until interrupted.
    Run {
        /// Bundle descriptor file. Defaults to `container.descriptor_path`.
        #[arg(long)]
        descriptors: Option<PathBuf>,
    },
    /// Validate a bundle descriptor file.
    Check { path: PathBuf },
    /// Load a descriptor file, list the hosted bundles and resources, then stop.
    Bundles { path: PathBuf },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => rescon_config::load_and_validate_path(path),
        None => rescon_config::load_and_validate(),
    };
    let config = match config {
        Ok(config) => config,
        Err(errors) => {
            rescon_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Run { descriptors }) => {
            init_tracing(&config.container.log_level);
            if let Err(e) = run::run(config, descriptors).await {
                eprintln!("rescon: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Check { path }) => {
            if !inspect::check(&path) {
                std::process::exit(1);
            }
        }
        Some(Commands::Bundles { path }) => {
            init_tracing(&config.container.log_level);
            match inspect::live_bundles(config, path).await {
                Ok(report) => print!("{report}"),
                Err(e) => {
                    eprintln!("rescon: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("rescon: use --help for available commands");
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rescon={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
