// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Docket - operation-reliability core for a legal-practice chat bot.
//!
//! This is the binary entry point.

mod serve;
mod shutdown;

use clap::{Parser, Subcommand};

/// Docket - rate limiting, queuing and transactional rollback for bot commands.
#[derive(Parser, Debug)]
#[command(name = "docket", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the reliability services and run until SIGINT/SIGTERM.
    Serve,
    /// Validate configuration and print the effective settings as TOML.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match docket_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            docket_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                eprintln!("error: failed to render configuration: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("docket: use --help for available commands");
        }
    }
}
