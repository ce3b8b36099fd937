// File: main.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use simple_logger::SimpleLogger;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    if let Err(e) = SimpleLogger::new().with_level(cli.level_filter()).init() {
        eprintln!("Could not initialise logging: {}", e);
    }

    let outcome = match &cli.command {
        None => commands::handle_run_command(&cli, &RunArgs::default()).await,
        Some(Commands::Run(args)) => commands::handle_run_command(&cli, args).await,
        Some(Commands::Check) => commands::handle_check_command(&cli).await,
        Some(Commands::Summary(args)) => commands::handle_summary_command(&cli, args),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
