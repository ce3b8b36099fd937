// File: mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::Result;
use colored::*;

use crate::cli::{Cli, RunArgs, SummaryArgs};

pub mod check;
pub mod run;
pub mod summary;

pub async fn handle_run_command(cli: &Cli, args: &RunArgs) -> Result<bool> {
    run::execute(cli, args).await
}

pub async fn handle_check_command(cli: &Cli) -> Result<bool> {
    check::execute(cli).await
}

pub fn handle_summary_command(cli: &Cli, args: &SummaryArgs) -> Result<bool> {
    summary::execute(cli, args)
}

fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

fn format_duration(ms: u64) -> String {
    if ms >= 60000 {
        format!("{}m {:.1}s", ms / 60000, (ms % 60000) as f64 / 1000.0)
    } else if ms >= 1000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}
