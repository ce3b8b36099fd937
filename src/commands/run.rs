// File: run.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use wafcompare::config::RunConfig;
use wafcompare::runner::{RunOptions, RunReport, Runner};

use super::{format_duration, print_error, print_success, print_warning};
use crate::cli::{Cli, RunArgs};

pub async fn execute(cli: &Cli, args: &RunArgs) -> Result<bool> {
    let config = RunConfig::from_env();
    let targets = cli.target_registry().context("invalid target configuration")?;

    let mut options = RunOptions::new(&cli.data_dir, cli.db_path());
    options.skip_checks = args.skip_checks;
    options.show_progress = !cli.quiet;

    let report = Runner::new(config, targets, options)
        .run()
        .await
        .context("run failed")?;

    print_report(&report);
    Ok(report.is_clean())
}

fn print_report(report: &RunReport) {
    let line = format!(
        "{} of {} exchanges recorded in {} ({} blocked, {} transport failures)",
        report.committed,
        report.planned,
        format_duration(report.elapsed.as_millis() as u64),
        report.blocked,
        report.transport_failures
    );
    if report.interrupted {
        print_warning(&format!("Interrupted: {}", line));
    } else {
        print_success(&line);
    }
    for failed in &report.failed_files {
        print_error(&format!(
            "Dataset file {} was not processed: {}",
            failed.path.display(),
            failed.reason
        ));
    }
}
