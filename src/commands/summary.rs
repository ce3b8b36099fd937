// File: summary.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use wafcompare::report::{ReportGenerator, SummaryReport};
use wafcompare::store::ResultStore;

use super::{print_error, print_success};
use crate::cli::{Cli, SummaryArgs};

pub fn execute(cli: &Cli, args: &SummaryArgs) -> Result<bool> {
    let Some(format) = args.parse_format() else {
        print_error(&format!("Unsupported format: {}", args.format));
        return Ok(false);
    };

    let db_path = cli.db_path();
    let store = ResultStore::open_existing(&db_path)
        .with_context(|| format!("cannot open result store {}", db_path.display()))?;
    let report = SummaryReport {
        snapshot: store.snapshot()?,
        metrics: store.detection_metrics()?,
    };

    match &args.output {
        Some(path) => {
            ReportGenerator::generate_report(&report, path, format)
                .with_context(|| format!("cannot write {}", path.display()))?;
            print_success(&format!("Summary saved to: {}", path.display()));
        }
        None => println!("{}", ReportGenerator::render(&report, format)),
    }
    Ok(true)
}
