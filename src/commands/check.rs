// File: check.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use wafcompare::classifier::BlockClassifier;
use wafcompare::config::RunConfig;
use wafcompare::health::{check_targets, CHECK_TIMEOUT};
use wafcompare::WafError;

use super::{print_error, print_success};
use crate::cli::Cli;

pub async fn execute(cli: &Cli) -> Result<bool> {
    let config = RunConfig::from_env();
    let targets = cli.target_registry().context("invalid target configuration")?;
    if targets.is_empty() {
        print_error("No targets configured");
        return Ok(false);
    }

    let classifier = BlockClassifier::from_config(&config);
    match check_targets(targets.iter(), &classifier, CHECK_TIMEOUT).await {
        Ok(()) => {
            print_success(&format!("All {} targets passed", targets.len()));
            Ok(true)
        }
        Err(WafError::Preflight(failures)) => {
            for failure in &failures {
                print_error(&failure.to_string());
            }
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
