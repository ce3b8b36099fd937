// File: health.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::classifier::BlockClassifier;
use crate::error::{PreflightFailure, Result, WafError};
use crate::headers::Transport;
use crate::targets::Target;
use futures::future::join_all;
use log::{error, info};
use std::time::Duration;

pub const CHECK_TIMEOUT: Duration = Duration::from_secs(3);
pub const XSS_PROBE: &str = "/?a=<script>alert(1)</script>";

/// Verifies every target answers and blocks a trivial XSS probe.
/// All failures are collected before returning.
pub async fn check_targets<'a, I>(targets: I, classifier: &BlockClassifier, timeout: Duration) -> Result<()>
where
    I: IntoIterator<Item = &'a Target>,
{
    let checks = targets
        .into_iter()
        .map(|target| check_target(target, classifier, timeout));
    let failures: Vec<PreflightFailure> = join_all(checks)
        .await
        .into_iter()
        .flat_map(|r| r.err())
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(WafError::Preflight(failures))
    }
}

async fn check_target(
    target: &Target,
    classifier: &BlockClassifier,
    timeout: Duration,
) -> std::result::Result<(), PreflightFailure> {
    let fail = |reason: String| {
        error!("Health check failed for {}: {}", target.name, reason);
        PreflightFailure {
            target: target.name.clone(),
            reason,
        }
    };

    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none());
    if target.transport == Transport::Http1Only {
        builder = builder.http1_only();
    }
    let client = builder
        .build()
        .map_err(|e| fail(format!("could not build client: {}", e)))?;

    let status = client
        .get(&target.base_url)
        .send()
        .await
        .map_err(|e| fail(format!("unreachable: {}", e)))?
        .status()
        .as_u16();
    if status != 200 {
        return Err(fail(format!("expected status 200, got {}", status)));
    }

    let response = client
        .get(target.url_for(XSS_PROBE))
        .send()
        .await
        .map_err(|e| fail(format!("XSS probe failed: {}", e)))?;
    let status = response.status().as_u16();
    let body = if classifier.is_block_status(status) {
        String::new()
    } else {
        response.text().await.unwrap_or_default()
    };
    if !classifier.is_blocked(status, &body) {
        return Err(fail(format!(
            "should block basic XSS, got status {}",
            status
        )));
    }

    info!("Health check passed for {}", target.name);
    Ok(())
}
