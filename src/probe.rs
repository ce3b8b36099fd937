// File: probe.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::dataset::DatasetFile;
use crate::payload::{DatasetType, Payload};
use crate::targets::Target;
use chrono::Local;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Stored in place of a body when an exchange could not be completed.
pub const FAILURE_MARKER: &str = "REQUEST FAILED OR TIMED OUT";

static MACHINE_NAME: Lazy<String> = Lazy::new(|| {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
});

pub fn machine_name() -> &'static str {
    MACHINE_NAME.as_str()
}

/// What the executor learned from one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: u16,
    pub blocked: bool,
    pub body: String,
}

impl Classification {
    pub fn new(status: u16, blocked: bool, body: impl Into<String>) -> Self {
        Self {
            status,
            blocked,
            body: body.into(),
        }
    }

    pub fn failed() -> Self {
        Self::new(0, false, FAILURE_MARKER)
    }

    pub fn is_failure(&self) -> bool {
        self.status == 0
    }
}

/// The outcome of one payload sent to one target.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub payload: Arc<Payload>,
    pub target_name: String,
    pub destination_url: String,
    pub date_time: String,
    pub machine_name: String,
    pub test_name: String,
    pub dataset_type: DatasetType,
    pub dataset_label: String,
    pub status: u16,
    pub blocked: bool,
    pub body: String,
}

impl ProbeResult {
    pub fn new(
        payload: Arc<Payload>,
        target: &Target,
        file: &DatasetFile,
        classification: Classification,
    ) -> Self {
        Self {
            payload,
            target_name: target.name.clone(),
            destination_url: target.base_url.clone(),
            date_time: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            machine_name: machine_name().to_string(),
            test_name: file.test_name.clone(),
            dataset_type: file.dataset_type,
            dataset_label: file.type_label.clone(),
            status: classification.status,
            blocked: classification.blocked,
            body: classification.body,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == 0
    }
}
