// File: error.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::fmt;
use std::path::PathBuf;

/// A single failed pre-flight check against one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightFailure {
    pub target: String,
    pub reason: String,
}

impl fmt::Display for PreflightFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.reason)
    }
}

/// Run-level failures. Per-exchange failures never surface here; they are
/// folded into a `status = 0` outcome by the executor.
#[derive(Debug, thiserror::Error)]
pub enum WafError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset {}: {source}", path.display())]
    Dataset {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("result store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("pre-flight checks failed: {}", join_failures(.0))]
    Preflight(Vec<PreflightFailure>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("result sink is no longer accepting outcomes")]
    SinkClosed,

    #[error("result sink did not drain within {0:?}")]
    SinkTimeout(std::time::Duration),

    #[error("run interrupted")]
    Interrupted,

    #[error("probe task failed: {0}")]
    Task(String),
}

fn join_failures(failures: &[PreflightFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl WafError {
    pub fn dataset(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Dataset {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, WafError>;
