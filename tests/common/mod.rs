// File: common/mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wafcompare::config::RunConfig;
use wafcompare::payload::DatasetType;
use wafcompare::runner::RunOptions;
use wafcompare::targets::{Target, TargetRegistry};

/// A data directory plus a store path inside one temp dir.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("Data")
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("out").join("waf_comparison.db")
    }

    pub fn write_dataset(&self, kind: &str, name: &str, payloads: &Value) -> PathBuf {
        let dir = self.data_dir().join(kind);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.json", name));
        std::fs::write(&path, serde_json::to_vec(payloads).unwrap()).unwrap();
        path
    }

    pub fn write_raw(&self, kind: &str, name: &str, raw: &str) -> PathBuf {
        let dir = self.data_dir().join(kind);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.json", name));
        std::fs::write(&path, raw).unwrap();
        path
    }

    pub fn options(&self) -> RunOptions {
        let mut options = RunOptions::new(self.data_dir(), self.db_path());
        options.skip_checks = true;
        options.show_progress = false;
        options
    }
}

pub fn get(url: &str) -> Value {
    json!({ "method": "GET", "url": url, "headers": {}, "data": "" })
}

pub fn post(url: &str, data: &str) -> Value {
    json!({
        "method": "POST",
        "url": url,
        "headers": { "Content-Type": "application/x-www-form-urlencoded" },
        "data": data
    })
}

/// Short timeouts and no retry delay so failing targets finish quickly.
pub fn fast_config() -> RunConfig {
    let mut config = RunConfig::new();
    for dt in DatasetType::ALL {
        config.set_timeouts(dt, Duration::from_millis(500), Duration::from_millis(500));
        config.set_write_timeout(dt, Duration::from_millis(500));
    }
    config.set_retry_base_delay(Duration::from_millis(1));
    config.set_batch_size(4);
    config.set_queue_capacity(4);
    config.set_smoke_shuffle(false);
    config
}

pub fn registry<N, U>(targets: &[(N, U)]) -> TargetRegistry
where
    N: AsRef<str>,
    U: AsRef<str>,
{
    let mut registry = TargetRegistry::new();
    for (name, url) in targets {
        registry
            .add(Target::new(name.as_ref(), url.as_ref()))
            .unwrap();
    }
    registry
}

/// A base URL nothing listens on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn row_count(db: &Path) -> u64 {
    wafcompare::store::ResultStore::open_existing(db)
        .unwrap()
        .count()
        .unwrap()
}
