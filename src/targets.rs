// File: targets.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::config::{DomainProfile, RunConfig};
use crate::error::{Result, WafError};
use crate::headers::Transport;
use crate::payload::DatasetType;
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// A filter under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub base_url: String,
    pub transport: Transport,
}

impl Target {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport: Transport::Multiplexed,
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Joins the base URL with a recorded relative URL.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetsFile {
    Map(HashMap<String, String>),
    List(Vec<TargetEntry>),
}

#[derive(Deserialize)]
struct TargetEntry {
    name: String,
    url: String,
    #[serde(default)]
    http1_only: bool,
}

/// Targets with a one-to-one name and base URL mapping.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: Target) -> Result<()> {
        if target.name.trim().is_empty() {
            return Err(WafError::Config("target name must not be empty".to_string()));
        }
        if target.base_url.is_empty() {
            return Err(WafError::Config(format!(
                "target {} has no base URL",
                target.name
            )));
        }
        if self.by_name(&target.name).is_some() {
            return Err(WafError::Config(format!(
                "duplicate target name {}",
                target.name
            )));
        }
        if let Some(existing) = self.by_url(&target.base_url) {
            return Err(WafError::Config(format!(
                "targets {} and {} share base URL {}",
                existing.name, target.name, target.base_url
            )));
        }
        self.targets.push(target);
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let parsed: TargetsFile = serde_json::from_str(&text)
            .map_err(|e| WafError::Config(format!("{}: {}", path.display(), e)))?;

        let mut registry = Self::new();
        match parsed {
            TargetsFile::Map(map) => {
                let mut entries: Vec<_> = map.into_iter().collect();
                entries.sort();
                for (name, url) in entries {
                    registry.add(Target::new(name, url))?;
                }
            }
            TargetsFile::List(list) => {
                for entry in list {
                    let transport = if entry.http1_only {
                        Transport::Http1Only
                    } else {
                        Transport::Multiplexed
                    };
                    registry.add(Target::new(entry.name, entry.url).with_transport(transport))?;
                }
            }
        }
        Ok(registry)
    }

    /// Parses a `NAME=URL` command line value.
    pub fn add_pair(&mut self, pair: &str) -> Result<()> {
        let (name, url) = pair
            .split_once('=')
            .ok_or_else(|| WafError::Config(format!("expected NAME=URL, got {:?}", pair)))?;
        self.add(Target::new(name.trim(), url.trim()))
    }

    pub fn set_transport(&mut self, name: &str, transport: Transport) -> Result<()> {
        let target = self
            .targets
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| WafError::Config(format!("unknown target {}", name)))?;
        target.transport = transport;
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn by_url(&self, base_url: &str) -> Option<&Target> {
        let base_url = base_url.trim_end_matches('/');
        self.targets.iter().find(|t| t.base_url == base_url)
    }

    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Connection pools for one target: one client per dataset-type profile.
#[derive(Debug)]
pub struct TargetPool {
    target: Target,
    legitimate: reqwest::Client,
    malicious: reqwest::Client,
}

impl TargetPool {
    pub fn open(target: Target, config: &RunConfig) -> Result<Self> {
        let legitimate = build_client(&target, &config.profile(DatasetType::Legitimate))?;
        let malicious = build_client(&target, &config.profile(DatasetType::Malicious))?;
        debug!(
            "Opened connection pools for {} ({:?})",
            target.name, target.transport
        );
        Ok(Self {
            target,
            legitimate,
            malicious,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn client(&self, dataset_type: DatasetType) -> &reqwest::Client {
        match dataset_type {
            DatasetType::Legitimate => &self.legitimate,
            DatasetType::Malicious => &self.malicious,
        }
    }

    /// Drops the clients, which closes every pooled connection.
    pub fn close(self) {
        debug!("Closing connection pools for {}", self.target.name);
    }
}

fn build_client(target: &Target, profile: &DomainProfile) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(profile.connect_timeout)
        .pool_idle_timeout(profile.pool_timeout)
        .pool_max_idle_per_host(1000)
        .redirect(reqwest::redirect::Policy::none());
    if target.transport == Transport::Http1Only {
        builder = builder.http1_only();
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn registry_is_a_bijection() {
        let mut registry = TargetRegistry::new();
        registry.add(Target::new("alpha", "http://a.local/")).unwrap();
        registry.add(Target::new("beta", "http://b.local")).unwrap();

        assert_eq!(registry.by_url("http://a.local").unwrap().name, "alpha");
        assert_eq!(registry.by_name("beta").unwrap().base_url, "http://b.local");

        assert!(registry.add(Target::new("alpha", "http://c.local")).is_err());
        assert!(registry.add(Target::new("gamma", "http://a.local/")).is_err());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn parses_command_line_specs() {
        let mut registry = TargetRegistry::new();
        registry.add_pair("edge=http://127.0.0.1:8080").unwrap();
        assert_eq!(registry.names(), vec!["edge"]);
        assert!(registry.add_pair("no-separator").is_err());
        assert!(registry.add_pair("=http://x").is_err());
    }

    #[test]
    fn loads_map_and_list_files() {
        let dir = TempDir::new().unwrap();
        let map = dir.path().join("map.json");
        std::fs::write(&map, r#"{"b": "http://b", "a": "http://a"}"#).unwrap();
        let registry = TargetRegistry::from_file(&map).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);

        let list = dir.path().join("list.json");
        std::fs::write(
            &list,
            r#"[{"name": "bunker", "url": "http://bunker", "http1_only": true},
                {"name": "edge", "url": "http://edge"}]"#,
        )
        .unwrap();
        let registry = TargetRegistry::from_file(&list).unwrap();
        assert_eq!(
            registry.by_name("bunker").unwrap().transport,
            Transport::Http1Only
        );
        assert_eq!(
            registry.by_name("edge").unwrap().transport,
            Transport::Multiplexed
        );
    }

    #[test]
    fn url_for_joins_relative_path() {
        let target = Target::new("a", "http://a.local/");
        assert_eq!(target.url_for("/x?y=1"), "http://a.local/x?y=1");
    }
}
