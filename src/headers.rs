// File: headers.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Recorded request headers.
//!
//! Payload headers are kept as an ordered, case-insensitive, duplicate-free
//! map. Headers that would break connection reuse or that the transport sets
//! on its own are dropped when the map is built, so every consumer sees the
//! same sanitized set.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Never forwarded, whatever the transport.
pub const ALWAYS_STRIPPED: &[&str] = &["host", "connection", "content-length"];

/// Hop-by-hop headers that are illegal on a multiplexed (HTTP/2) stream.
pub const HOP_BY_HOP: &[&str] = &["proxy-connection", "keep-alive", "transfer-encoding", "upgrade"];

/// Transport variant used for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// HTTP/2 where the server negotiates it, HTTP/1.1 otherwise.
    #[default]
    Multiplexed,
    /// Single-stream HTTP/1.1, for targets that stall under HTTP/2 load.
    Http1Only,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadHeaders {
    entries: Vec<(String, String)>,
}

impl PayloadHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header. A key already present under any casing keeps its
    /// position and takes the new value. Stripped keys are ignored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let lower = name.to_ascii_lowercase();
        if ALWAYS_STRIPPED.contains(&lower.as_str()) {
            return;
        }
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The header list actually put on the wire for `transport`.
    ///
    /// Multiplexed streams lose every hop-by-hop header. Single-stream
    /// connections keep them, and get an explicit `Connection: keep-alive`
    /// only when none is present.
    pub fn wire_headers(&self, transport: Transport) -> Vec<(&str, &str)> {
        match transport {
            Transport::Multiplexed => self
                .iter()
                .filter(|(k, _)| !is_hop_by_hop(k))
                .collect(),
            Transport::Http1Only => {
                let mut out: Vec<(&str, &str)> = self.iter().collect();
                if !out.iter().any(|(k, _)| is_hop_by_hop(k)) {
                    out.push(("Connection", "keep-alive"));
                }
                out
            }
        }
    }

    /// Compact JSON object text, in insertion order.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

impl<K, V> FromIterator<(K, V)> for PayloadHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

impl Serialize for PayloadHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PayloadHeaders {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = PayloadHeaders;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of header names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut headers = PayloadHeaders::new();
                while let Some((name, value)) = access.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    headers.insert(name, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}
