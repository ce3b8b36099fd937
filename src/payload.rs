// File: payload.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::error::{Result, WafError};
use crate::headers::PayloadHeaders;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DatasetType {
    Legitimate,
    Malicious,
}

impl DatasetType {
    pub const ALL: [DatasetType; 2] = [DatasetType::Legitimate, DatasetType::Malicious];

    /// Derives the type from the name of the directory holding a dataset file.
    pub fn from_dir_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("malicious") {
            DatasetType::Malicious
        } else {
            DatasetType::Legitimate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Legitimate => "Legitimate",
            DatasetType::Malicious => "Malicious",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded request, replayed against every target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPayload")]
pub struct Payload {
    pub method: String,
    pub url: String,
    pub headers: PayloadHeaders,
    pub body: Option<Vec<u8>>,
}

impl Payload {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: PayloadHeaders::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: PayloadHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn body_text(&self) -> String {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct RawPayload {
    method: String,
    url: String,
    #[serde(default)]
    headers: Option<PayloadHeaders>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl From<RawPayload> for Payload {
    fn from(raw: RawPayload) -> Self {
        let body = match raw.data {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.into_bytes()),
            Some(other) => Some(other.to_string().into_bytes()),
        };
        Payload {
            method: raw.method,
            url: raw.url,
            headers: raw.headers.unwrap_or_default(),
            body,
        }
    }
}

/// How a file is read in full mode. Chosen once per file from its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    Streaming,
    WholeFile,
}

impl LoadStrategy {
    pub fn select(path: &Path, stream_threshold: u64) -> io::Result<Self> {
        let len = std::fs::metadata(path)?.len();
        Ok(if len >= stream_threshold {
            LoadStrategy::Streaming
        } else {
            LoadStrategy::WholeFile
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Full { stream_threshold: u64 },
    Sampled { limit: usize, shuffle: bool },
}

/// Lazy payload sequence for one dataset file. Every call to
/// [`PayloadSource::payloads`] reopens the file.
#[derive(Debug, Clone)]
pub struct PayloadSource {
    path: PathBuf,
    mode: SourceMode,
}

impl PayloadSource {
    pub fn new(path: impl Into<PathBuf>, mode: SourceMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn payloads(&self) -> Result<PayloadIter> {
        match self.mode {
            SourceMode::Full { stream_threshold } => {
                match LoadStrategy::select(&self.path, stream_threshold)? {
                    LoadStrategy::Streaming => {
                        let reader = BufReader::new(File::open(&self.path)?);
                        Ok(PayloadIter::Stream(PayloadStream::new(reader, &self.path)))
                    }
                    LoadStrategy::WholeFile => Ok(PayloadIter::Loaded(
                        load_all(&self.path)?.into_iter(),
                    )),
                }
            }
            SourceMode::Sampled { limit, shuffle } => {
                let mut all = load_all(&self.path)?;
                if shuffle {
                    all.shuffle(&mut rand::thread_rng());
                }
                all.truncate(limit);
                Ok(PayloadIter::Loaded(all.into_iter()))
            }
        }
    }
}

pub fn load_all(path: &Path) -> Result<Vec<Payload>> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| WafError::dataset(path, e))
}

pub enum PayloadIter {
    Stream(PayloadStream<BufReader<File>>),
    Loaded(std::vec::IntoIter<Payload>),
}

impl Iterator for PayloadIter {
    type Item = Result<Payload>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            PayloadIter::Stream(stream) => stream.next(),
            PayloadIter::Loaded(items) => items.next().map(Ok),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Start,
    First,
    Rest,
    Done,
}

/// Reads a top-level JSON array one element at a time.
pub struct PayloadStream<R> {
    reader: R,
    path: PathBuf,
    state: StreamState,
}

impl<R: BufRead> PayloadStream<R> {
    pub fn new(reader: R, path: &Path) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
            state: StreamState::Start,
        }
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.reader.fill_buf()?.first().copied())
    }

    fn skip_whitespace(&mut self) -> io::Result<Option<u8>> {
        loop {
            match self.peek()? {
                Some(b) if b.is_ascii_whitespace() => self.reader.consume(1),
                other => return Ok(other),
            }
        }
    }

    fn expect(&mut self, wanted: u8) -> std::result::Result<(), serde_json::Error> {
        match self.skip_whitespace().map_err(serde_json::Error::io)? {
            Some(b) if b == wanted => {
                self.reader.consume(1);
                Ok(())
            }
            Some(b) => Err(structural(format!(
                "expected `{}`, found `{}`",
                wanted as char, b as char
            ))),
            None => Err(structural(format!(
                "expected `{}`, found end of file",
                wanted as char
            ))),
        }
    }

    fn advance(&mut self) -> std::result::Result<Option<Payload>, serde_json::Error> {
        if self.state == StreamState::Start {
            self.expect(b'[')?;
            self.state = StreamState::First;
        }

        let next = self.skip_whitespace().map_err(serde_json::Error::io)?;
        if next == Some(b']') {
            self.reader.consume(1);
            self.state = StreamState::Done;
            return Ok(None);
        }
        if self.state == StreamState::Rest {
            self.expect(b',')?;
        }

        let mut de = serde_json::Deserializer::from_reader(&mut self.reader);
        let payload = Payload::deserialize(&mut de)?;
        self.state = StreamState::Rest;
        Ok(Some(payload))
    }
}

fn structural(msg: String) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(msg)
}

impl<R: BufRead> Iterator for PayloadStream<R> {
    type Item = Result<Payload>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == StreamState::Done {
            return None;
        }
        match self.advance() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => None,
            Err(e) => {
                self.state = StreamState::Done;
                Some(Err(WafError::dataset(&self.path, e)))
            }
        }
    }
}
