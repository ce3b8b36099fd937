// File: executor.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::classifier::BlockClassifier;
use crate::config::{DomainProfile, RunConfig};
use crate::payload::Payload;
use crate::probe::Classification;
use crate::targets::Target;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Why a single attempt did not produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ConnectTimeout,
    ReadTimeout,
    /// Request write plus response head exceeded its deadline.
    Timeout,
    ProtocolReset,
    Other,
}

impl FailureKind {
    pub fn is_transient(&self) -> bool {
        !matches!(self, FailureKind::Other)
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            if err.is_connect() {
                FailureKind::ConnectTimeout
            } else {
                FailureKind::ReadTimeout
            }
        } else if is_protocol_reset(err) {
            FailureKind::ProtocolReset
        } else {
            FailureKind::Other
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::ConnectTimeout => "connect timeout",
            FailureKind::ReadTimeout => "read timeout",
            FailureKind::Timeout => "timeout",
            FailureKind::ProtocolReset => "protocol reset",
            FailureKind::Other => "request error",
        };
        f.write_str(s)
    }
}

fn is_protocol_reset(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_closed() {
                return true;
            }
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// Result of [`RequestExecutor::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub classification: Classification,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RequestExecutor {
    classifier: Arc<BlockClassifier>,
    fast_block_detection: bool,
    retry_base_delay: Duration,
    rate_limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl RequestExecutor {
    pub fn new(classifier: Arc<BlockClassifier>, config: &RunConfig) -> Self {
        let rate_limiter = NonZeroU32::new(config.rate_limit())
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));
        Self {
            classifier,
            fast_block_detection: config.fast_block_detection(),
            retry_base_delay: config.retry_base_delay(),
            rate_limiter,
        }
    }

    pub fn classifier(&self) -> &BlockClassifier {
        &self.classifier
    }

    /// Sends `payload` to `target` and classifies the answer. Never fails:
    /// exhausted retries and permanent errors become a `status = 0` outcome.
    pub async fn execute(
        &self,
        client: &reqwest::Client,
        target: &Target,
        payload: &Payload,
        profile: &DomainProfile,
    ) -> ExchangeOutcome {
        let url = target.url_for(&payload.url);
        let mut attempts = 0;
        loop {
            attempts += 1;
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            match self.attempt(client, target, &url, payload, profile).await {
                Ok(classification) => {
                    return ExchangeOutcome {
                        classification,
                        attempts,
                    }
                }
                Err(kind) if kind.is_transient() && attempts <= profile.retries => {
                    debug!(
                        "{} {} attempt {} failed ({}), retrying",
                        target.name, url, attempts, kind
                    );
                    tokio::time::sleep(self.retry_base_delay.saturating_mul(attempts)).await;
                }
                Err(kind) => {
                    debug!(
                        "{} {} gave up after {} attempt(s): {}",
                        target.name, url, attempts, kind
                    );
                    return ExchangeOutcome {
                        classification: Classification::failed(),
                        attempts,
                    };
                }
            }
        }
    }

    async fn attempt(
        &self,
        client: &reqwest::Client,
        target: &Target,
        url: &str,
        payload: &Payload,
        profile: &DomainProfile,
    ) -> Result<Classification, FailureKind> {
        let method = Method::from_bytes(payload.method.as_bytes()).map_err(|_| FailureKind::Other)?;

        let mut headers = HeaderMap::new();
        for (name, value) in payload.headers.wire_headers(target.transport) {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| FailureKind::Other)?;
            let value = HeaderValue::from_str(value).map_err(|_| FailureKind::Other)?;
            headers.append(name, value);
        }

        let mut request = client.request(method, url).headers(headers);
        if let Some(body) = &payload.body {
            request = request.body(body.clone());
        }

        let mut response = match timeout(profile.head_timeout(), request.send()).await {
            Err(_) => return Err(FailureKind::Timeout),
            Ok(Err(e)) => return Err(FailureKind::from_reqwest(&e)),
            Ok(Ok(response)) => response,
        };
        let status = response.status().as_u16();

        if self.fast_block_detection && !profile.inspect_body {
            return Ok(Classification::new(
                status,
                self.classifier.is_block_status(status),
                "",
            ));
        }

        if self.classifier.is_block_status(status) {
            return Ok(Classification::new(status, true, ""));
        }

        let mut peek = self.classifier.body_peek();
        loop {
            match timeout(profile.read_timeout, response.chunk()).await {
                Err(_) => break,
                Ok(Ok(Some(chunk))) => {
                    if chunk.is_empty() || peek.push(&chunk) {
                        break;
                    }
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) if e.is_timeout() => break,
                Ok(Err(e)) => return Err(FailureKind::from_reqwest(&e)),
            }
        }

        let (blocked, text) = peek.classify(&self.classifier);
        Ok(Classification::new(status, blocked, text))
    }
}
