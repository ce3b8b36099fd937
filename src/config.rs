// File: config.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::payload::DatasetType;
use log::warn;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BLOCK_STATUS: [u16; 3] = [403, 406, 429];

pub const DEFAULT_BLOCK_PHRASES: [&str; 5] = [
    "The requested URL was rejected. Please consult with your administrator.",
    "Request blocked by",
    "Access denied",
    "ModSecurity Action",
    "403 Forbidden",
];

/// Timeouts, retry budget and concurrency for one dataset type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainProfile {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// How long an idle pooled connection is kept (`HTTP_POOL_TIMEOUT`).
    /// reqwest has no deadline for waiting on a free pooled connection.
    pub pool_timeout: Duration,
    pub retries: u32,
    pub inspect_body: bool,
    pub concurrency: usize,
}

impl DomainProfile {
    /// Upper bound for sending the request and receiving the response head.
    pub fn head_timeout(&self) -> Duration {
        self.write_timeout.saturating_add(self.read_timeout)
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    fast_block_detection: bool,
    block_status: BTreeSet<u16>,
    block_phrases: Vec<String>,
    peek_bytes: usize,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    pool_timeout: Duration,
    mal_connect_timeout: Duration,
    mal_read_timeout: Duration,
    mal_write_timeout: Duration,
    retries: u32,
    mal_retries: u32,
    retry_base_delay: Duration,
    max_inflight: usize,
    concurrency: usize,
    mal_concurrency: usize,
    batch_size: usize,
    queue_capacity: usize,
    sink_join_timeout: Duration,
    smoke_n: Option<usize>,
    smoke_shuffle: bool,
    progress_interval: Duration,
    rate_limit: u32,
    stream_threshold: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self {
            fast_block_detection: true,
            block_status: DEFAULT_BLOCK_STATUS.into_iter().collect(),
            block_phrases: DEFAULT_BLOCK_PHRASES.iter().map(|p| p.to_string()).collect(),
            peek_bytes: 2048,
            connect_timeout: Duration::from_secs(4),
            read_timeout: Duration::from_secs(6),
            write_timeout: Duration::from_secs(4),
            pool_timeout: Duration::from_secs(4),
            mal_connect_timeout: Duration::from_secs(4),
            mal_read_timeout: Duration::from_secs(10),
            mal_write_timeout: Duration::from_secs(4),
            retries: 0,
            mal_retries: 1,
            retry_base_delay: Duration::from_millis(50),
            max_inflight: 5000,
            concurrency: 800,
            mal_concurrency: 25,
            batch_size: 10_000,
            queue_capacity: 10_000,
            sink_join_timeout: Duration::from_secs(30),
            smoke_n: None,
            smoke_shuffle: true,
            progress_interval: Duration::from_secs(5),
            rate_limit: 0,
            stream_threshold: 1024 * 1024,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an environment-style lookup. Missing or
    /// unparsable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        let env = EnvReader { lookup: &lookup };

        config.fast_block_detection =
            env.flag("FAST_BLOCK_DETECTION", config.fast_block_detection);

        if let Some(raw) = env.raw("BLOCK_STATUS") {
            match parse_status_list(&raw) {
                Some(set) => config.block_status = set,
                None => warn!(
                    "Ignoring invalid BLOCK_STATUS {:?}, using {:?}",
                    raw, DEFAULT_BLOCK_STATUS
                ),
            }
        }

        if let Some(raw) = env.raw("BLOCK_PHRASES") {
            config.block_phrases.extend(
                raw.split("||")
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }

        config.peek_bytes = env.positive("PEEK_BYTES", config.peek_bytes);

        config.connect_timeout = env.seconds("HTTP_CONNECT_TIMEOUT", config.connect_timeout);
        config.read_timeout = env.seconds("HTTP_READ_TIMEOUT", config.read_timeout);
        config.write_timeout = env.seconds("HTTP_WRITE_TIMEOUT", config.write_timeout);
        config.pool_timeout = env.seconds("HTTP_POOL_TIMEOUT", config.pool_timeout);

        config.mal_connect_timeout = env.seconds("MAL_HTTP_CONNECT_TIMEOUT", config.connect_timeout);
        config.mal_read_timeout = env.seconds("MAL_HTTP_READ_TIMEOUT", config.mal_read_timeout);
        config.mal_write_timeout = env.seconds("MAL_HTTP_WRITE_TIMEOUT", config.write_timeout);

        config.retries = env.number("HTTP_RETRIES", config.retries);
        config.mal_retries = env.number("MAL_HTTP_RETRIES", config.mal_retries);
        config.retry_base_delay = Duration::from_millis(
            env.number("RETRY_BASE_DELAY_MS", config.retry_base_delay.as_millis() as u64),
        );

        config.max_inflight = env.positive("ASYNC_MAX_INFLIGHT", config.max_inflight);
        config.concurrency = env.positive("ASYNC_CONCURRENCY", config.concurrency);
        config.mal_concurrency = env.positive("MALICIOUS_CONCURRENCY", config.mal_concurrency);

        config.batch_size = env.positive("SINK_BATCH_SIZE", config.batch_size);
        config.queue_capacity = env.positive("SINK_QUEUE_CAPACITY", config.queue_capacity);
        config.sink_join_timeout = env.seconds("SINK_JOIN_TIMEOUT", config.sink_join_timeout);

        let smoke_n: usize = env.number("SMOKE_N", 0);
        config.smoke_n = (smoke_n > 0).then_some(smoke_n);
        config.smoke_shuffle = env.flag("SMOKE_SHUFFLE", config.smoke_shuffle);

        config.progress_interval = env.seconds("PROGRESS_INTERVAL", config.progress_interval);
        config.rate_limit = env.number("RATE_LIMIT", config.rate_limit);
        config.stream_threshold = env.number("STREAM_THRESHOLD_BYTES", config.stream_threshold);

        config
    }

    pub fn profile(&self, dataset_type: DatasetType) -> DomainProfile {
        match dataset_type {
            DatasetType::Legitimate => DomainProfile {
                connect_timeout: self.connect_timeout,
                read_timeout: self.read_timeout,
                write_timeout: self.write_timeout,
                pool_timeout: self.pool_timeout,
                retries: self.retries,
                inspect_body: !self.fast_block_detection,
                concurrency: self.concurrency,
            },
            DatasetType::Malicious => DomainProfile {
                connect_timeout: self.mal_connect_timeout,
                read_timeout: self.mal_read_timeout,
                write_timeout: self.mal_write_timeout,
                pool_timeout: self.pool_timeout,
                retries: self.mal_retries,
                inspect_body: true,
                concurrency: self.mal_concurrency,
            },
        }
    }

    pub fn fast_block_detection(&self) -> bool {
        self.fast_block_detection
    }

    pub fn set_fast_block_detection(&mut self, fast_block_detection: bool) {
        self.fast_block_detection = fast_block_detection;
    }

    pub fn block_status(&self) -> &BTreeSet<u16> {
        &self.block_status
    }

    pub fn block_phrases(&self) -> &[String] {
        &self.block_phrases
    }

    pub fn peek_bytes(&self) -> usize {
        self.peek_bytes
    }

    pub fn set_peek_bytes(&mut self, peek_bytes: usize) {
        self.peek_bytes = peek_bytes.max(1);
    }

    pub fn set_timeouts(&mut self, dataset_type: DatasetType, connect: Duration, read: Duration) {
        match dataset_type {
            DatasetType::Legitimate => {
                self.connect_timeout = connect;
                self.read_timeout = read;
            }
            DatasetType::Malicious => {
                self.mal_connect_timeout = connect;
                self.mal_read_timeout = read;
            }
        }
    }

    pub fn set_write_timeout(&mut self, dataset_type: DatasetType, write: Duration) {
        match dataset_type {
            DatasetType::Legitimate => self.write_timeout = write,
            DatasetType::Malicious => self.mal_write_timeout = write,
        }
    }

    pub fn set_retries(&mut self, dataset_type: DatasetType, retries: u32) {
        match dataset_type {
            DatasetType::Legitimate => self.retries = retries,
            DatasetType::Malicious => self.mal_retries = retries,
        }
    }

    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    pub fn set_retry_base_delay(&mut self, delay: Duration) {
        self.retry_base_delay = delay;
    }

    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }

    pub fn set_max_inflight(&mut self, max_inflight: usize) {
        self.max_inflight = max_inflight.max(1);
    }

    pub fn set_concurrency(&mut self, dataset_type: DatasetType, concurrency: usize) {
        match dataset_type {
            DatasetType::Legitimate => self.concurrency = concurrency.max(1),
            DatasetType::Malicious => self.mal_concurrency = concurrency.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn set_queue_capacity(&mut self, queue_capacity: usize) {
        self.queue_capacity = queue_capacity.max(1);
    }

    pub fn sink_join_timeout(&self) -> Duration {
        self.sink_join_timeout
    }

    pub fn smoke_n(&self) -> Option<usize> {
        self.smoke_n
    }

    pub fn set_smoke_n(&mut self, smoke_n: Option<usize>) {
        self.smoke_n = smoke_n.filter(|n| *n > 0);
    }

    pub fn smoke_shuffle(&self) -> bool {
        self.smoke_shuffle
    }

    pub fn set_smoke_shuffle(&mut self, smoke_shuffle: bool) {
        self.smoke_shuffle = smoke_shuffle;
    }

    pub fn progress_interval(&self) -> Duration {
        self.progress_interval
    }

    pub fn set_progress_interval(&mut self, interval: Duration) {
        self.progress_interval = interval;
    }

    pub fn set_sink_join_timeout(&mut self, timeout: Duration) {
        self.sink_join_timeout = timeout;
    }

    pub fn set_rate_limit(&mut self, per_second: u32) {
        self.rate_limit = per_second;
    }

    pub fn rate_limit(&self) -> u32 {
        self.rate_limit
    }

    pub fn stream_threshold(&self) -> u64 {
        self.stream_threshold
    }

    pub fn set_stream_threshold(&mut self, stream_threshold: u64) {
        self.stream_threshold = stream_threshold;
    }
}

fn parse_status_list(raw: &str) -> Option<BTreeSet<u16>> {
    let mut set = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        set.insert(part.parse::<u16>().ok()?);
    }
    Some(set)
}

struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "y"),
            None => default,
        }
    }

    fn number<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Copy + std::fmt::Debug,
    {
        match self.raw(key) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid {}={:?}, using {:?}", key, v, default);
                default
            }),
            None => default,
        }
    }

    fn positive(&self, key: &str, default: usize) -> usize {
        match self.number(key, default) {
            0 => {
                warn!("{} must be greater than zero, using {}", key, default);
                default
            }
            n => n,
        }
    }

    fn seconds(&self, key: &str, default: Duration) -> Duration {
        let secs = self.number(key, default.as_secs_f64());
        match Duration::try_from_secs_f64(secs) {
            Ok(duration) if secs > 0.0 => duration,
            _ => {
                warn!("{} must be a positive number of seconds, using {:?}", key, default);
                default
            }
        }
    }
}
