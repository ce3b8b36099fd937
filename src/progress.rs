// File: progress.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use log::info;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counters for one dispatch run, shared by every probe task.
#[derive(Debug)]
pub struct RunProgress {
    total: u64,
    completed: AtomicU64,
    blocked: AtomicU64,
    failed: AtomicU64,
    started: Instant,
    interval: Duration,
    last_log: Mutex<Instant>,
    bar: ProgressBar,
}

impl RunProgress {
    pub fn new(total: u64, interval: Duration, show_bar: bool) -> Self {
        let bar = if show_bar {
            ProgressBar::new(total)
        } else {
            ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden())
        };
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            bar.set_style(
                style
                    .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
                        let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                    })
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
        }
        let now = Instant::now();
        Self {
            total,
            completed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started: now,
            interval,
            last_log: Mutex::new(now),
            bar,
        }
    }

    /// Counts one finished exchange and emits the throttled progress line.
    pub fn record(&self, blocked: bool, failed: bool) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if blocked {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.bar.inc(1);

        if let Ok(mut last) = self.last_log.try_lock() {
            if last.elapsed() >= self.interval || done == self.total {
                *last = Instant::now();
                info!("Submitting & running payloads: {} / {}", done, self.total);
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
        info!(
            "{} of {} exchanges completed in {:.1}s ({} blocked, {} failed)",
            self.completed(),
            self.total,
            self.elapsed().as_secs_f64(),
            self.blocked(),
            self.failed()
        );
    }
}
