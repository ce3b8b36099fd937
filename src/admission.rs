// File: admission.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Two independent limits on probe concurrency.
//!
//! The global in-flight cap bounds how many exchange tasks exist at all,
//! including tasks still waiting for their domain gate. Each dataset type
//! then has its own gate bounding how many of those tasks talk to the
//! network at once. Both are plain counting semaphores; permits release
//! on drop, so an exchange that fails still gives its slot back.

use crate::config::RunConfig;
use crate::error::{Result, WafError};
use crate::payload::DatasetType;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(current, Ordering::Relaxed);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Held while a task occupies a slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    occupancy: Arc<Occupancy>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.occupancy.leave();
    }
}

/// A counting gate with occupancy tracking.
#[derive(Debug)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    occupancy: Arc<Occupancy>,
}

impl Gate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            occupancy: Arc::new(Occupancy::default()),
        }
    }

    /// Waits for a free slot. Fails only once the gate has been closed.
    pub async fn acquire(&self) -> Result<Permit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WafError::Interrupted)?;
        self.occupancy.enter();
        Ok(Permit {
            _permit: permit,
            occupancy: Arc::clone(&self.occupancy),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.occupancy.current.load(Ordering::Relaxed)
    }

    /// Highest simultaneous occupancy seen so far.
    pub fn peak(&self) -> usize {
        self.occupancy.peak.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[derive(Debug)]
pub struct AdmissionController {
    inflight: Gate,
    legitimate: Gate,
    malicious: Gate,
}

impl AdmissionController {
    pub fn new(max_inflight: usize, legitimate: usize, malicious: usize) -> Self {
        Self {
            inflight: Gate::new(max_inflight),
            legitimate: Gate::new(legitimate),
            malicious: Gate::new(malicious),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.max_inflight(),
            config.profile(DatasetType::Legitimate).concurrency,
            config.profile(DatasetType::Malicious).concurrency,
        )
    }

    /// Reserves a task slot under the global cap. Called by the scheduler
    /// before a task is spawned; the permit moves into the task.
    pub async fn schedule(&self) -> Result<Permit> {
        self.inflight.acquire().await
    }

    /// Enters the domain gate for `dataset_type`. Called inside the task,
    /// right before the request is issued.
    pub async fn admit(&self, dataset_type: DatasetType) -> Result<Permit> {
        self.gate(dataset_type).acquire().await
    }

    pub fn gate(&self, dataset_type: DatasetType) -> &Gate {
        match dataset_type {
            DatasetType::Legitimate => &self.legitimate,
            DatasetType::Malicious => &self.malicious,
        }
    }

    pub fn inflight(&self) -> &Gate {
        &self.inflight
    }

    /// Wakes every waiter with an error. Used on shutdown.
    pub fn close(&self) {
        self.inflight.close();
        self.legitimate.close();
        self.malicious.close();
    }
}
