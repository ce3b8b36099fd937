// File: lib.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::new_without_default)]

pub mod admission;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod headers;
pub mod health;
pub mod payload;
pub mod probe;
pub mod progress;
pub mod report;
pub mod runner;
pub mod sink;
pub mod store;
pub mod targets;

pub use error::{Result, WafError};

#[cfg(test)]
mod config_tests;
