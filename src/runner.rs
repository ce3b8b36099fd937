// File: runner.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Run orchestration.
//!
//! A run recreates the result table, plans every dataset file once, then
//! schedules one probe task per (payload, target) pair under the admission
//! limits. Whatever way dispatch ends, the tasks are joined or aborted, the
//! target pools are closed and the sink is drained before the run returns.

use crate::admission::{AdmissionController, Permit};
use crate::classifier::BlockClassifier;
use crate::config::{DomainProfile, RunConfig};
use crate::dataset::{discover, DatasetFile};
use crate::error::{Result, WafError};
use crate::executor::RequestExecutor;
use crate::health::{check_targets, CHECK_TIMEOUT};
use crate::payload::{DatasetType, Payload, PayloadSource, SourceMode};
use crate::probe::ProbeResult;
use crate::progress::RunProgress;
use crate::report::{log_snapshot, Snapshot};
use crate::sink::{ResultSink, SinkHandle, SinkStats};
use crate::store::ResultStore;
use crate::targets::{TargetPool, TargetRegistry};
use log::{error, info, warn};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub skip_checks: bool,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn new(data_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            db_path: db_path.into(),
            skip_checks: false,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// What a finished (or interrupted) run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub planned: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub transport_failures: u64,
    pub blocked: u64,
    pub failed_files: Vec<FailedFile>,
    pub interrupted: bool,
    pub elapsed: Duration,
    pub committed: u64,
    pub peak_inflight: usize,
    pub peak_legitimate: usize,
    pub peak_malicious: usize,
    pub snapshot: Option<Snapshot>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        !self.interrupted && self.failed_files.is_empty()
    }
}

enum PlannedPayloads {
    Cached(Vec<Arc<Payload>>),
    Streamed(PayloadSource),
}

struct FilePlan {
    file: Arc<DatasetFile>,
    count: u64,
    payloads: PlannedPayloads,
}

/// Everything a probe task needs, built once per run.
struct RunContext {
    admission: AdmissionController,
    executor: RequestExecutor,
    legitimate: DomainProfile,
    malicious: DomainProfile,
    pools: Vec<Arc<TargetPool>>,
    sink: SinkHandle,
    progress: RunProgress,
}

impl RunContext {
    fn profile(&self, dataset_type: DatasetType) -> &DomainProfile {
        match dataset_type {
            DatasetType::Legitimate => &self.legitimate,
            DatasetType::Malicious => &self.malicious,
        }
    }
}

pub struct Runner {
    config: Arc<RunConfig>,
    targets: TargetRegistry,
    options: RunOptions,
}

impl Runner {
    pub fn new(config: RunConfig, targets: TargetRegistry, options: RunOptions) -> Self {
        Self {
            config: Arc::new(config),
            targets,
            options,
        }
    }

    /// Runs until dispatch completes or Ctrl-C is received.
    pub async fn run(self) -> Result<RunReport> {
        self.run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Could not listen for Ctrl-C; the run cannot be interrupted");
                futures::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs until dispatch completes or `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        if self.targets.is_empty() {
            return Err(WafError::Config("no targets configured".to_string()));
        }
        info!(
            "Starting run: data dir {}, store {}, targets {}",
            self.options.data_dir.display(),
            self.options.db_path.display(),
            self.targets.names().join(", ")
        );

        let classifier = Arc::new(BlockClassifier::from_config(&self.config));
        if self.options.skip_checks {
            warn!("Skipping target health checks");
        } else {
            check_targets(self.targets.iter(), &classifier, CHECK_TIMEOUT).await?;
        }

        let store = ResultStore::open(&self.options.db_path)?;
        store.recreate()?;

        let files = discover(&self.options.data_dir)?;
        let (plans, failed_files) = plan_files(files, &self.config);
        let per_target: u64 = plans.iter().map(|p| p.count).sum();
        let planned = per_target * self.targets.len() as u64;
        info!(
            "Planned {} payloads x {} targets = {} exchanges",
            per_target,
            self.targets.len(),
            planned
        );

        let pools = self
            .targets
            .iter()
            .map(|t| TargetPool::open(t.clone(), &self.config).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let sink = ResultSink::spawn(
            store,
            self.config.batch_size(),
            self.config.queue_capacity(),
            self.config.sink_join_timeout(),
        )?;

        let ctx = Arc::new(RunContext {
            admission: AdmissionController::from_config(&self.config),
            executor: RequestExecutor::new(Arc::clone(&classifier), &self.config),
            legitimate: self.config.profile(DatasetType::Legitimate),
            malicious: self.config.profile(DatasetType::Malicious),
            pools,
            sink: sink.handle(),
            progress: RunProgress::new(
                planned,
                self.config.progress_interval(),
                self.options.show_progress,
            ),
        });

        let mut report = RunReport {
            planned,
            failed_files,
            ..RunReport::default()
        };
        let mut tasks = JoinSet::new();

        let outcome = tokio::select! {
            r = dispatch(&ctx, plans, &mut tasks, &mut report) => r,
            _ = shutdown => Err(WafError::Interrupted),
        };

        if let Err(e) = &outcome {
            match e {
                WafError::Interrupted => warn!("Run interrupted, shutting down"),
                other => error!("Dispatch stopped: {}", other),
            }
            ctx.admission.close();
            tasks.shutdown().await;
        }
        drop(tasks);

        let sink_outcome = release(ctx, &mut report, sink).await;
        report.snapshot = final_snapshot(&self.options.db_path);

        match (outcome, sink_outcome) {
            (Ok(()), Ok(())) => Ok(report),
            (Err(WafError::Interrupted), Ok(())) => {
                report.interrupted = true;
                Ok(report)
            }
            (Ok(()), Err(e)) => Err(e),
            // A producer only sees the closed queue; the writer knows why it closed.
            (Err(WafError::SinkClosed), Err(sink_err)) => Err(sink_err),
            (Err(e), sink) => {
                if let Err(sink_err) = sink {
                    error!("Result sink failed during shutdown: {}", sink_err);
                }
                Err(e)
            }
        }
    }
}

/// Counts or samples each file once. Files that fail are reported and skipped.
fn plan_files(files: Vec<DatasetFile>, config: &RunConfig) -> (Vec<FilePlan>, Vec<FailedFile>) {
    let mode = match config.smoke_n() {
        Some(limit) => SourceMode::Sampled {
            limit,
            shuffle: config.smoke_shuffle(),
        },
        None => SourceMode::Full {
            stream_threshold: config.stream_threshold(),
        },
    };

    let mut plans = Vec::with_capacity(files.len());
    let mut failed = Vec::new();
    for file in files {
        let source = PayloadSource::new(&file.path, mode);
        let planned = match mode {
            SourceMode::Sampled { .. } => source.payloads().and_then(|items| {
                items
                    .map(|p| p.map(Arc::new))
                    .collect::<Result<Vec<_>>>()
                    .map(|cached| (cached.len() as u64, PlannedPayloads::Cached(cached)))
            }),
            SourceMode::Full { .. } => source.payloads().and_then(|items| {
                let mut count = 0u64;
                for item in items {
                    item?;
                    count += 1;
                }
                Ok((count, PlannedPayloads::Streamed(source.clone())))
            }),
        };

        match planned {
            Ok((count, payloads)) => plans.push(FilePlan {
                file: Arc::new(file),
                count,
                payloads,
            }),
            Err(e) => {
                error!("Skipping dataset file {}: {}", file.path.display(), e);
                failed.push(FailedFile {
                    path: file.path,
                    reason: e.to_string(),
                });
            }
        }
    }
    (plans, failed)
}

async fn dispatch(
    ctx: &Arc<RunContext>,
    plans: Vec<FilePlan>,
    tasks: &mut JoinSet<Result<()>>,
    report: &mut RunReport,
) -> Result<()> {
    for plan in plans {
        let payloads: Box<dyn Iterator<Item = Result<Arc<Payload>>> + Send> = match plan.payloads {
            PlannedPayloads::Cached(cached) => Box::new(cached.into_iter().map(Ok)),
            PlannedPayloads::Streamed(source) => match source.payloads() {
                Ok(items) => Box::new(items.map(|p| p.map(Arc::new))),
                Err(e) => {
                    fail_file(report, &plan.file, e);
                    continue;
                }
            },
        };

        for payload in payloads {
            let payload = match payload {
                Ok(payload) => payload,
                Err(e) => {
                    fail_file(report, &plan.file, e);
                    break;
                }
            };

            for pool in &ctx.pools {
                let slot = ctx.admission.schedule().await?;
                while let Some(joined) = tasks.try_join_next() {
                    joined.map_err(|e| WafError::Task(e.to_string()))??;
                }

                let task_ctx = Arc::clone(ctx);
                let pool = Arc::clone(pool);
                let file = Arc::clone(&plan.file);
                let payload = Arc::clone(&payload);
                tasks.spawn(async move { probe(&task_ctx, &pool, &file, payload, slot).await });
                report.dispatched += 1;
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| WafError::Task(e.to_string()))??;
    }
    Ok(())
}

fn fail_file(report: &mut RunReport, file: &DatasetFile, e: WafError) {
    error!("Dataset file {} failed mid-run: {}", file.path.display(), e);
    report.failed_files.push(FailedFile {
        path: file.path.clone(),
        reason: e.to_string(),
    });
}

/// One exchange. `_slot` holds the global in-flight permit until the outcome
/// is enqueued.
async fn probe(
    ctx: &RunContext,
    pool: &TargetPool,
    file: &DatasetFile,
    payload: Arc<Payload>,
    _slot: Permit,
) -> Result<()> {
    let dataset_type = file.dataset_type;
    let outcome = {
        let _gate = ctx.admission.admit(dataset_type).await?;
        ctx.executor
            .execute(
                pool.client(dataset_type),
                pool.target(),
                &payload,
                ctx.profile(dataset_type),
            )
            .await
    };

    let result = ProbeResult::new(payload, pool.target(), file, outcome.classification);
    let (blocked, failed) = (result.blocked, result.is_failure());
    ctx.sink.submit(result).await?;
    ctx.progress.record(blocked, failed);
    Ok(())
}

/// Closes every pool and drains the sink. Runs on every exit path.
async fn release(ctx: Arc<RunContext>, report: &mut RunReport, sink: ResultSink) -> Result<()> {
    ctx.progress.finish();
    report.completed = ctx.progress.completed();
    report.blocked = ctx.progress.blocked();
    report.transport_failures = ctx.progress.failed();
    report.elapsed = ctx.progress.elapsed();
    report.peak_inflight = ctx.admission.inflight().peak();
    report.peak_legitimate = ctx.admission.gate(DatasetType::Legitimate).peak();
    report.peak_malicious = ctx.admission.gate(DatasetType::Malicious).peak();

    match Arc::try_unwrap(ctx) {
        Ok(ctx) => {
            for pool in ctx.pools {
                match Arc::try_unwrap(pool) {
                    Ok(pool) => pool.close(),
                    Err(pool) => warn!("Pool for {} still referenced at shutdown", pool.target().name),
                }
            }
        }
        Err(_) => warn!("Run context still referenced at shutdown"),
    }

    let stats: SinkStats = sink.stop().await?;
    report.committed = stats.committed;
    Ok(())
}

fn final_snapshot(db_path: &std::path::Path) -> Option<Snapshot> {
    let snapshot = ResultStore::open_existing(db_path).and_then(|store| store.snapshot());
    match snapshot {
        Ok(snapshot) => {
            log_snapshot(&snapshot);
            Some(snapshot)
        }
        Err(e) => {
            warn!("Could not read result snapshot: {}", e);
            None
        }
    }
}
