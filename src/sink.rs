// File: sink.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Single-writer result sink.
//!
//! Probe tasks push outcomes into a bounded queue; one dedicated thread owns
//! the store connection and commits them in batches. A full queue suspends
//! the producer, which is the only backpressure the dispatcher needs.

use crate::error::{Result, WafError};
use crate::probe::ProbeResult;
use crate::store::{ResultStore, StoredRow};
use log::{debug, error, info};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
enum SinkMessage {
    Record(Box<ProbeResult>),
    Stop,
}

/// Totals reported by the consumer when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub committed: u64,
    pub batches: u64,
}

/// Producer side of the sink. Cheap to clone, one per probe task.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<SinkMessage>,
}

impl SinkHandle {
    /// Enqueues one outcome, waiting while the queue is full.
    pub async fn submit(&self, result: ProbeResult) -> Result<()> {
        self.tx
            .send(SinkMessage::Record(Box::new(result)))
            .await
            .map_err(|_| WafError::SinkClosed)
    }
}

pub struct ResultSink {
    handle: SinkHandle,
    done: oneshot::Receiver<Result<SinkStats>>,
    join_timeout: Duration,
}

impl ResultSink {
    /// Moves `store` onto a dedicated writer thread and returns the running sink.
    pub fn spawn(
        store: ResultStore,
        batch_size: usize,
        queue_capacity: usize,
        join_timeout: Duration,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (done_tx, done) = oneshot::channel();
        let batch_size = batch_size.max(1);

        thread::Builder::new()
            .name("result-sink".to_string())
            .spawn(move || {
                let outcome = consume(store, rx, batch_size);
                let _ = done_tx.send(outcome);
            })?;

        info!(
            "Result sink started (batch size {}, queue capacity {})",
            batch_size, queue_capacity
        );
        Ok(Self {
            handle: SinkHandle { tx },
            done,
            join_timeout,
        })
    }

    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    /// Sends the stop marker and waits for the consumer to commit what it holds.
    pub async fn stop(self) -> Result<SinkStats> {
        let ResultSink {
            handle,
            done,
            join_timeout,
        } = self;

        let drained = async move {
            // A send error means the consumer already exited; its result is on `done`.
            let _ = handle.tx.send(SinkMessage::Stop).await;
            drop(handle);
            done.await
        };

        match tokio::time::timeout(join_timeout, drained).await {
            Err(_) => {
                error!("Result sink did not drain within {:?}", join_timeout);
                Err(WafError::SinkTimeout(join_timeout))
            }
            Ok(Err(_)) => Err(WafError::SinkClosed),
            Ok(Ok(outcome)) => {
                if let Ok(stats) = &outcome {
                    info!(
                        "Result sink stopped: {} outcomes in {} batches",
                        stats.committed, stats.batches
                    );
                }
                outcome
            }
        }
    }
}

fn consume(
    mut store: ResultStore,
    mut rx: mpsc::Receiver<SinkMessage>,
    batch_size: usize,
) -> Result<SinkStats> {
    store.tune_for_writing();
    let mut stats = SinkStats::default();
    let mut buffer: Vec<StoredRow> = Vec::with_capacity(batch_size);

    while let Some(message) = rx.blocking_recv() {
        match message {
            SinkMessage::Record(result) => {
                buffer.push(StoredRow::from(result.as_ref()));
                if buffer.len() >= batch_size {
                    commit(&mut store, &mut buffer, &mut stats)?;
                }
            }
            SinkMessage::Stop => {
                rx.close();
                // Anything enqueued before the close is still delivered.
                while let Ok(SinkMessage::Record(result)) = rx.try_recv() {
                    buffer.push(StoredRow::from(result.as_ref()));
                }
                break;
            }
        }
    }

    commit(&mut store, &mut buffer, &mut stats)?;
    Ok(stats)
}

fn commit(store: &mut ResultStore, buffer: &mut Vec<StoredRow>, stats: &mut SinkStats) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    match store.insert_batch(buffer) {
        Ok(n) => {
            stats.committed += n as u64;
            stats.batches += 1;
            debug!("Committed batch of {} outcomes ({} total)", n, stats.committed);
            buffer.clear();
            Ok(())
        }
        Err(e) => {
            error!("Failed to commit batch of {} outcomes: {}", buffer.len(), e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetFile;
    use crate::payload::Payload;
    use crate::probe::Classification;
    use crate::targets::Target;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn outcome(i: usize) -> ProbeResult {
        ProbeResult::new(
            Arc::new(Payload::new("GET", format!("/item/{}", i))),
            &Target::new("t", "http://t.local"),
            &DatasetFile::from_path(PathBuf::from("Data/Legitimate/items.json")),
            Classification::new(200, false, ""),
        )
    }

    #[tokio::test]
    async fn stop_commits_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("results.db");
        let sink = ResultSink::spawn(
            ResultStore::open(&db).unwrap(),
            100,
            8,
            Duration::from_secs(10),
        )
        .unwrap();

        let handle = sink.handle();
        for i in 0..5 {
            handle.submit(outcome(i)).await.unwrap();
        }
        drop(handle);

        let stats = sink.stop().await.unwrap();
        assert_eq!(stats.committed, 5);
        assert_eq!(stats.batches, 1);
        assert_eq!(ResultStore::open(&db).unwrap().count().unwrap(), 5);
    }

    #[tokio::test]
    async fn full_batches_commit_before_stop() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("results.db");
        let sink = ResultSink::spawn(
            ResultStore::open(&db).unwrap(),
            3,
            2,
            Duration::from_secs(10),
        )
        .unwrap();

        let handle = sink.handle();
        for i in 0..10 {
            handle.submit(outcome(i)).await.unwrap();
        }

        let stats = sink.stop().await.unwrap();
        assert_eq!(stats.committed, 10);
        assert_eq!(stats.batches, 4);
    }

    #[tokio::test]
    async fn submit_after_stop_is_rejected() {
        let sink = ResultSink::spawn(
            ResultStore::in_memory().unwrap(),
            10,
            4,
            Duration::from_secs(10),
        )
        .unwrap();
        let handle = sink.handle();
        sink.stop().await.unwrap();

        let err = handle.submit(outcome(0)).await.unwrap_err();
        assert!(matches!(err, WafError::SinkClosed));
    }
}
