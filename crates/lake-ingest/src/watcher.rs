//! Watch loop
//!
//! Snapshots a location at a fixed interval and hands every batch of new
//! names to an [`ArrivalSink`]. The first snapshot is dispatched whole.
//! Each non-empty batch runs on its own task so a slow pipeline does not
//! hold up the next tick.

use async_trait::async_trait;
use lake_common::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::snapshot::{diff, ArrivalBatch, Snapshot, Snapshotter};

/// Receives each batch of newly arrived names
#[async_trait]
pub trait ArrivalSink: Send + Sync {
    async fn dispatch(&self, batch: ArrivalBatch) -> Result<()>;
}

/// Whether a first snapshot has been taken yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Uninitialized,
    Steady { previous: Snapshot },
}

pub struct Watcher {
    snapshotter: Arc<dyn Snapshotter>,
    sink: Arc<dyn ArrivalSink>,
    interval: Duration,
    state: WatchState,
}

impl Watcher {
    pub fn new(snapshotter: Arc<dyn Snapshotter>, sink: Arc<dyn ArrivalSink>, interval: Duration) -> Self {
        Self {
            snapshotter,
            sink,
            interval,
            state: WatchState::Uninitialized,
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// Take one snapshot and advance the state.
    ///
    /// Returns the batch to dispatch, if any. A failed snapshot leaves the
    /// state untouched.
    pub async fn poll(&mut self) -> Option<ArrivalBatch> {
        let current = match self.snapshotter.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(location = %self.snapshotter.location(), error = %err, "Snapshot failed, skipping tick");
                return None;
            }
        };

        let batch = match &self.state {
            WatchState::Uninitialized => ArrivalBatch::from(&current),
            WatchState::Steady { previous } => diff(previous, &current),
        };
        self.state = WatchState::Steady { previous: current };

        (!batch.is_empty()).then_some(batch)
    }

    /// Run until `cancel` fires, then wait for in-flight dispatches
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            location = %self.snapshotter.location(),
            interval_secs = self.interval.as_secs(),
            "Watch loop started"
        );

        let mut in_flight = JoinSet::new();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Some(batch) = self.poll().await {
                info!(files = batch.len(), "New files detected");
                let sink = self.sink.clone();
                in_flight.spawn(async move {
                    let files = batch.len();
                    if let Err(err) = sink.dispatch(batch).await {
                        error!(files, error = %err, "Dispatch failed");
                    }
                });
            }

            while let Some(finished) = in_flight.try_join_next() {
                log_join(finished);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!(in_flight = in_flight.len(), "Watch loop stopping");
        while let Some(finished) = in_flight.join_next().await {
            log_join(finished);
        }
        info!("Watch loop stopped");
    }

    /// Spawn [`Watcher::run`] on its own task
    pub fn start(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

fn log_join(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        error!(error = %err, "Dispatch task panicked");
    }
}
