//! Classification worker pool.
//!
//! `ingest` pushes drafts onto a bounded queue; a fixed set of workers pulls
//! them off and runs extraction and routing, so callers never wait on a
//! router pass unless they ask to.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{RoutingOutcome, TieringEngine};
use crate::error::{StrataError, StrataResult};
use crate::types::ItemDraft;

/// One queued classification.
pub(crate) struct ClassifyJob {
    pub id: String,
    pub draft: ItemDraft,
    /// Receives the outcome when the caller is waiting.
    pub ack: Option<oneshot::Sender<StrataResult<RoutingOutcome>>>,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<ClassifyJob>>>;

pub(crate) struct ClassificationPool {
    sender: Mutex<Option<mpsc::Sender<ClassifyJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl ClassificationPool {
    /// Spawn `workers` tasks on the current Tokio runtime.
    pub fn start(engine: Weak<TieringEngine>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| tokio::spawn(worker_loop(worker, engine.clone(), receiver.clone())))
            .collect();

        debug!(workers = workers.max(1), capacity, "Classification pool started");
        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            capacity: capacity.max(1),
        }
    }

    /// Queue a job, waiting for room when the queue is full.
    pub async fn submit(&self, job: ClassifyJob) -> StrataResult<()> {
        let sender = {
            let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        let sender = sender.ok_or_else(|| StrataError::Internal("classification pool is shut down".to_string()))?;
        sender
            .send(job)
            .await
            .map_err(|_| StrataError::Internal("classification workers stopped".to_string()))
    }

    /// Jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .map(|s| self.capacity - s.capacity())
            .unwrap_or(0)
    }

    /// Close the queue and wait for workers to drain it.
    pub async fn shutdown(&self) {
        let sender = {
            let mut guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        drop(sender);

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        let count = handles.len();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Classification worker panicked");
            }
        }
        info!(workers = count, "Classification pool stopped");
    }
}

async fn worker_loop(worker: usize, engine: Weak<TieringEngine>, receiver: SharedReceiver) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };
        let Some(engine) = engine.upgrade() else {
            break;
        };

        let result = engine.classify(&job.id, job.draft).await;
        match &result {
            Ok(outcome) => engine.health().record_success("classification", outcome.routed_at),
            Err(e) => {
                error!(worker, item_id = %job.id, error = %e, "Classification failed");
                engine.health().record_failure("classification", e, engine.now());
            }
        }
        if let Some(ack) = job.ack {
            let _ = ack.send(result);
        }
    }
    debug!(worker, "Classification worker stopped");
}
