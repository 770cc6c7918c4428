use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info};

use crate::backend::GenerationBackend;
use crate::error::BackendError;
use crate::models::{DispatchedRequest, GenerateRequest};

pub const DEFAULT_WORKERS: usize = 4;

// Bounded pool of tasks that run remote calls off the caller's task
pub struct WorkerPool {
    tx: mpsc::Sender<DispatchedRequest>,
    size: usize,
}

impl WorkerPool {
    // Spawn `size` workers on the current tokio runtime
    pub fn spawn(backend: Arc<dyn GenerationBackend>, size: usize) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel::<DispatchedRequest>(size * 16);
        let rx = Arc::new(Mutex::new(rx));

        for id in 0..size {
            let rx = Arc::clone(&rx);
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                worker(id, rx, backend).await;
            });
        }
        info!(workers = size, "worker pool started");

        Self { tx, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    // Queue a request and wait for its result
    pub async fn dispatch(&self, request: GenerateRequest) -> Result<String, BackendError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(DispatchedRequest { request, response_tx })
            .await
            .map_err(|_| BackendError::Remote("worker pool is shut down".to_string()))?;

        response_rx
            .await
            .map_err(|_| BackendError::Remote("worker failed to respond".to_string()))?
    }
}

// Each worker takes one job at a time from the shared queue
async fn worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DispatchedRequest>>>,
    backend: Arc<dyn GenerationBackend>,
) {
    loop {
        // Only hold the queue lock while waiting for the next job.
        let next = rx.lock().await.recv().await;
        let Some(job) = next else { break };

        // The caller timed out while the job sat in the queue.
        if job.response_tx.is_closed() {
            debug!(worker = id, "skipping request abandoned by its caller");
            continue;
        }

        let result = backend.complete(&job.request).await;
        // Receiver is gone when the caller timed out; the result is dropped.
        if job.response_tx.send(result).is_err() {
            debug!(worker = id, "caller went away before the result arrived");
        }
    }
    debug!(worker = id, "worker stopped");
}
