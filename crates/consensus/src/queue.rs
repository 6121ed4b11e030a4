//! Named single-worker task queues.
//!
//! Every queue owns one spawned worker that runs jobs strictly in enqueue
//! order, so jobs on the same queue never overlap. A failing or panicking
//! job is logged and the worker moves on.

use crate::error::{ConsensusError, ConsensusResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

enum Message {
    Run(BoxFuture<'static, ConsensusResult<()>>),
    Barrier(oneshot::Sender<()>),
}

/// Handle to a serialized queue. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Message>,
    completed: Arc<AtomicU64>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("completed", &self.completed())
            .finish()
    }
}

impl TaskQueue {
    /// Starts a queue and its worker. Must be called inside a tokio runtime.
    pub fn start(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (sender, receiver) = mpsc::unbounded_channel();
        let completed = Arc::new(AtomicU64::new(0));
        tokio::spawn(run_worker(name.clone(), receiver, completed.clone()));
        debug!(queue = %name, "Started task queue");
        Self {
            name,
            sender,
            completed,
        }
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs finished so far, including failed ones.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Schedules `job` after everything already queued.
    pub fn enqueue<F>(&self, job: F) -> ConsensusResult<()>
    where
        F: Future<Output = ConsensusResult<()>> + Send + 'static,
    {
        self.sender
            .send(Message::Run(job.boxed()))
            .map_err(|_| ConsensusError::QueueClosed(self.name.to_string()))
    }

    /// Resolves once every job enqueued before this call has finished.
    pub async fn wait_idle(&self) -> ConsensusResult<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Message::Barrier(tx))
            .map_err(|_| ConsensusError::QueueClosed(self.name.to_string()))?;
        rx.await
            .map_err(|_| ConsensusError::QueueClosed(self.name.to_string()))
    }
}

async fn run_worker(
    name: Arc<str>,
    mut receiver: mpsc::UnboundedReceiver<Message>,
    completed: Arc<AtomicU64>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Run(job) => {
                match AssertUnwindSafe(job).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(queue = %name, error = %err, "Queued task failed"),
                    Err(_) => error!(queue = %name, "Queued task panicked"),
                }
                completed.fetch_add(1, Ordering::AcqRel);
            }
            Message::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(queue = %name, "Task queue stopped");
}

/// Creates and hands out queues by name.
#[derive(Default)]
pub struct TaskQueueManager {
    queues: RwLock<HashMap<String, TaskQueue>>,
}

impl TaskQueueManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue called `name`, started on first use.
    pub fn queue(&self, name: &str) -> TaskQueue {
        if let Some(queue) = self.queues.read().get(name) {
            return queue.clone();
        }
        self.queues
            .write()
            .entry(name.to_string())
            .or_insert_with(|| TaskQueue::start(name))
            .clone()
    }

    /// Schedules `job` on the queue called `name`.
    pub fn enqueue<F>(&self, name: &str, job: F) -> ConsensusResult<()>
    where
        F: Future<Output = ConsensusResult<()>> + Send + 'static,
    {
        self.queue(name).enqueue(job)
    }

    /// Names of the queues started so far.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }
}
