use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;

type Job = BoxFuture<'static, Result<()>>;

/// A named FIFO work queue drained by exactly one worker task
///
/// Items submitted to the same queue run one at a time in submission order.
/// A failing or panicking item is logged and the worker moves on.
pub struct TaskQueue {
    name: &'static str,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Submitted items that have not finished yet
    pending: Arc<AtomicUsize>,
}

impl TaskQueue {
    /// Create the queue and spawn its worker on the current tokio runtime
    pub fn new(name: &'static str) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);

        let worker = tokio::spawn(async move {
            debug!("Queue {} worker started", name);

            while let Some(job) = receiver.recv().await {
                match AssertUnwindSafe(job).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Queue {}: task failed: {:#}", name, e),
                    Err(panic) => error!("Queue {}: task panicked: {}", name, panic_message(&panic)),
                }
                counter.fetch_sub(1, Ordering::SeqCst);
            }

            debug!("Queue {} worker stopped", name);
        });

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            pending,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append `work` to the tail of the queue and return immediately
    pub fn submit<F>(&self, work: F) -> Result<(), SessionError>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            warn!("Queue {} is closed, rejecting task", self.name);
            return Err(SessionError::QueueClosed(self.name));
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(Box::pin(work)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SessionError::QueueClosed(self.name));
        }

        Ok(())
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// Wait until every item submitted before this call has finished
    pub async fn flush(&self) -> Result<(), SessionError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(async move {
            let _ = done_tx.send(());
            Ok(())
        })?;
        done_rx.await.map_err(|_| SessionError::QueueClosed(self.name))
    }

    /// Reject further submissions, drain what is queued, then stop the worker
    pub async fn close(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Queue {} worker panicked: {}", self.name, e);
            }
        }

        info!("Queue {} closed", self.name);
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The independent queues the session routes its work through
pub struct TaskQueues {
    /// Reading records for display
    pub loading: TaskQueue,
    /// Recording bookkeeping, rename and delete of records
    pub recordings: TaskQueue,
    /// Copying external files into managed storage
    pub import: TaskQueue,
    /// Waveform decoding and batch migration
    pub processing: TaskQueue,
}

impl TaskQueues {
    pub fn new() -> Self {
        Self {
            loading: TaskQueue::new("loading"),
            recordings: TaskQueue::new("recordings"),
            import: TaskQueue::new("import"),
            processing: TaskQueue::new("processing"),
        }
    }

    pub fn all(&self) -> [&TaskQueue; 4] {
        [&self.loading, &self.recordings, &self.import, &self.processing]
    }

    pub fn is_idle(&self) -> bool {
        self.all().iter().all(|q| q.is_idle())
    }

    /// Drain and close every queue
    pub async fn close(&self) {
        for queue in self.all() {
            queue.close().await;
        }
    }
}

impl Default for TaskQueues {
    fn default() -> Self {
        Self::new()
    }
}
