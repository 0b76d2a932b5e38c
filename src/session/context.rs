use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::state::SessionState;

type Callback = Box<dyn FnOnce(&mut SessionState) + Send>;

/// The single execution context that owns UI-facing session state
///
/// Callbacks run one at a time, in post order, with exclusive access to the
/// [`SessionState`]. Nothing else can reach the state, so every mutation of
/// the active record goes through here.
pub struct CallbackContext {
    sender: mpsc::UnboundedSender<Callback>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CallbackContext {
    pub fn new(mut state: SessionState) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Callback>();
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);

        let worker = tokio::spawn(async move {
            while let Some(callback) = receiver.recv().await {
                if catch_unwind(AssertUnwindSafe(|| callback(&mut state))).is_err() {
                    error!("Callback panicked; session state kept as is");
                }
                counter.fetch_sub(1, Ordering::SeqCst);
            }
        });

        Self {
            sender,
            pending,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Schedule `callback` after everything already posted
    pub fn post<F>(&self, callback: F)
    where
        F: FnOnce(&mut SessionState) + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Box::new(callback)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("Callback context is gone, dropping callback");
        }
    }

    /// Run `read` on the state and hand its result back
    pub async fn query<T, F>(&self, read: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SessionState) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move |state| {
            let _ = tx.send(read(state));
        });
        rx.await.ok()
    }

    /// Wait until every callback posted before this call has run
    pub async fn flush(&self) {
        self.query(|_| ()).await;
    }

    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }
}

impl Drop for CallbackContext {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}
