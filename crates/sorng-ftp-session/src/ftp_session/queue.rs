//! Serial operation queue bound to one transport client.
//!
//! Each queue owns a Tokio worker task that pops operations in FIFO order
//! and runs them one at a time. Enqueueing only takes a short std mutex, so
//! it never blocks the host thread.

use crate::ftp_session::error::{SessionError, SessionResult};
use crate::ftp_session::operations::QueueOperation;
use crate::ftp_session::transport::TransportClient;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueOperation>,
    in_flight: Option<String>,
    shutdown: bool,
}

struct QueueShared {
    label: String,
    client: Arc<dyn TransportClient>,
    state: StdMutex<QueueState>,
    wake: Notify,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, op: QueueOperation) -> String {
        let id = op.id().to_string();
        log::debug!("[{} queue] enqueue {:?} {}", self.label, op.op_type(), id);
        self.lock().pending.push_back(op);
        self.wake.notify_one();
        id
    }

    fn size(&self) -> usize {
        let state = self.lock();
        state.pending.len() + usize::from(state.in_flight.is_some())
    }

    fn signal_shutdown(&self) {
        self.lock().shutdown = true;
        self.wake.notify_one();
    }
}

/// FIFO work list processed by its own worker task.
pub struct OperationQueue {
    shared: Arc<QueueShared>,
    worker: Option<JoinHandle<()>>,
}

impl OperationQueue {
    pub fn new(label: impl Into<String>, client: Arc<dyn TransportClient>) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                label: label.into(),
                client,
                state: StdMutex::new(QueueState::default()),
                wake: Notify::new(),
            }),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawn the worker on the current Tokio runtime.
    pub fn initialize(&mut self) -> SessionResult<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SessionError::connection_setup(format!(
                "{} queue needs a Tokio runtime: {}",
                self.shared.label, e
            ))
        })?;
        self.shared.lock().shutdown = false;
        self.worker = Some(runtime.spawn(worker_loop(self.shared.clone())));
        Ok(())
    }

    /// Append an operation and wake the worker. Returns the operation id.
    pub fn add(&self, op: QueueOperation) -> String {
        self.shared.push(op)
    }

    /// Remove a pending operation. Operations that already started are not
    /// affected.
    pub fn cancel(&self, id: &str) -> bool {
        let mut state = self.shared.lock();
        match state.pending.iter().position(|op| op.id() == id) {
            Some(idx) => {
                state.pending.remove(idx);
                log::debug!("[{} queue] cancelled {}", self.shared.label, id);
                true
            }
            None => false,
        }
    }

    /// Pending operations plus the one in flight.
    pub fn size(&self) -> usize {
        self.shared.size()
    }

    /// Drop every pending operation without notifying, and ask the client to
    /// abort the one in flight. Returns the number of dropped operations.
    pub fn clear(&self) -> usize {
        let (dropped, busy) = {
            let mut state = self.shared.lock();
            let dropped = state.pending.len();
            state.pending.clear();
            (dropped, state.in_flight.is_some())
        };
        if busy {
            self.shared.client.abort();
        }
        if dropped > 0 {
            log::debug!("[{} queue] cleared {} pending", self.shared.label, dropped);
        }
        dropped
    }

    /// Clear the queue, stop the worker and wait for it to exit.
    pub async fn deinitialize(&mut self) {
        self.clear();
        self.shared.signal_shutdown();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                log::warn!("[{} queue] worker ended abnormally: {}", self.shared.label, e);
            }
        }
    }

    /// A cloneable handle for enqueueing from other tasks.
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shared.signal_shutdown();
        }
    }
}

/// Enqueue-only view of an [`OperationQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    shared: Arc<QueueShared>,
}

impl QueueHandle {
    pub fn add(&self, op: QueueOperation) -> String {
        self.shared.push(op)
    }

    pub fn size(&self) -> usize {
        self.shared.size()
    }
}

async fn worker_loop(shared: Arc<QueueShared>) {
    log::debug!("[{} queue] worker started", shared.label);
    loop {
        let next = {
            let mut state = shared.lock();
            if state.shutdown {
                break;
            }
            let op = state.pending.pop_front();
            state.in_flight = op.as_ref().map(|op| op.id().to_string());
            op
        };

        let Some(mut op) = next else {
            shared.wake.notified().await;
            continue;
        };

        op.set_client(shared.client.clone());
        let id = op.id().to_string();
        let op_type = op.op_type();
        match op.run().await {
            Ok(_) => log::debug!("[{} queue] {:?} {} done", shared.label, op_type, id),
            Err(e) => log::debug!("[{} queue] {:?} {} failed: {}", shared.label, op_type, id, e),
        }
        shared.lock().in_flight = None;
    }
    log::debug!("[{} queue] worker stopped", shared.label);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp_session::operations::OperationKind;
    use crate::ftp_session::testing::{eventually, MockTransport, RecordingSink};
    use crate::ftp_session::types::OperationType;

    fn mkdir(sink: &Arc<RecordingSink>, path: &str) -> QueueOperation {
        QueueOperation::new(
            sink.clone(),
            OperationKind::MkDir {
                path: path.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_runs_in_fifo_order_one_at_a_time() {
        let sink = RecordingSink::new();
        let client = MockTransport::new("main");
        let mut queue = OperationQueue::new("control", client.clone());
        queue.initialize().unwrap();

        for p in ["/1", "/2", "/3"] {
            queue.add(mkdir(&sink, p));
        }
        eventually(|| sink.end_count() == 3).await;

        assert_eq!(
            client.journal(),
            vec!["main:mkdir /1", "main:mkdir /2", "main:mkdir /3"]
        );
        assert_eq!(client.max_active(), 1);
        let kinds: Vec<bool> = sink.events().iter().map(|e| e.is_start()).collect();
        assert_eq!(kinds, vec![true, false, true, false, true, false]);
        assert_eq!(queue.size(), 0);
        queue.deinitialize().await;
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_queue() {
        let sink = RecordingSink::new();
        let client = MockTransport::new("main");
        client.fail_on("/bad");
        let mut queue = OperationQueue::new("control", client.clone());
        queue.initialize().unwrap();

        queue.add(mkdir(&sink, "/bad"));
        queue.add(mkdir(&sink, "/good"));
        eventually(|| sink.end_count() == 2).await;

        let ends: Vec<bool> = sink
            .events()
            .iter()
            .filter_map(|e| e.result().map(|r| r.is_ok()))
            .collect();
        assert_eq!(ends, vec![false, true]);
        queue.deinitialize().await;
    }

    #[tokio::test]
    async fn test_cancel_pending_only() {
        let sink = RecordingSink::new();
        let client = MockTransport::new("transfer");
        client.hold();
        let mut queue = OperationQueue::new("transfer", client.clone());
        queue.initialize().unwrap();

        let first = queue.add(mkdir(&sink, "/first"));
        let second = queue.add(mkdir(&sink, "/second"));
        eventually(|| client.active() == 1).await;
        assert_eq!(queue.size(), 2);

        assert!(!queue.cancel(&first));
        assert!(queue.cancel(&second));
        assert!(!queue.cancel(&second));
        assert_eq!(queue.size(), 1);

        client.open();
        eventually(|| sink.end_count() == 1).await;
        assert!(sink.events().iter().all(|e| e.info.id == first));
        queue.deinitialize().await;
    }

    #[tokio::test]
    async fn test_clear_drops_pending_and_aborts_in_flight() {
        let sink = RecordingSink::new();
        let client = MockTransport::new("transfer");
        client.hold();
        let mut queue = OperationQueue::new("transfer", client.clone());
        queue.initialize().unwrap();

        let running = queue.add(mkdir(&sink, "/running"));
        queue.add(mkdir(&sink, "/a"));
        queue.add(mkdir(&sink, "/b"));
        eventually(|| client.active() == 1).await;

        assert_eq!(queue.clear(), 2);
        eventually(|| sink.end_count() == 1).await;
        queue.deinitialize().await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.info.id == running));
        assert!(events[1].result().unwrap().is_err());
        assert_eq!(client.journal(), vec!["transfer:mkdir /running"]);
    }

    #[tokio::test]
    async fn test_handle_enqueues_from_other_task() {
        let sink = RecordingSink::new();
        let client = MockTransport::new("main");
        let mut queue = OperationQueue::new("control", client.clone());
        queue.initialize().unwrap();

        let handle = queue.handle();
        let op_sink = sink.clone();
        tokio::spawn(async move {
            handle.add(QueueOperation::new(op_sink, OperationKind::NoOp));
        })
        .await
        .unwrap();

        eventually(|| sink.end_count() == 1).await;
        assert_eq!(sink.events()[0].info.op_type, OperationType::NoOp);
        queue.deinitialize().await;
    }

    #[test]
    fn test_uninitialized_queue_only_accumulates() {
        let sink = RecordingSink::new();
        let queue = OperationQueue::new("control", MockTransport::new("main"));
        queue.add(mkdir(&sink, "/x"));
        assert_eq!(queue.size(), 1);
        assert!(!queue.is_running());
        assert!(sink.events().is_empty());
    }
}
