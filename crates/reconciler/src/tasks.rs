//! Structured task group
//!
//! Every accepted event becomes one task. Tasks for different objects run
//! freely; tasks for the same object are chained so they run in submission
//! order. Draining waits for every submitted task that has not finished.

use dashmap::DashMap;
use kove_core::ObjectKey;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::task::TaskTracker;

/// Tail of the chain for one object.
#[derive(Debug)]
struct Link {
    sequence: u64,
    done: oneshot::Receiver<()>,
}

/// Releases the next task in the chain even if this one panics.
struct ChainGuard {
    chains: Arc<DashMap<ObjectKey, Link>>,
    key: ObjectKey,
    sequence: u64,
    done: Option<oneshot::Sender<()>>,
}

impl Drop for ChainGuard {
    fn drop(&mut self) {
        let sequence = self.sequence;
        self.chains.remove_if(&self.key, |_, link| link.sequence == sequence);
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

/// Handle to one submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    key: ObjectKey,
    inner: JoinHandle<()>,
}

impl TaskHandle {
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Wait for this task alone.
    pub async fn join(self) -> Result<(), JoinError> {
        self.inner.await
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskGroup {
    tracker: TaskTracker,
    chains: Arc<DashMap<ObjectKey, Link>>,
    sequence: Arc<AtomicU64>,
    /// Held for a whole close/wait/reopen cycle of the shared tracker.
    draining: Arc<Mutex<()>>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` behind any unfinished task for the same `key`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<F>(&self, key: ObjectKey, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let previous = self.chains.insert(
            key.clone(),
            Link {
                sequence,
                done: rx,
            },
        );

        let guard = ChainGuard {
            chains: self.chains.clone(),
            key: key.clone(),
            sequence,
            done: Some(tx),
        };
        let inner = self.tracker.spawn(async move {
            let _guard = guard;
            if let Some(previous) = previous {
                // A dropped sender also means the predecessor is gone.
                let _ = previous.done.await;
            }
            task.await;
        });

        TaskHandle { key, inner }
    }

    /// Whether a task for `key` is queued or running.
    pub fn is_pending(&self, key: &ObjectKey) -> bool {
        self.chains.contains_key(key)
    }

    /// Number of tasks submitted and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every outstanding task has finished. Tasks submitted while
    /// draining are waited for as well. Concurrent drains, from any clone of
    /// the group, take turns.
    pub async fn drain(&self) {
        let _turn = self.draining.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
