//! Watch intake loop

use crate::dispatcher::{Dispatch, Dispatcher};
use kove_core::{KoveError, WatchedResource};
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, error, info, warn};
use watch_queue::{WatchEvent, WatchSource};

/// Which notifications the exporter is watching.
#[derive(Debug, Clone, Default)]
pub struct WatchScope {
    resources: HashSet<WatchedResource>,
    namespace: Option<String>,
}

impl WatchScope {
    pub fn new(resources: impl IntoIterator<Item = WatchedResource>, namespace: Option<String>) -> Self {
        Self {
            resources: resources.into_iter().collect(),
            namespace,
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Kind must be watched; with a namespace scope, the object must live in
    /// that namespace.
    pub fn accepts(&self, event: &WatchEvent) -> bool {
        self.resources.contains(event.resource())
            && self
                .namespace
                .as_deref()
                .map_or(true, |ns| event.object().namespace() == ns)
    }
}

/// Counts of what the intake loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub received: u64,
    pub out_of_scope: u64,
    pub submitted: u64,
    pub retracted: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Feed events from `source` to `dispatcher` until the stream ends or
/// `shutdown` resolves. Per-event errors are logged and skipped; a failing
/// stream ends intake.
pub async fn run_intake<S, F>(
    source: &mut S,
    dispatcher: &Dispatcher,
    scope: &WatchScope,
    shutdown: F,
) -> IntakeStats
where
    S: WatchSource + ?Sized,
    F: Future<Output = ()>,
{
    let mut stats = IntakeStats::default();
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => {
                info!("stop signal received, shutting down watch intake");
                break;
            }
            next = source.next_event() => next,
        };

        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => {
                info!("watch stream ended");
                break;
            }
            Err(KoveError::Io { source }) => {
                stats.errors += 1;
                error!(error = %source, "watch stream failed, stopping intake");
                break;
            }
            Err(err) => {
                stats.errors += 1;
                warn!(error = %err, "unable to read watch event");
                continue;
            }
        };

        stats.received += 1;
        if !scope.accepts(&event) {
            stats.out_of_scope += 1;
            debug!(resource = %event.resource(), object = %event.object().key(), "event outside watch scope");
            continue;
        }

        match dispatcher.handle(event) {
            Dispatch::Submitted(_) => stats.submitted += 1,
            Dispatch::Retracted(_) => stats.retracted += 1,
            Dispatch::Skipped(_) => stats.skipped += 1,
        }
    }

    stats
}
