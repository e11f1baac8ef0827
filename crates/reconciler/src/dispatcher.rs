//! Evaluation dispatch
//!
//! Turns watch notifications into ledger transitions:
//! - add: evaluate with no previous violations
//! - update: retract the old series synchronously, then re-evaluate
//! - delete: retract synchronously, never evaluate
//!
//! Evaluations run as tasks in a [`TaskGroup`], serialized per object, with
//! the policy call itself on the blocking pool.

use crate::change::ChangeFilter;
use crate::diff::diff;
use crate::ownership::OwnershipFilter;
use crate::tasks::{TaskGroup, TaskHandle};
use kove_core::{KoveConfig, ObjectKey, ObjectRef};
use kove_metrics::{EvaluationOutcome, ViolationLedger};
use tracing::{debug, error, info, instrument};
use watch_queue::WatchEvent;

/// Why an event produced no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ChildObject,
    NoLegitimateChange,
}

/// What the dispatcher did with one event.
#[derive(Debug)]
pub enum Dispatch {
    Submitted(TaskHandle),
    Retracted(usize),
    Skipped(SkipReason),
}

/// Work to run once the object's earlier tasks are done.
#[derive(Debug)]
enum Step {
    Evaluate { obj: ObjectRef, previous: usize },
    /// Re-evaluation after an update; also picks up series a late
    /// predecessor registered after the synchronous retraction.
    Reevaluate { obj: ObjectRef, previous: usize },
    /// Retraction after a delete that raced queued tasks.
    Sweep,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    ledger: ViolationLedger,
    ownership: OwnershipFilter,
    changes: ChangeFilter,
    tasks: TaskGroup,
}

impl Dispatcher {
    pub fn new(ledger: ViolationLedger, ownership: OwnershipFilter, changes: ChangeFilter) -> Self {
        Self {
            ledger,
            ownership,
            changes,
            tasks: TaskGroup::new(),
        }
    }

    pub fn from_config(ledger: ViolationLedger, config: &KoveConfig) -> Self {
        Self::new(
            ledger,
            OwnershipFilter::new(config.ignore_children),
            ChangeFilter::from_config(config),
        )
    }

    pub fn ledger(&self) -> &ViolationLedger {
        &self.ledger
    }

    pub fn tasks(&self) -> &TaskGroup {
        &self.tasks
    }

    pub fn handle(&self, event: WatchEvent) -> Dispatch {
        match event {
            WatchEvent::Added { object, .. } => self.on_add(object),
            WatchEvent::Modified { old, new, .. } => self.on_update(&old, new),
            WatchEvent::Deleted { object, .. } => self.on_delete(&object),
        }
    }

    #[instrument(skip(self, obj), fields(object = %obj.key()))]
    pub fn on_add(&self, obj: ObjectRef) -> Dispatch {
        if self.ownership.suppresses(&obj) {
            return Dispatch::Skipped(SkipReason::ChildObject);
        }
        info!("evaluating object");
        Dispatch::Submitted(self.submit(obj.key(), Step::Evaluate { obj, previous: 0 }))
    }

    #[instrument(skip(self, old, new), fields(object = %new.key()))]
    pub fn on_update(&self, old: &ObjectRef, new: ObjectRef) -> Dispatch {
        if self.ownership.suppresses(&new) {
            return Dispatch::Skipped(SkipReason::ChildObject);
        }
        let changes = diff(old.body(), new.body());
        if !self.changes.legitimate_change(&changes) {
            debug!(changes = changes.len(), "no legitimate change");
            return Dispatch::Skipped(SkipReason::NoLegitimateChange);
        }

        let removed = self.ledger.delete_all_metrics_for_object(old);
        info!(changes = changes.len(), removed, "change observed, reevaluating object");
        Dispatch::Submitted(self.submit(
            new.key(),
            Step::Reevaluate {
                obj: new,
                previous: removed,
            },
        ))
    }

    #[instrument(skip(self, obj), fields(object = %obj.key()))]
    pub fn on_delete(&self, obj: &ObjectRef) -> Dispatch {
        if self.ownership.suppresses(obj) {
            return Dispatch::Skipped(SkipReason::ChildObject);
        }
        let key = obj.key();
        // Checked before retracting: a task that is no longer pending has
        // already registered everything it will.
        let pending = self.tasks.is_pending(&key);
        let removed = self.ledger.delete_all_metrics_for_object(obj);
        info!(removed, pending, "object deleted");
        if pending {
            self.submit(key, Step::Sweep);
        }
        Dispatch::Retracted(removed)
    }

    /// Wait for every outstanding evaluation.
    pub async fn drain(&self) {
        self.tasks.drain().await;
    }

    fn submit(&self, key: ObjectKey, step: Step) -> TaskHandle {
        let ledger = self.ledger.clone();
        let task_key = key.clone();
        self.tasks.submit(key, async move {
            let result =
                tokio::task::spawn_blocking(move || run_step(&ledger, &task_key, step)).await;
            if let Err(err) = result {
                error!(error = %err, "evaluation task aborted");
            }
        })
    }
}

fn run_step(ledger: &ViolationLedger, key: &ObjectKey, step: Step) {
    let result = match step {
        Step::Evaluate { obj, previous } => ledger.evaluate(&obj, previous),
        Step::Reevaluate { obj, previous } => ledger.assess(&obj).map(|found| {
            let late = ledger.delete_all_metrics_for_key(key);
            ledger.record(&obj, previous + late, found)
        }),
        Step::Sweep => {
            let removed = ledger.delete_all_metrics_for_key(key);
            if removed > 0 {
                info!(object = %key, removed, "late series retracted for deleted object");
            }
            return;
        }
    };

    match result {
        Ok(outcome) => log_outcome(key, &outcome),
        Err(err) => error!(object = %key, error = %err, "unable to evaluate"),
    }
}

fn log_outcome(key: &ObjectKey, outcome: &EvaluationOutcome) {
    match &outcome.last_violation {
        Some((ruleset, data)) => info!(
            object = %key,
            violations = outcome.found.len(),
            resolved = outcome.resolved,
            ruleset = %ruleset,
            data = %data,
            "evaluation complete"
        ),
        None => debug!(
            object = %key,
            resolved = outcome.resolved,
            "evaluation complete, no violations"
        ),
    }
}
