//! # Kove Reconciler
//!
//! Keeps the exported violation series consistent with the live objects of
//! the watched resource kinds.
//!
//! ```text
//! WatchSource -> OwnershipFilter -> (update) ChangeFilter -> Dispatcher
//!             -> PolicyEvaluator -> ViolationLedger -> metrics
//! ```
//!
//! [`ResourceSelector`] runs once at startup to decide what is watched.

pub mod change;
pub mod diff;
pub mod dispatcher;
pub mod intake;
pub mod ownership;
pub mod selector;
pub mod tasks;

pub use change::ChangeFilter;
pub use diff::{diff, ChangeEntry, ChangeSet, ChangeType};
pub use dispatcher::{Dispatch, Dispatcher, SkipReason};
pub use intake::{run_intake, IntakeStats, WatchScope};
pub use ownership::OwnershipFilter;
pub use selector::{ResourceSelector, WANTED_VERBS};
pub use tasks::{TaskGroup, TaskHandle};
