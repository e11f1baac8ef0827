//! # Kove Metrics
//!
//! Concurrent metric registry and the violation ledger that keeps the
//! exported violation series in step with object lifecycle.

pub mod ledger;
pub mod registry;

pub use ledger::{
    EvaluationOutcome, PolicySource, ViolationLabels, ViolationLedger, ViolationMetrics,
    OBJECT_EVALUATIONS_TOTAL, VIOLATIONS_RESOLVED_TOTAL, VIOLATIONS_TOTAL, VIOLATION_METRIC,
};
pub use registry::{Collector, Counter, GaugeVec, LabelSet, Registry};
