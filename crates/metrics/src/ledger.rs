//! Violation ledger
//!
//! The set of active `kove_policy_violation` series is the only record of
//! fleet compliance. This module owns every transition of that set:
//! registering a violation, evaluating an object (with resolution
//! accounting), and retracting all series for an object.

use crate::registry::{Collector, Counter, GaugeVec, LabelSet, Registry};
use kove_core::{ObjectKey, ObjectRef, Result, ViolationRecord};
use policy_engine::PolicyEvaluator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

pub const VIOLATION_METRIC: &str = "kove_policy_violation";
pub const VIOLATIONS_TOTAL: &str = "kove_policy_violations_total";
pub const VIOLATIONS_RESOLVED_TOTAL: &str = "kove_policy_violations_resolved_total";
pub const OBJECT_EVALUATIONS_TOTAL: &str = "kove_object_evaluations_total";

/// Full label tuple of one violation series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViolationLabels {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub api_version: String,
    pub ruleset: String,
    pub data: String,
}

impl LabelSet for ViolationLabels {
    fn names() -> &'static [&'static str] {
        &["name", "namespace", "kind", "api_version", "ruleset", "data"]
    }

    fn values(&self) -> Vec<&str> {
        vec![
            &self.name,
            &self.namespace,
            &self.kind,
            &self.api_version,
            &self.ruleset,
            &self.data,
        ]
    }
}

impl From<&ViolationRecord> for ViolationLabels {
    fn from(record: &ViolationRecord) -> Self {
        Self {
            name: record.name.clone(),
            namespace: record.namespace.clone(),
            kind: record.kind.clone(),
            api_version: record.api_version.clone(),
            ruleset: record.rule_set.clone(),
            data: record.data.clone(),
        }
    }
}

/// The exported metric set.
#[derive(Debug)]
pub struct ViolationMetrics {
    pub violation: Arc<GaugeVec<ViolationLabels>>,
    pub violations_total: Arc<Counter>,
    pub violations_resolved_total: Arc<Counter>,
    pub object_evaluations_total: Arc<Counter>,
}

impl Default for ViolationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationMetrics {
    pub fn new() -> Self {
        Self {
            violation: Arc::new(GaugeVec::new(
                VIOLATION_METRIC,
                "Object violating policy evaluation.",
            )),
            violations_total: Arc::new(Counter::new(
                VIOLATIONS_TOTAL,
                "Total count of policy violations observed.",
            )),
            violations_resolved_total: Arc::new(Counter::new(
                VIOLATIONS_RESOLVED_TOTAL,
                "Total count of policy violation resolutions observed.",
            )),
            object_evaluations_total: Arc::new(Counter::new(
                OBJECT_EVALUATIONS_TOTAL,
                "Total count of object evaluations conducted.",
            )),
        }
    }

    pub fn registry(&self) -> Registry {
        let mut registry = Registry::new();
        registry.register(self.violation.clone() as Arc<dyn Collector>);
        registry.register(self.violations_total.clone());
        registry.register(self.violations_resolved_total.clone());
        registry.register(self.object_evaluations_total.clone());
        registry
    }

    /// Active series for one object.
    pub fn series_for(&self, key: &ObjectKey) -> Vec<ViolationLabels> {
        self.violation
            .series()
            .into_iter()
            .filter(|labels| {
                labels.name == key.name
                    && labels.namespace == key.namespace
                    && labels.kind == key.kind
                    && labels.api_version == key.api_version
            })
            .collect()
    }
}

/// Result of one successful evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationOutcome {
    pub found: Vec<ViolationRecord>,
    pub resolved: usize,
    /// Rule set and data of the last violation found, for log correlation.
    pub last_violation: Option<(String, String)>,
}

/// Where and how objects are evaluated.
#[derive(Debug, Clone)]
pub struct PolicySource {
    pub query: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Clone)]
pub struct ViolationLedger {
    metrics: Arc<ViolationMetrics>,
    evaluator: Arc<dyn PolicyEvaluator>,
    source: Arc<PolicySource>,
}

impl std::fmt::Debug for ViolationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViolationLedger")
            .field("active_series", &self.metrics.violation.len())
            .field("query", &self.source.query)
            .finish()
    }
}

impl ViolationLedger {
    pub fn new(
        metrics: Arc<ViolationMetrics>,
        evaluator: Arc<dyn PolicyEvaluator>,
        source: PolicySource,
    ) -> Self {
        Self {
            metrics,
            evaluator,
            source: Arc::new(source),
        }
    }

    pub fn metrics(&self) -> &Arc<ViolationMetrics> {
        &self.metrics
    }

    /// Activate the series for `record` and count the registration. The
    /// counter moves even when the series was already active.
    pub fn register_violation(&self, record: &ViolationRecord) {
        self.metrics.violation.set(ViolationLabels::from(record), 1.0);
        self.metrics.violations_total.inc();
    }

    /// Evaluate `obj` and reconcile its series against `previous`, the
    /// number of series it had before this evaluation.
    ///
    /// Evaluator failures and malformed violation documents return an error
    /// before any metric is touched.
    #[instrument(skip(self, obj), fields(kind = %obj.kind(), namespace = %obj.namespace(), name = %obj.name()))]
    pub fn evaluate(&self, obj: &ObjectRef, previous: usize) -> Result<EvaluationOutcome> {
        let found = self.assess(obj)?;
        Ok(self.record(obj, previous, found))
    }

    /// Run the policy evaluator without touching any metric.
    pub fn assess(&self, obj: &ObjectRef) -> Result<Vec<ViolationRecord>> {
        self.evaluator
            .evaluate(&self.source.query, &self.source.paths, obj.body())?
            .iter()
            .map(ViolationRecord::from_document)
            .collect()
    }

    /// Register `found`, count the violations resolved since `previous` and
    /// count the evaluation.
    pub fn record(
        &self,
        obj: &ObjectRef,
        previous: usize,
        found: Vec<ViolationRecord>,
    ) -> EvaluationOutcome {
        let mut last_violation = None;
        for record in &found {
            info!(
                kind = %obj.kind().to_lowercase(),
                object = %obj.key(),
                ruleset = %record.rule_set,
                data = %record.data,
                "violation observed"
            );
            self.register_violation(record);
            last_violation = Some((record.rule_set.clone(), record.data.clone()));
        }

        let resolved = previous.saturating_sub(found.len());
        if resolved > 0 {
            self.metrics.violations_resolved_total.inc_by(resolved as u64);
        }
        self.metrics.object_evaluations_total.inc();

        EvaluationOutcome {
            found,
            resolved,
            last_violation,
        }
    }

    /// Retract every series for `obj` whatever its rule set or data. An
    /// object without series is not an error.
    pub fn delete_all_metrics_for_object(&self, obj: &ObjectRef) -> usize {
        self.delete_all_metrics_for_key(&obj.key())
    }

    pub fn delete_all_metrics_for_key(&self, key: &ObjectKey) -> usize {
        self.metrics.violation.delete_partial_match(&[
            ("name", key.name.as_str()),
            ("namespace", key.namespace.as_str()),
            ("kind", key.kind.as_str()),
            ("api_version", key.api_version.as_str()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kove_core::{KoveError, ObjectBuilder};
    use serde_json::{json, Value};

    /// Reports one violation per `violating` label on the object.
    struct LabelEvaluator;

    impl PolicyEvaluator for LabelEvaluator {
        fn evaluate(&self, _query: &str, _sources: &[PathBuf], input: &Value) -> Result<Vec<Value>> {
            let obj = ObjectRef::from_value(input.clone());
            Ok(obj
                .labels()
                .iter()
                .filter(|(k, _)| k.starts_with("violating"))
                .map(|(k, v)| {
                    json!({
                        "Name": obj.name(),
                        "Namespace": obj.namespace(),
                        "Kind": obj.kind(),
                        "ApiVersion": obj.api_version(),
                        "RuleSet": k,
                        "Data": v,
                    })
                })
                .collect())
        }
    }

    struct FailingEvaluator;

    impl PolicyEvaluator for FailingEvaluator {
        fn evaluate(&self, _: &str, _: &[PathBuf], _: &Value) -> Result<Vec<Value>> {
            Err(KoveError::EvaluationError {
                reason: "boom".to_string(),
            })
        }
    }

    struct MalformedEvaluator;

    impl PolicyEvaluator for MalformedEvaluator {
        fn evaluate(&self, _: &str, _: &[PathBuf], _: &Value) -> Result<Vec<Value>> {
            Ok(vec![
                json!({"Name": "a", "Namespace": "b", "Kind": "Deployment", "ApiVersion": "apps/v1"}),
                json!({"Name": "a"}),
            ])
        }
    }

    fn ledger(evaluator: Arc<dyn PolicyEvaluator>) -> ViolationLedger {
        ViolationLedger::new(
            Arc::new(ViolationMetrics::new()),
            evaluator,
            PolicySource {
                query: "violation".to_string(),
                paths: vec![],
            },
        )
    }

    fn object(name: &str, violations: usize) -> ObjectRef {
        (0..violations)
            .fold(
                ObjectBuilder::new("apps/v1", "Deployment", "test", name),
                |builder, i| builder.label(&format!("violating-{}", i), "yes"),
            )
            .build()
    }

    fn record(name: &str, rule_set: &str) -> ViolationRecord {
        ViolationRecord {
            name: name.to_string(),
            namespace: "test".to_string(),
            kind: "Deployment".to_string(),
            api_version: "apps/v1".to_string(),
            rule_set: rule_set.to_string(),
            data: format!("data-{}", rule_set),
        }
    }

    #[test]
    fn test_register_violation_counts_every_call() {
        let ledger = ledger(Arc::new(LabelEvaluator));
        ledger.register_violation(&record("test", "a"));
        ledger.register_violation(&record("test", "a"));

        let metrics = ledger.metrics();
        assert_eq!(metrics.violation.len(), 1);
        assert_eq!(metrics.violations_total.get(), 2);
    }

    #[test]
    fn test_evaluate_without_violations() {
        let ledger = ledger(Arc::new(LabelEvaluator));
        let outcome = ledger.evaluate(&object("test", 0), 0).unwrap();

        let metrics = ledger.metrics();
        assert!(outcome.found.is_empty());
        assert_eq!(outcome.last_violation, None);
        assert!(metrics.violation.is_empty());
        assert_eq!(metrics.object_evaluations_total.get(), 1);
        assert_eq!(metrics.violations_total.get(), 0);
        assert_eq!(metrics.violations_resolved_total.get(), 0);
    }

    #[test]
    fn test_evaluate_with_violation() {
        let ledger = ledger(Arc::new(LabelEvaluator));
        let outcome = ledger.evaluate(&object("test", 1), 0).unwrap();

        let metrics = ledger.metrics();
        assert_eq!(outcome.found.len(), 1);
        assert_eq!(
            outcome.last_violation,
            Some(("violating-0".to_string(), "yes".to_string()))
        );
        assert_eq!(metrics.violation.len(), 1);
        assert_eq!(metrics.violation.get(&ViolationLabels::from(&outcome.found[0])), Some(1.0));
        assert_eq!(metrics.violations_total.get(), 1);
    }

    #[test]
    fn test_evaluate_resolves_previous_violations() {
        let ledger = ledger(Arc::new(LabelEvaluator));
        ledger.evaluate(&object("test", 1), 0).unwrap();
        let removed = ledger.delete_all_metrics_for_object(&object("test", 1));
        assert_eq!(removed, 1);

        let outcome = ledger.evaluate(&object("test", 0), removed).unwrap();
        let metrics = ledger.metrics();
        assert_eq!(outcome.resolved, 1);
        assert_eq!(metrics.violations_resolved_total.get(), 1);
        assert!(metrics.series_for(&object("test", 0).key()).is_empty());
        assert_eq!(metrics.object_evaluations_total.get(), 2);
    }

    #[test]
    fn test_partial_resolution() {
        let ledger = ledger(Arc::new(LabelEvaluator));
        let outcome = ledger.evaluate(&object("test", 1), 3).unwrap();
        assert_eq!(outcome.resolved, 2);

        let outcome = ledger.evaluate(&object("test", 2), 1).unwrap();
        assert_eq!(outcome.resolved, 0);
        assert_eq!(ledger.metrics().violations_resolved_total.get(), 2);
    }

    #[test]
    fn test_failed_evaluation_leaves_state_untouched() {
        let ledger = ledger(Arc::new(FailingEvaluator));
        ledger.register_violation(&record("test", "a"));

        assert!(ledger.evaluate(&object("test", 0), 1).is_err());
        let metrics = ledger.metrics();
        assert_eq!(metrics.violation.len(), 1);
        assert_eq!(metrics.violations_resolved_total.get(), 0);
        assert_eq!(metrics.object_evaluations_total.get(), 0);
    }

    #[test]
    fn test_malformed_violation_registers_nothing() {
        let ledger = ledger(Arc::new(MalformedEvaluator));
        let err = ledger.evaluate(&object("a", 0), 0).unwrap_err();

        assert!(matches!(err, KoveError::MalformedViolation { .. }));
        assert!(ledger.metrics().violation.is_empty());
        assert_eq!(ledger.metrics().violations_total.get(), 0);
    }

    #[test]
    fn test_delete_all_metrics_for_object() {
        let ledger = ledger(Arc::new(LabelEvaluator));
        for i in 0..4 {
            ledger.register_violation(&record("test", &format!("ruleset-{}", i)));
        }
        assert_eq!(ledger.delete_all_metrics_for_object(&object("test", 0)), 4);
        assert!(ledger.metrics().violation.is_empty());
        assert_eq!(ledger.delete_all_metrics_for_object(&object("test", 0)), 0);
    }

    #[test]
    fn test_delete_leaves_other_objects() {
        let ledger = ledger(Arc::new(LabelEvaluator));
        for i in 0..3 {
            ledger.register_violation(&record("test", &format!("ruleset-{}", i)));
            let mut other = record("other", &format!("ruleset-{}", i));
            other.namespace = "other".to_string();
            ledger.register_violation(&other);
        }

        assert_eq!(ledger.delete_all_metrics_for_object(&object("test", 0)), 3);
        assert_eq!(ledger.metrics().violation.len(), 3);
    }

    #[test]
    fn test_exposition_names() {
        let ledger = ledger(Arc::new(LabelEvaluator));
        ledger.evaluate(&object("test", 1), 0).unwrap();
        let text = ledger.metrics().registry().render();

        assert!(text.contains("kove_policy_violation{name=\"test\",namespace=\"test\",kind=\"Deployment\",api_version=\"apps/v1\",ruleset=\"violating-0\",data=\"yes\"} 1"));
        assert!(text.contains("kove_policy_violations_total 1"));
        assert!(text.contains("kove_policy_violations_resolved_total 0"));
        assert!(text.contains("kove_object_evaluations_total 1"));
    }
}
