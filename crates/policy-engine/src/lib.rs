//! # Policy Engine
//!
//! Declarative policy evaluation for Kove. Policies are YAML or JSON
//! documents of rules; each rule selects objects and checks one condition.

pub use kove_core;

mod engine;
pub mod rules;

pub use engine::{PolicyEngine, PolicyEngineStats, PolicyEvaluator};
pub use rules::{Condition, PolicyDocument, PolicyRule, RuleMatch};

// Re-export core types for convenience
pub use kove_core::{KoveError, ObjectRef, Result, ViolationRecord};
