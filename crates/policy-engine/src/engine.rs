//! Policy Engine Implementation
//!
//! Loads declarative policy sources from disk, caches them per path and
//! evaluates objects against the rules that answer a query. Cached sources
//! are swapped atomically when the file on disk changes.

use crate::rules::PolicyDocument;
use dashmap::DashMap;
use kove_core::{KoveError, ObjectRef, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, instrument};

/// The evaluate-and-return-violations contract the reconciler depends on.
///
/// Implementations return raw violation documents; converting them into
/// records (and rejecting malformed ones) is the caller's job.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, query: &str, sources: &[PathBuf], input: &Value) -> Result<Vec<Value>>;
}

#[derive(Debug)]
struct LoadedSource {
    modified: Option<SystemTime>,
    document: PolicyDocument,
}

/// Query reference split into an optional package and a rule query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryRef<'a> {
    package: Option<String>,
    query: &'a str,
}

impl<'a> QueryRef<'a> {
    /// `data.<package>.<query>` selects one package; a bare name selects
    /// the query in every package.
    fn parse(raw: &'a str) -> Self {
        match raw.strip_prefix("data.").and_then(|rest| rest.rsplit_once('.')) {
            Some((package, query)) => Self {
                package: Some(package.to_string()),
                query,
            },
            None => Self {
                package: None,
                query: raw.strip_prefix("data.").unwrap_or(raw),
            },
        }
    }

    fn selects(&self, document: &PolicyDocument) -> bool {
        self.package
            .as_deref()
            .map_or(true, |package| package == document.package)
    }
}

/// Declarative policy engine with a per-path source cache.
#[derive(Clone, Default)]
pub struct PolicyEngine {
    sources: Arc<DashMap<PathBuf, Arc<LoadedSource>>>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("cached_sources", &self.sources.len())
            .finish()
    }
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every source up front so configuration mistakes surface at
    /// startup rather than on the first event.
    #[instrument(skip(self, sources))]
    pub fn preload(&self, sources: &[PathBuf]) -> Result<PolicyEngineStats> {
        let documents = self.load_all(sources)?;
        let stats = PolicyEngineStats {
            cached_sources: self.sources.len(),
            total_rules: documents.iter().map(|d| d.document.rules.len()).sum(),
        };
        info!(
            sources = stats.cached_sources,
            rules = stats.total_rules,
            "policy sources loaded"
        );
        Ok(stats)
    }

    pub fn stats(&self) -> PolicyEngineStats {
        PolicyEngineStats {
            cached_sources: self.sources.len(),
            total_rules: self
                .sources
                .iter()
                .map(|entry| entry.value().document.rules.len())
                .sum(),
        }
    }

    fn load_all(&self, sources: &[PathBuf]) -> Result<Vec<Arc<LoadedSource>>> {
        let mut loaded = Vec::new();
        for source in sources {
            for file in source_files(source)? {
                loaded.push(self.load(&file)?);
            }
        }
        Ok(loaded)
    }

    /// Load one file, reusing the cached copy while its mtime is unchanged.
    fn load(&self, path: &Path) -> Result<Arc<LoadedSource>> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok();

        if let Some(cached) = self.sources.get(path) {
            if cached.modified.is_some() && cached.modified == modified {
                return Ok(cached.value().clone());
            }
        }

        let raw = std::fs::read_to_string(path).map_err(|e| load_error(path, e))?;
        let document: PolicyDocument = if has_extension(path, &["json"]) {
            serde_json::from_str(&raw).map_err(|e| load_error(path, e))?
        } else {
            serde_yaml::from_str(&raw).map_err(|e| load_error(path, e))?
        };
        debug!(path = %path.display(), package = %document.package, "policy source compiled");

        let source = Arc::new(LoadedSource { modified, document });
        self.sources.insert(path.to_path_buf(), source.clone());
        Ok(source)
    }
}

impl PolicyEvaluator for PolicyEngine {
    #[instrument(skip(self, sources, input), fields(query = %query))]
    fn evaluate(&self, query: &str, sources: &[PathBuf], input: &Value) -> Result<Vec<Value>> {
        let query_ref = QueryRef::parse(query);
        let object = ObjectRef::from_value(input.clone());
        let documents = self.load_all(sources)?;

        let mut defined = false;
        let mut violations = Vec::new();
        for source in &documents {
            if !query_ref.selects(&source.document) {
                continue;
            }
            for rule in source
                .document
                .rules
                .iter()
                .filter(|rule| rule.query == query_ref.query)
            {
                defined = true;
                if let Some(violation) = rule.evaluate(&object) {
                    violations.push(violation);
                }
            }
        }

        if !defined {
            return Err(KoveError::EvaluationError {
                reason: format!("query '{}' is undefined in the loaded policies", query),
            });
        }
        Ok(violations)
    }
}

/// Engine statistics for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEngineStats {
    pub cached_sources: usize,
    pub total_rules: usize,
}

fn load_error(path: &Path, err: impl std::fmt::Display) -> KoveError {
    KoveError::PolicyLoad {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Expand a source path into policy files; directories are scanned one
/// level deep in name order.
fn source_files(source: &Path) -> Result<Vec<PathBuf>> {
    if !source.is_dir() {
        return Ok(vec![source.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(source).map_err(|e| load_error(source, e))? {
        let path = entry.map_err(|e| load_error(source, e))?.path();
        if path.is_file() && has_extension(&path, &["yaml", "yml", "json"]) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kove_core::ObjectBuilder;
    use std::io::Write;

    const CHART_POLICY: &str = r#"
package: kove
rules:
  - name: chart-version
    ruleset: minimum chart version
    match:
      kinds: [Deployment]
    check:
      label_version_at_least:
        key: helm.sh/chart
        minimum: 4.0.0
  - name: team-annotation
    query: audit
    check:
      required_annotation:
        key: company.domain/team
"#;

    fn write_policy(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn deployment(chart: &str) -> Value {
        ObjectBuilder::new("apps/v1", "Deployment", "test", "test")
            .label("helm.sh/chart", chart)
            .build()
            .body()
            .clone()
    }

    #[test]
    fn test_query_parsing() {
        assert_eq!(
            QueryRef::parse("data.kove.violation"),
            QueryRef {
                package: Some("kove".to_string()),
                query: "violation"
            }
        );
        assert_eq!(
            QueryRef::parse("data.org.team.deny").package.as_deref(),
            Some("org.team")
        );
        assert_eq!(QueryRef::parse("violation").package, None);
    }

    #[test]
    fn test_chart_version_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_policy(dir.path(), "chart.yaml", CHART_POLICY);
        let engine = PolicyEngine::new();

        let bad = engine
            .evaluate("data.kove.violation", &[path.clone()], &deployment("specific-chart-name-3.0.0"))
            .unwrap();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0]["RuleSet"], "minimum chart version");

        let good = engine
            .evaluate("data.kove.violation", &[path], &deployment("specific-chart-name-4.0.0"))
            .unwrap();
        assert!(good.is_empty());
    }

    #[test]
    fn test_queries_select_rules() {
        let dir = tempfile::tempdir().unwrap();
        write_policy(dir.path(), "chart.yaml", CHART_POLICY);
        let engine = PolicyEngine::new();
        let sources = [dir.path().to_path_buf()];

        let audit = engine
            .evaluate("audit", &sources, &deployment("specific-chart-name-4.0.0"))
            .unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0]["Data"], "missing annotation company.domain/team");

        let err = engine
            .evaluate("data.other.violation", &sources, &deployment("x-1.0.0"))
            .unwrap_err();
        assert!(err.to_string().contains("undefined"));
    }

    #[test]
    fn test_directory_sources_and_json() {
        let dir = tempfile::tempdir().unwrap();
        write_policy(dir.path(), "chart.yaml", CHART_POLICY);
        write_policy(
            dir.path(),
            "replicas.json",
            r#"{"package": "kove", "rules": [{"name": "replicas", "check": {"field_equals": {"path": "spec/replicas", "value": 3}}}]}"#,
        );
        write_policy(dir.path(), "README.md", "not a policy");

        let engine = PolicyEngine::new();
        let stats = engine.preload(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(stats.cached_sources, 2);
        assert_eq!(stats.total_rules, 3);

        let found = engine
            .evaluate("data.kove.violation", &[dir.path().to_path_buf()], &deployment("c-5.0.0"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["Data"], "spec/replicas is missing");
    }

    #[test]
    fn test_invalid_source_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_policy(dir.path(), "broken.yaml", "package: [unterminated");
        let err = PolicyEngine::new()
            .evaluate("violation", &[path], &deployment("c-1.0.0"))
            .unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_missing_source_fails() {
        let err = PolicyEngine::new()
            .preload(&[PathBuf::from("/nonexistent/policy.yaml")])
            .unwrap_err();
        assert!(matches!(err, KoveError::PolicyLoad { .. }));
    }
}
