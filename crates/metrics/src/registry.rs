//! Concurrent metric primitives and text exposition
//!
//! Series live in a sharded [`DashMap`] and counters are plain atomics, so
//! every set/delete/increment is safe to call from any task without a lock
//! held by the caller.

use dashmap::DashMap;
use std::fmt::Write;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A fixed set of label values identifying one series.
pub trait LabelSet: Clone + Eq + Hash + Send + Sync + 'static {
    /// Label names, in exposition order.
    fn names() -> &'static [&'static str];

    /// Label values, in the same order as [`LabelSet::names`].
    fn values(&self) -> Vec<&str>;
}

/// Anything that can write itself in the Prometheus text format.
pub trait Collector: Send + Sync {
    fn encode(&self, out: &mut String);
}

/// Monotonic counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Collector for Counter {
    fn encode(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} counter", self.name);
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

/// Gauge keyed by a label set; at most one series per distinct label tuple.
pub struct GaugeVec<L: LabelSet> {
    name: &'static str,
    help: &'static str,
    series: DashMap<L, f64>,
}

impl<L: LabelSet> std::fmt::Debug for GaugeVec<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeVec")
            .field("name", &self.name)
            .field("series", &self.series.len())
            .finish()
    }
}

impl<L: LabelSet> GaugeVec<L> {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            series: DashMap::new(),
        }
    }

    /// Set a series, creating it if needed.
    pub fn set(&self, labels: L, value: f64) {
        self.series.insert(labels, value);
    }

    pub fn get(&self, labels: &L) -> Option<f64> {
        self.series.get(labels).map(|entry| *entry.value())
    }

    /// Remove every series whose labels match all given `(name, value)`
    /// pairs and return how many went. Unknown label names match nothing.
    pub fn delete_partial_match(&self, subset: &[(&str, &str)]) -> usize {
        let names = L::names();
        let mut positions = Vec::with_capacity(subset.len());
        for (name, value) in subset {
            match names.iter().position(|n| n == name) {
                Some(index) => positions.push((index, *value)),
                None => return 0,
            }
        }

        let mut removed = 0;
        self.series.retain(|labels, _| {
            let values = labels.values();
            let matched = positions.iter().all(|(index, value)| values[*index] == *value);
            if matched {
                removed += 1;
            }
            !matched
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Snapshot of the active label sets.
    pub fn series(&self) -> Vec<L> {
        self.series.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<L: LabelSet> Collector for GaugeVec<L> {
    fn encode(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} gauge", self.name);

        let mut lines: Vec<String> = self
            .series
            .iter()
            .map(|entry| {
                let labels = L::names()
                    .iter()
                    .zip(entry.key().values())
                    .map(|(name, value)| format!("{}=\"{}\"", name, escape_label(value)))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}{{{}}} {}", self.name, labels, entry.value())
            })
            .collect();
        lines.sort();
        for line in lines {
            let _ = writeln!(out, "{}", line);
        }
    }
}

/// Ordered set of collectors rendered together at `/metrics`.
#[derive(Clone, Default)]
pub struct Registry {
    collectors: Vec<Arc<dyn Collector>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        self.collectors.push(collector);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for collector in &self.collectors {
            collector.encode(&mut out);
        }
        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
