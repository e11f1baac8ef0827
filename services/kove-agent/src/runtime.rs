//! Agent runtime
//!
//! Wires configuration, policies, discovery and the dispatcher together and
//! runs watch intake alongside the HTTP server until shutdown.

use crate::server::{router, AgentState};
use anyhow::Context;
use kove_core::KoveConfig;
use kove_metrics::{PolicySource, ViolationLedger, ViolationMetrics};
use kove_reconciler::{run_intake, Dispatcher, IntakeStats, ResourceSelector, WatchScope};
use policy_engine::PolicyEngine;
use std::future::Future;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use watch_queue::{ReplaySource, ResourceDiscovery, StaticDiscovery, WatchSource};

/// Watch source name meaning standard input.
pub const STDIN_WATCH: &str = "-";

pub struct Agent {
    config: KoveConfig,
    metrics: Arc<ViolationMetrics>,
    dispatcher: Dispatcher,
    scope: WatchScope,
    drain_on_shutdown: bool,
}

impl Agent {
    /// Validate `config`, compile the policies and decide the watch list.
    pub fn from_config(config: KoveConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let engine = Arc::new(PolicyEngine::new());
        let stats = engine
            .preload(&config.policies)
            .context("unable to load policy sources")?;
        info!(
            sources = stats.cached_sources,
            rules = stats.total_rules,
            query = %config.query,
            "policies loaded"
        );

        let scope = WatchScope::new(
            select_resources(&config),
            config.namespace_scope().map(str::to_string),
        );
        if scope.is_empty() {
            warn!("no resource kinds selected, every event will be out of scope");
        } else {
            info!(kinds = scope.len(), namespace = %config.namespace, "watch scope ready");
        }

        let metrics = Arc::new(ViolationMetrics::new());
        let ledger = ViolationLedger::new(
            metrics.clone(),
            engine,
            PolicySource {
                query: config.query.clone(),
                paths: config.policies.clone(),
            },
        );
        let dispatcher = Dispatcher::from_config(ledger, &config);

        Ok(Self {
            config,
            metrics,
            dispatcher,
            scope,
            drain_on_shutdown: false,
        })
    }

    /// Wait for outstanding evaluations before shutting down.
    pub fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }

    pub fn config(&self) -> &KoveConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<ViolationMetrics> {
        &self.metrics
    }

    pub fn scope(&self) -> &WatchScope {
        &self.scope
    }

    pub fn state(&self) -> AgentState {
        AgentState::new(&self.metrics, self.dispatcher.tasks().clone(), self.scope.len())
    }

    /// Open the configured watch stream: a recorded event file or stdin.
    pub async fn open_watch(&self) -> anyhow::Result<Box<dyn WatchSource>> {
        if self.config.watch == STDIN_WATCH {
            info!("replaying watch events from stdin");
            return Ok(Box::new(ReplaySource::new(BufReader::new(tokio::io::stdin()))));
        }
        let file = tokio::fs::File::open(&self.config.watch)
            .await
            .with_context(|| format!("unable to open watch stream {}", self.config.watch))?;
        info!(path = %self.config.watch, "replaying watch events from file");
        Ok(Box::new(ReplaySource::new(BufReader::new(file))))
    }

    /// Serve HTTP on `listener` and feed `source` to the dispatcher until the
    /// stream ends or `shutdown` resolves.
    pub async fn run<F>(
        self,
        listener: TcpListener,
        mut source: Box<dyn WatchSource>,
        shutdown: F,
    ) -> anyhow::Result<IntakeStats>
    where
        F: Future<Output = ()>,
    {
        info!(address = %listener.local_addr()?, "serving metrics");
        let stop = CancellationToken::new();
        let serve = axum::serve(listener, router(self.state()))
            .with_graceful_shutdown(stop.clone().cancelled_owned());
        let server = tokio::spawn(async move { serve.await });

        let stats = run_intake(source.as_mut(), &self.dispatcher, &self.scope, shutdown).await;
        info!(
            received = stats.received,
            out_of_scope = stats.out_of_scope,
            submitted = stats.submitted,
            retracted = stats.retracted,
            skipped = stats.skipped,
            errors = stats.errors,
            "watch intake stopped"
        );

        if self.drain_on_shutdown {
            info!(
                outstanding = self.dispatcher.tasks().outstanding(),
                "draining outstanding evaluations"
            );
            self.dispatcher.drain().await;
        }

        stop.cancel();
        server
            .await
            .context("http server task failed")?
            .context("http server failed")?;
        info!("agent stopped");
        Ok(stats)
    }
}

fn select_resources(config: &KoveConfig) -> Vec<kove_core::WatchedResource> {
    let discovery = match &config.discovery {
        Some(path) => match StaticDiscovery::from_file(path) {
            Ok(discovery) => Some(discovery),
            Err(err) => {
                warn!(error = %err, "unable to load discovery snapshot");
                None
            }
        },
        None => None,
    };
    ResourceSelector::from_config(config)
        .select(discovery.as_ref().map(|d| d as &dyn ResourceDiscovery))
}
