use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use thiserror::Error;

use super::{ReconcileError, ReconcileOptions, Reconciler};
use crate::config::Config;
use crate::dns_providers::provider_for_config;
use crate::edge::CloudflareClient;
use crate::metrics::MetricsSink;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub reconciled: usize,
    pub failed: usize,
}

/// A failure that makes every remaining domain meaningless, such as rejected credentials.
#[derive(Debug, Error)]
#[error("fatal error while reconciling {domain}: {source}")]
pub struct FatalError {
    pub domain: String,
    #[source]
    pub source: ReconcileError,
}

/// Runs the reconciler over the configured domains, one tick at a time.
pub struct Driver {
    reconciler: Reconciler,
    domains: Vec<String>,
    metrics: Arc<dyn MetricsSink>,
}

impl Driver {
    pub fn new(reconciler: Reconciler, domains: Vec<String>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            reconciler,
            domains,
            metrics,
        }
    }

    /// Wires the Cloudflare client and the configured DNS provider. `dry_run` forces dry-run
    /// mode on top of the configuration file.
    pub fn from_config(
        config: &Config,
        metrics: Arc<dyn MetricsSink>,
        dry_run: bool,
    ) -> Result<Self> {
        let edge = CloudflareClient::new(config.auth.cloudflare.token.clone(), config.http.timeout())?;
        let dns = provider_for_config(config)?;
        let options = ReconcileOptions {
            dry_run: dry_run || config.reconcile.dry_run,
            existence_check: config.reconcile.existence_check,
        };
        let reconciler = Reconciler::new(
            Arc::new(edge),
            dns,
            Arc::clone(&metrics),
            config.checks.base_domain.clone(),
            options,
        );
        Ok(Self::new(reconciler, config.checks.domains.clone(), metrics))
    }

    /// Reconciles every domain in order. A domain's error is logged and never stops the
    /// batch, except a fatal one which is returned immediately.
    pub fn run_once(&self) -> Result<TickSummary, FatalError> {
        self.metrics.set_watched_count(self.domains.len());
        if self.reconciler.options().dry_run {
            info!("[driver] running in dry-run mode, no DNS or edge state will be changed");
        }
        info!("[driver] starting looping around {} listed domain(s)", self.domains.len());

        let mut summary = TickSummary::default();
        for domain in &self.domains {
            match self.reconciler.reconcile(domain) {
                Ok(report) => {
                    info!(
                        "[driver] {domain}: status {} -> {:?}",
                        report.status, report.outcome
                    );
                    summary.reconciled += 1;
                }
                Err(err) if err.is_fatal() => {
                    error!("[driver] {domain}: {err}; credentials are presumed invalid, stopping");
                    return Err(FatalError {
                        domain: domain.clone(),
                        source: err,
                    });
                }
                Err(err) => {
                    error!("[driver] {domain}: skipped this tick: {err}");
                    summary.failed += 1;
                }
            }
        }

        info!(
            "[driver] tick completed: {} reconciled, {} failed",
            summary.reconciled, summary.failed
        );
        Ok(summary)
    }
}
