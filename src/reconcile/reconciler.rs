use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use super::ReconcileError;
use crate::config::ExistenceCheck;
use crate::dns_providers::{DnsProviderBase, WriteSummary};
use crate::domain::challenge_subdomain;
use crate::edge::{CertificateStatus, EdgeProvider};
use crate::metrics::MetricsSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Log every mutation instead of performing it. Read-only calls still run.
    pub dry_run: bool,
    pub existence_check: ExistenceCheck,
}

/// A mutation skipped because of dry-run mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedChange {
    Cleanup { records: usize },
    Publish { values: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Certificate is active; stale validation records were removed.
    CleanedUp { removed: usize },
    /// The edge provider has no validation record to publish.
    NothingToPublish,
    /// Records are already in place and the certificate authority has not observed them yet.
    AlreadyPublished,
    Published(WriteSummary),
    DryRun(PlannedChange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainReport {
    pub status: CertificateStatus,
    pub revalidation_requested: bool,
    pub outcome: Outcome,
}

/// Decides and executes the side effect of one domain for one tick. Nothing is remembered
/// between calls: the certificate pack status is read fresh every time.
pub struct Reconciler {
    edge: Arc<dyn EdgeProvider>,
    dns: Box<dyn DnsProviderBase>,
    metrics: Arc<dyn MetricsSink>,
    base_domain: String,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(
        edge: Arc<dyn EdgeProvider>,
        dns: Box<dyn DnsProviderBase>,
        metrics: Arc<dyn MetricsSink>,
        base_domain: String,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            edge,
            dns,
            metrics,
            base_domain,
            options,
        }
    }

    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    pub fn reconcile(&self, domain: &str) -> Result<DomainReport, ReconcileError> {
        info!("[reconcile] {domain}: getting zone ID from the edge provider");
        let zone_id = self.edge.zone_id(domain)?;
        debug!("[reconcile] {domain}: got zone ID {zone_id}");

        info!("[reconcile] {domain}: checking current certificate pack status");
        let pack = self.edge.certificate_pack(&zone_id)?;
        debug!(
            "[reconcile] {domain}: certificate pack {} is {}",
            pack.id, pack.status
        );

        let subdomain = challenge_subdomain(domain, &self.base_domain);
        let mut revalidation_requested = false;

        match pack.status {
            CertificateStatus::Active => {
                let outcome = self.clean_up(domain, &subdomain)?;
                return Ok(DomainReport {
                    status: pack.status,
                    revalidation_requested,
                    outcome,
                });
            }
            CertificateStatus::ValidationTimedOut => {
                info!("[reconcile] {domain}: validation timed out, restarting validation");
                if self.options.dry_run {
                    info!(
                        "[reconcile] {domain}: dry-run, would trigger revalidation of pack {}",
                        pack.id
                    );
                } else {
                    self.edge.trigger_revalidation(&zone_id, &pack.id)?;
                    revalidation_requested = true;
                }
            }
            CertificateStatus::Initializing | CertificateStatus::PendingValidation => {
                info!("[reconcile] {domain}: certificate pack is {}", pack.status);
            }
        }

        let outcome = self.publish(domain, &zone_id, &subdomain)?;
        Ok(DomainReport {
            status: pack.status,
            revalidation_requested,
            outcome,
        })
    }

    fn clean_up(&self, domain: &str, subdomain: &str) -> Result<Outcome, ReconcileError> {
        info!("[reconcile] {domain}: certificate pack is active, cleaning up {subdomain} TXT records");
        if self.options.dry_run {
            let records = self
                .dns
                .atomic_ops()
                .list_record_ids(subdomain)
                .map_err(ReconcileError::Dns)?
                .len();
            info!("[reconcile] {domain}: dry-run, would delete {records} TXT record(s)");
            return Ok(Outcome::DryRun(PlannedChange::Cleanup { records }));
        }

        let removed = self
            .dns
            .clean_txt_records(subdomain)
            .map_err(ReconcileError::Dns)?;
        if removed > 0 {
            info!("[reconcile] {domain}: deleted {removed} stale TXT record(s)");
        } else {
            debug!("[reconcile] {domain}: no TXT record to clean up");
        }
        Ok(Outcome::CleanedUp { removed })
    }

    fn publish(
        &self,
        domain: &str,
        zone_id: &str,
        subdomain: &str,
    ) -> Result<Outcome, ReconcileError> {
        info!("[reconcile] {domain}: getting validation records from the edge provider");
        let records = self.edge.validation_records(zone_id)?;
        if records.is_empty() {
            info!(
                "[reconcile] {domain}: no validation record returned, the zone does not need a renewal"
            );
            return Ok(Outcome::NothingToPublish);
        }
        let values: Vec<String> = records.into_iter().map(|record| record.txt_value).collect();
        debug!("[reconcile] {domain}: {} validation value(s) to publish", values.len());

        let published = match self.options.existence_check {
            ExistenceCheck::Coarse => self.dns.records_exist(subdomain),
            ExistenceCheck::ValueDiff => self.dns.records_match(subdomain, &values),
        }
        .map_err(ReconcileError::Dns)?;
        if published {
            info!(
                "[reconcile] {domain}: TXT records are already set but the certificate is not renewed yet, nothing to do"
            );
            return Ok(Outcome::AlreadyPublished);
        }

        if self.options.dry_run {
            info!(
                "[reconcile] {domain}: dry-run, would publish {} TXT record(s) at {subdomain}",
                values.len()
            );
            return Ok(Outcome::DryRun(PlannedChange::Publish {
                values: values.len(),
            }));
        }

        let summary = self
            .dns
            .set_txt_records(subdomain, &values)
            .map_err(|err| {
                warn!("[reconcile] {domain}: TXT records may be partially written");
                ReconcileError::Dns(err)
            })?;
        self.metrics.set_last_updated(domain, Utc::now());
        info!(
            "[reconcile] {domain}: TXT records published ({} created, {} updated)",
            summary.created, summary.updated
        );
        Ok(Outcome::Published(summary))
    }
}
