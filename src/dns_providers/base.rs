use anyhow::{Context, Result, anyhow};
use log::{debug, warn};

/// One write the record-matching plan issues against the DNS provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWrite {
    Create { value: String },
    Update { record_id: String, value: String },
}

/// Counts of the writes applied by [`DnsProviderBase::set_txt_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub created: usize,
    pub updated: usize,
}

/// Maps `desired` TXT values onto the `existing` record identifiers of one subdomain.
///
/// With at most as many values as records, the first records are updated in order and the
/// surplus records are left alone. With more values than records, the missing records are
/// created first with the leading values, then every existing record is updated in order
/// with the remaining values. Creates always come before updates so a failure part-way
/// through never touches records that existed before.
pub fn plan_record_writes(desired: &[String], existing: &[String]) -> Vec<RecordWrite> {
    let to_create = desired.len().saturating_sub(existing.len());
    let creates = desired[..to_create]
        .iter()
        .map(|value| RecordWrite::Create {
            value: value.clone(),
        });
    let updates = desired[to_create..]
        .iter()
        .zip(existing)
        .map(|(value, record_id)| RecordWrite::Update {
            record_id: record_id.clone(),
            value: value.clone(),
        });
    creates.chain(updates).collect()
}

/// Low-level operations each DNS provider implements against its own API. Subdomains are
/// relative to the provider's zone.
pub trait AtomicDnsOperations: Send + Sync {
    /// Identifiers of the TXT records at `subdomain`, in provider order.
    fn list_record_ids(&self, subdomain: &str) -> Result<Vec<String>>;

    fn create_txt_record(&self, subdomain: &str, value: &str) -> Result<()>;

    fn update_txt_record(&self, subdomain: &str, record_id: &str, value: &str) -> Result<()>;

    fn delete_record(&self, record_id: &str) -> Result<()>;

    /// Current TXT value held by a record.
    fn record_value(&self, record_id: &str) -> Result<String>;

    /// Makes pending changes visible. Providers that serve writes immediately keep the
    /// default.
    fn apply_changes(&self) -> Result<()> {
        Ok(())
    }

    /// Normalizes a TXT record value for comparison.
    /// The default implementation trims whitespace and removes quotes.
    fn normalize_value(&self, value: &str) -> String {
        value.trim().trim_matches('"').trim().to_string()
    }
}

/// High-level record operations used by the reconciler, provided on top of
/// [`AtomicDnsOperations`].
pub trait DnsProviderBase: Send + Sync {
    fn atomic_ops(&self) -> &dyn AtomicDnsOperations;

    /// True when at least one TXT record exists at `subdomain`. Values are not inspected.
    fn records_exist(&self, subdomain: &str) -> Result<bool> {
        let ids = self
            .atomic_ops()
            .list_record_ids(subdomain)
            .with_context(|| format!("cannot list TXT records for {subdomain}"))?;
        Ok(!ids.is_empty())
    }

    /// True when every desired value is held by some record at `subdomain`.
    fn records_match(&self, subdomain: &str, desired: &[String]) -> Result<bool> {
        let ops = self.atomic_ops();
        let ids = ops
            .list_record_ids(subdomain)
            .with_context(|| format!("cannot list TXT records for {subdomain}"))?;
        if ids.is_empty() {
            return Ok(false);
        }

        let mut published = Vec::with_capacity(ids.len());
        for record_id in &ids {
            let value = ops
                .record_value(record_id)
                .with_context(|| format!("cannot read TXT record {record_id}"))?;
            published.push(ops.normalize_value(&value));
        }

        for value in desired {
            let wanted = ops.normalize_value(value);
            match published.iter().position(|candidate| *candidate == wanted) {
                Some(index) => {
                    published.swap_remove(index);
                }
                None => {
                    debug!("[dns-base] {subdomain}: value {wanted} is not published");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Converges `subdomain` to hold the `desired` values, reusing existing records. The first
    /// failing write aborts the sequence; writes already applied stay in place.
    fn set_txt_records(&self, subdomain: &str, desired: &[String]) -> Result<WriteSummary> {
        if desired.is_empty() {
            return Ok(WriteSummary::default());
        }
        let ops = self.atomic_ops();
        let existing = ops
            .list_record_ids(subdomain)
            .with_context(|| format!("cannot list TXT records for {subdomain}"))?;
        debug!(
            "[dns-base] {subdomain}: {} value(s) to publish over {} existing record(s)",
            desired.len(),
            existing.len()
        );

        let mut summary = WriteSummary::default();
        let outcome: Result<()> = plan_record_writes(desired, &existing)
            .into_iter()
            .try_for_each(|write| match write {
                RecordWrite::Create { value } => {
                    debug!("[dns-base] {subdomain}: creating TXT record");
                    ops.create_txt_record(subdomain, &value)
                        .with_context(|| format!("cannot create TXT record for {subdomain}"))?;
                    summary.created += 1;
                    Ok(())
                }
                RecordWrite::Update { record_id, value } => {
                    debug!("[dns-base] {subdomain}: updating TXT record {record_id}");
                    ops.update_txt_record(subdomain, &record_id, &value)
                        .with_context(|| {
                            format!("cannot update TXT record {record_id} for {subdomain}")
                        })?;
                    summary.updated += 1;
                    Ok(())
                }
            });

        if let Err(err) = outcome {
            if summary.created + summary.updated > 0 {
                warn!(
                    "[dns-base] {subdomain}: partially applied ({} created, {} updated) before failure",
                    summary.created, summary.updated
                );
                if let Err(apply_err) = ops.apply_changes() {
                    warn!("[dns-base] {subdomain}: cannot apply partial changes: {apply_err:#}");
                }
            }
            return Err(err);
        }

        ops.apply_changes()
            .with_context(|| format!("cannot apply TXT record changes for {subdomain}"))?;
        Ok(summary)
    }

    /// Deletes every TXT record at `subdomain` and returns how many were removed. A missing
    /// record set is a no-op.
    fn clean_txt_records(&self, subdomain: &str) -> Result<usize> {
        let ops = self.atomic_ops();
        let ids = ops
            .list_record_ids(subdomain)
            .with_context(|| format!("cannot list TXT records for {subdomain}"))?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut errors = Vec::new();
        for record_id in &ids {
            match ops.delete_record(record_id) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!("[dns-cleanup] {subdomain}: cannot delete record {record_id}: {err:#}");
                    errors.push(err);
                }
            }
        }

        if removed > 0 {
            ops.apply_changes()
                .with_context(|| format!("cannot apply TXT record removal for {subdomain}"))?;
        }

        if let Some(first) = errors.first() {
            return Err(anyhow!(
                "failed to delete {} record(s) for {subdomain}: {first:#}",
                errors.len()
            ));
        }
        Ok(removed)
    }
}

impl<T: AtomicDnsOperations> DnsProviderBase for T {
    fn atomic_ops(&self) -> &dyn AtomicDnsOperations {
        self
    }
}
