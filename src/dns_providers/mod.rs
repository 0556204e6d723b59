use anyhow::{Result, anyhow};

use crate::config::Config;

mod base;
pub mod ovh;

pub use base::{AtomicDnsOperations, DnsProviderBase, RecordWrite, WriteSummary, plan_record_writes};
pub use ovh::{OvhAdapter, OvhCredentials};

/// Builds the DNS provider for the credentials present in `config`. Records are managed
/// inside the zone named by `checks.base_domain`.
pub fn provider_for_config(config: &Config) -> Result<Box<dyn DnsProviderBase>> {
    match &config.auth.ovh {
        Some(ovh) => {
            let credentials = OvhCredentials {
                application_key: ovh.application_key.clone(),
                application_secret: ovh.application_secret.clone(),
                consumer_key: ovh.consumer_key.clone(),
            };
            let adapter = OvhAdapter::new(
                &ovh.endpoint,
                credentials,
                config.checks.base_domain.clone(),
                config.reconcile.record_ttl,
                config.http.timeout(),
            )?;
            Ok(Box::new(adapter))
        }
        None => Err(anyhow!("no DNS provider configured")),
    }
}
