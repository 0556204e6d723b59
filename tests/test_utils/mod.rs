#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use acme_txt_sync::config::ExistenceCheck;
use acme_txt_sync::dns_providers::AtomicDnsOperations;
use acme_txt_sync::edge::{CertificatePack, CertificateStatus, EdgeError, EdgeProvider, ValidationRecord};
use acme_txt_sync::metrics::MetricsSink;
use acme_txt_sync::reconcile::{Driver, ReconcileOptions, Reconciler};

pub const BASE_DOMAIN: &str = "example.com";

/// What the fake edge answers for one domain.
pub enum EdgeScript {
    Pack {
        status: CertificateStatus,
        values: Vec<String>,
    },
    ZoneError(fn() -> EdgeError),
    PackError(fn() -> EdgeError),
    /// Pending pack whose validation records query fails.
    ValuesError(fn() -> EdgeError),
}

/// Edge provider answering from per-domain scripts and recording every call in order.
#[derive(Default)]
pub struct FakeEdge {
    scripts: HashMap<String, EdgeScript>,
    calls: Mutex<Vec<String>>,
    revalidation_error: Option<fn() -> EdgeError>,
}

impl FakeEdge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pack(mut self, domain: &str, status: CertificateStatus, values: &[&str]) -> Self {
        self.scripts.insert(
            domain.to_string(),
            EdgeScript::Pack {
                status,
                values: values.iter().map(|v| v.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_zone_error(mut self, domain: &str, error: fn() -> EdgeError) -> Self {
        self.scripts
            .insert(domain.to_string(), EdgeScript::ZoneError(error));
        self
    }

    pub fn with_pack_error(mut self, domain: &str, error: fn() -> EdgeError) -> Self {
        self.scripts
            .insert(domain.to_string(), EdgeScript::PackError(error));
        self
    }

    pub fn with_values_error(mut self, domain: &str, error: fn() -> EdgeError) -> Self {
        self.scripts
            .insert(domain.to_string(), EdgeScript::ValuesError(error));
        self
    }

    pub fn failing_revalidation(mut self, error: fn() -> EdgeError) -> Self {
        self.revalidation_error = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn script(&self, zone_id: &str) -> Result<&EdgeScript, EdgeError> {
        let domain = zone_id.strip_prefix("zone-").unwrap_or(zone_id);
        self.scripts.get(domain).ok_or(EdgeError::NoResult)
    }
}

impl EdgeProvider for FakeEdge {
    fn zone_id(&self, hostname: &str) -> Result<String, EdgeError> {
        self.record(format!("zone_id {hostname}"));
        match self.scripts.get(hostname) {
            Some(EdgeScript::ZoneError(error)) => Err(error()),
            Some(_) => Ok(format!("zone-{hostname}")),
            None => Err(EdgeError::NoResult),
        }
    }

    fn certificate_pack(&self, zone_id: &str) -> Result<CertificatePack, EdgeError> {
        self.record(format!("certificate_pack {zone_id}"));
        match self.script(zone_id)? {
            EdgeScript::Pack { status, .. } => Ok(CertificatePack {
                id: format!("pack-{zone_id}"),
                status: *status,
                validation_records: Vec::new(),
            }),
            EdgeScript::ValuesError(_) => Ok(CertificatePack {
                id: format!("pack-{zone_id}"),
                status: CertificateStatus::PendingValidation,
                validation_records: Vec::new(),
            }),
            EdgeScript::PackError(error) => Err(error()),
            EdgeScript::ZoneError(error) => Err(error()),
        }
    }

    fn validation_records(&self, zone_id: &str) -> Result<Vec<ValidationRecord>, EdgeError> {
        self.record(format!("validation_records {zone_id}"));
        match self.script(zone_id)? {
            EdgeScript::Pack { values, .. } => Ok(values
                .iter()
                .map(|value| ValidationRecord {
                    txt_name: "_acme-challenge".to_string(),
                    txt_value: value.clone(),
                    status: Some("pending".to_string()),
                })
                .collect()),
            EdgeScript::ValuesError(error) => Err(error()),
            _ => Err(EdgeError::NoResult),
        }
    }

    fn trigger_revalidation(&self, zone_id: &str, pack_id: &str) -> Result<(), EdgeError> {
        self.record(format!("trigger_revalidation {zone_id} {pack_id}"));
        match self.revalidation_error {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }
}

/// In-memory TXT zone recording every provider call in order.
#[derive(Default)]
pub struct FakeDns {
    records: Mutex<Vec<(String, String, String)>>,
    next_id: Mutex<usize>,
    calls: Mutex<Vec<String>>,
    fail_creates: bool,
}

impl FakeDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, subdomain: &str, values: &[&str]) -> Self {
        for value in values {
            self.insert(subdomain, value);
        }
        self
    }

    pub fn failing_creates(mut self) -> Self {
        self.fail_creates = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change the zone.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                call.starts_with("create")
                    || call.starts_with("update")
                    || call.starts_with("delete")
                    || call.starts_with("apply")
            })
            .collect()
    }

    pub fn values(&self, subdomain: &str) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, sub, _)| sub == subdomain)
            .map(|(_, _, value)| value.clone())
            .collect()
    }

    fn insert(&self, subdomain: &str, value: &str) -> String {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = format!("rec-{next_id}");
        self.records
            .lock()
            .unwrap()
            .push((id.clone(), subdomain.to_string(), value.to_string()));
        id
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AtomicDnsOperations for FakeDns {
    fn list_record_ids(&self, subdomain: &str) -> Result<Vec<String>> {
        self.record(format!("list {subdomain}"));
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, sub, _)| sub == subdomain)
            .map(|(id, _, _)| id.clone())
            .collect())
    }

    fn create_txt_record(&self, subdomain: &str, value: &str) -> Result<()> {
        self.record(format!("create {subdomain} {value}"));
        if self.fail_creates {
            return Err(anyhow!("zone is read-only"));
        }
        self.insert(subdomain, value);
        Ok(())
    }

    fn update_txt_record(&self, subdomain: &str, record_id: &str, value: &str) -> Result<()> {
        self.record(format!("update {subdomain} {record_id} {value}"));
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|(id, _, _)| id == record_id)
            .ok_or_else(|| anyhow!("record {record_id} not found"))?;
        record.2 = value.to_string();
        Ok(())
    }

    fn delete_record(&self, record_id: &str) -> Result<()> {
        self.record(format!("delete {record_id}"));
        self.records.lock().unwrap().retain(|(id, _, _)| id != record_id);
        Ok(())
    }

    fn record_value(&self, record_id: &str) -> Result<String> {
        self.record(format!("value {record_id}"));
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _, _)| id == record_id)
            .map(|(_, _, value)| format!("\"{value}\""))
            .ok_or_else(|| anyhow!("record {record_id} not found"))
    }

    fn apply_changes(&self) -> Result<()> {
        self.record("apply".to_string());
        Ok(())
    }
}

/// Forwards to a shared [`FakeDns`] so tests keep a handle after boxing the provider.
pub struct SharedDns(pub Arc<FakeDns>);

impl AtomicDnsOperations for SharedDns {
    fn list_record_ids(&self, subdomain: &str) -> Result<Vec<String>> {
        self.0.list_record_ids(subdomain)
    }

    fn create_txt_record(&self, subdomain: &str, value: &str) -> Result<()> {
        self.0.create_txt_record(subdomain, value)
    }

    fn update_txt_record(&self, subdomain: &str, record_id: &str, value: &str) -> Result<()> {
        self.0.update_txt_record(subdomain, record_id, value)
    }

    fn delete_record(&self, record_id: &str) -> Result<()> {
        self.0.delete_record(record_id)
    }

    fn record_value(&self, record_id: &str) -> Result<String> {
        self.0.record_value(record_id)
    }

    fn apply_changes(&self) -> Result<()> {
        self.0.apply_changes()
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    pub watched: Mutex<Option<usize>>,
    pub updated: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl RecordingMetrics {
    pub fn updated_domains(&self) -> Vec<String> {
        self.updated
            .lock()
            .unwrap()
            .iter()
            .map(|(domain, _)| domain.clone())
            .collect()
    }
}

impl MetricsSink for RecordingMetrics {
    fn set_watched_count(&self, count: usize) {
        *self.watched.lock().unwrap() = Some(count);
    }

    fn set_last_updated(&self, domain: &str, at: DateTime<Utc>) {
        self.updated.lock().unwrap().push((domain.to_string(), at));
    }
}

/// Reconciler wiring over the fakes, with handles kept for assertions.
pub struct Harness {
    pub edge: Arc<FakeEdge>,
    pub dns: Arc<FakeDns>,
    pub metrics: Arc<RecordingMetrics>,
    pub options: ReconcileOptions,
}

impl Harness {
    pub fn new(edge: FakeEdge, dns: FakeDns) -> Self {
        Self {
            edge: Arc::new(edge),
            dns: Arc::new(dns),
            metrics: Arc::new(RecordingMetrics::default()),
            options: ReconcileOptions::default(),
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.options.dry_run = true;
        self
    }

    pub fn value_diff(mut self) -> Self {
        self.options.existence_check = ExistenceCheck::ValueDiff;
        self
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.edge.clone(),
            Box::new(SharedDns(Arc::clone(&self.dns))),
            self.metrics.clone(),
            BASE_DOMAIN.to_string(),
            self.options,
        )
    }

    pub fn driver(&self, domains: &[&str]) -> Driver {
        Driver::new(
            self.reconciler(),
            domains.iter().map(|d| d.to_string()).collect(),
            self.metrics.clone(),
        )
    }
}
