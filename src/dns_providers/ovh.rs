use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use log::{debug, warn};
use reqwest::{Method, StatusCode};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::AtomicDnsOperations;
use crate::http;

pub const DEFAULT_TTL: u32 = 120;

/// Set of credentials required to sign OVH API requests.
#[derive(Debug, Clone)]
pub struct OvhCredentials {
    pub application_key: String,
    pub application_secret: String,
    pub consumer_key: String,
}

/// TXT records held in an OVH-hosted zone.
pub struct OvhAdapter {
    endpoint: String,
    credentials: OvhCredentials,
    zone: String,
    ttl: u32,
    client: Client,
    time_delta: OnceLock<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecordParams<'a> {
    field_type: &'a str,
    sub_domain: &'a str,
    target: &'a str,
    ttl: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRecordParams<'a> {
    sub_domain: &'a str,
    target: &'a str,
    ttl: u32,
}

#[derive(Deserialize)]
struct OvhRecord {
    #[serde(default)]
    target: String,
}

/// Maps the endpoint aliases used by OVH client libraries to API base URLs. Anything that
/// already looks like a URL is used as-is.
pub fn resolve_endpoint(name: &str) -> Result<String> {
    let base = match name.trim() {
        "ovh-eu" => "https://eu.api.ovh.com/1.0",
        "ovh-ca" => "https://ca.api.ovh.com/1.0",
        "ovh-us" => "https://api.us.ovhcloud.com/1.0",
        url if url.starts_with("https://") || url.starts_with("http://") => url,
        other => return Err(anyhow!("unknown OVH endpoint '{other}'")),
    };
    Ok(base.trim_end_matches('/').to_string())
}

/// `$1$` followed by the hex SHA-1 of the request description, as OVH expects in
/// `X-Ovh-Signature`.
pub fn sign_request(
    credentials: &OvhCredentials,
    method: &str,
    url: &str,
    body: &str,
    timestamp: i64,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!(
        "{}+{}+{}+{}+{}+{}",
        credentials.application_secret, credentials.consumer_key, method, url, body, timestamp
    ));
    format!("$1${}", hex::encode(hasher.finalize()))
}

impl OvhAdapter {
    pub fn new(
        endpoint: &str,
        credentials: OvhCredentials,
        zone: String,
        ttl: u32,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: resolve_endpoint(endpoint)?,
            credentials,
            zone,
            ttl,
            client: http::build_client(timeout)?,
            time_delta: OnceLock::new(),
        })
    }

    fn records_path(&self) -> String {
        format!("/domain/zone/{}/record", self.zone)
    }

    fn record_path(&self, record_id: &str) -> String {
        format!("/domain/zone/{}/record/{}", self.zone, record_id)
    }

    fn list_path(&self, subdomain: &str) -> String {
        format!("{}?fieldType=TXT&subDomain={}", self.records_path(), subdomain)
    }

    // Signatures are checked against the API clock, so local skew is measured once.
    fn timestamp(&self) -> i64 {
        let now = Utc::now().timestamp();
        if let Some(delta) = self.time_delta.get() {
            return now + delta;
        }
        match self.server_time() {
            Ok(server) => {
                let delta = *self.time_delta.get_or_init(|| server - now);
                debug!("[ovh] clock delta with API is {delta}s");
                now + delta
            }
            Err(err) => {
                warn!("[ovh] cannot read API time, using local clock: {err:#}");
                now
            }
        }
    }

    fn server_time(&self) -> Result<i64> {
        let response = self
            .client
            .get(format!("{}/auth/time", self.endpoint))
            .send()
            .context("Failed to read OVH API time")?;
        if !response.status().is_success() {
            return Err(http::status_error("OVH", response.status(), None));
        }
        response.json().context("Failed to parse OVH API time")
    }

    fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(StatusCode, String)> {
        let url = format!("{}{}", self.endpoint, path);
        let payload = match body {
            Some(body) => serde_json::to_string(body).context("Failed to encode OVH request")?,
            None => String::new(),
        };
        let timestamp = self.timestamp();
        let signature = sign_request(&self.credentials, method.as_str(), &url, &payload, timestamp);

        debug!("[ovh] sending {method} on {path}");
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("X-Ovh-Application", &self.credentials.application_key)
            .header("X-Ovh-Consumer", &self.credentials.consumer_key)
            .header("X-Ovh-Timestamp", timestamp.to_string())
            .header("X-Ovh-Signature", signature)
            .header("Content-Type", "application/json");
        if !payload.is_empty() {
            request = request.body(payload);
        }

        let response = request
            .send()
            .with_context(|| format!("OVH {method} {path} failed"))?;
        let status = response.status();
        let text = response.text().unwrap_or_default();
        Ok((status, text))
    }

    fn call<B: Serialize>(&self, method: Method, path: &str, body: Option<&B>) -> Result<String> {
        let (status, text) = self.send(method, path, body)?;
        if !status.is_success() {
            return Err(http::status_error("OVH", status, Some(text)));
        }
        Ok(text)
    }
}

impl AtomicDnsOperations for OvhAdapter {
    fn list_record_ids(&self, subdomain: &str) -> Result<Vec<String>> {
        let body = self.call::<()>(Method::GET, &self.list_path(subdomain), None)?;
        let ids: Vec<u64> =
            serde_json::from_str(&body).context("Failed to parse OVH record list")?;
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    fn create_txt_record(&self, subdomain: &str, value: &str) -> Result<()> {
        let target = self.normalize_value(value);
        let params = CreateRecordParams {
            field_type: "TXT",
            sub_domain: subdomain,
            target: &target,
            ttl: self.ttl,
        };
        self.call(Method::POST, &self.records_path(), Some(&params))?;
        Ok(())
    }

    fn update_txt_record(&self, subdomain: &str, record_id: &str, value: &str) -> Result<()> {
        let target = self.normalize_value(value);
        let params = UpdateRecordParams {
            sub_domain: subdomain,
            target: &target,
            ttl: self.ttl,
        };
        self.call(Method::PUT, &self.record_path(record_id), Some(&params))?;
        Ok(())
    }

    fn delete_record(&self, record_id: &str) -> Result<()> {
        let (status, text) = self.send::<()>(Method::DELETE, &self.record_path(record_id), None)?;
        if status == StatusCode::NOT_FOUND {
            debug!("[ovh] record {record_id} already deleted");
            return Ok(());
        }
        if !status.is_success() {
            return Err(http::status_error("OVH", status, Some(text)));
        }
        Ok(())
    }

    fn record_value(&self, record_id: &str) -> Result<String> {
        let body = self.call::<()>(Method::GET, &self.record_path(record_id), None)?;
        let record: OvhRecord =
            serde_json::from_str(&body).context("Failed to parse OVH record")?;
        Ok(record.target)
    }

    fn apply_changes(&self) -> Result<()> {
        let path = format!("/domain/zone/{}/refresh", self.zone);
        self.call::<()>(Method::POST, &path, None)?;
        Ok(())
    }
}
