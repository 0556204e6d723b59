use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{CertificatePack, CertificateStatus, EdgeError, EdgeProvider, ValidationRecord};
use crate::http;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

pub struct CloudflareClient {
    api_token: String,
    api_base: String,
    client: Client,
}

#[derive(Deserialize)]
struct CloudflareEnvelope<T> {
    result: Option<T>,
    success: Option<bool>,
    errors: Option<Vec<CloudflareError>>,
}

#[derive(Deserialize)]
struct CloudflareError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct CloudflareZone {
    id: String,
}

#[derive(Deserialize)]
struct CloudflareCertificatePack {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    validation_records: Option<Vec<CloudflareValidationRecord>>,
}

#[derive(Deserialize)]
struct CloudflareValidationRecord {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    txt_name: Option<String>,
    #[serde(default)]
    txt_value: Option<String>,
}

#[derive(Deserialize)]
struct CloudflareRevalidation {
    #[serde(default)]
    status: Option<String>,
}

impl CloudflareClient {
    pub fn new(api_token: String, timeout: Duration) -> Result<Self> {
        Self::with_api_base(api_token, DEFAULT_API_BASE.to_string(), timeout)
    }

    pub fn with_api_base(api_token: String, api_base: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: http::build_client(timeout)?,
        })
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<String, EdgeError> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Content-Type", "application/json")
            .send()
            .map_err(|err| EdgeError::Transport(format!("{what}: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| EdgeError::Transport(format!("{what}: {err}")))?;

        if http::is_auth_failure(status) {
            return Err(EdgeError::Unauthorized(format!(
                "{what} returned {status}: {}",
                describe_errors(&body)
            )));
        }
        if !status.is_success() {
            return Err(EdgeError::Api(format!(
                "{what} returned {status}: {}",
                describe_errors(&body)
            )));
        }
        Ok(body)
    }

    fn certificate_packs_body(&self, zone_id: &str) -> Result<String, EdgeError> {
        let request = self
            .client
            .get(format!(
                "{}/zones/{}/ssl/certificate_packs",
                self.api_base, zone_id
            ))
            .query(&[("status", "all")]);
        self.send(request, "certificate packs listing")
    }
}

impl EdgeProvider for CloudflareClient {
    fn zone_id(&self, hostname: &str) -> Result<String, EdgeError> {
        let request = self
            .client
            .get(format!("{}/zones", self.api_base))
            .query(&[("name", hostname)]);
        let body = self.send(request, "zone lookup")?;
        parse_zone_id(&body)
    }

    fn certificate_pack(&self, zone_id: &str) -> Result<CertificatePack, EdgeError> {
        let body = self.certificate_packs_body(zone_id)?;
        parse_certificate_pack(&body)
    }

    fn validation_records(&self, zone_id: &str) -> Result<Vec<ValidationRecord>, EdgeError> {
        let body = self.certificate_packs_body(zone_id)?;
        parse_validation_records(&body)
    }

    fn trigger_revalidation(&self, zone_id: &str, pack_id: &str) -> Result<(), EdgeError> {
        let request = self.client.patch(format!(
            "{}/zones/{}/ssl/certificate_packs/{}",
            self.api_base, zone_id, pack_id
        ));
        let body = self.send(request, "certificate pack revalidation")?;
        parse_revalidation(&body)
    }
}

// Only 2xx bodies reach this point, so a shape mismatch is a structural upstream error.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, EdgeError> {
    serde_json::from_str(body).map_err(|err| EdgeError::MalformedResponse(err.to_string()))
}

fn describe_errors(body: &str) -> String {
    match serde_json::from_str::<CloudflareEnvelope<serde_json::Value>>(body) {
        Ok(CloudflareEnvelope {
            errors: Some(errors),
            ..
        }) if !errors.is_empty() => errors
            .iter()
            .map(|err| format!("{}: {}", err.code, err.message))
            .collect::<Vec<_>>()
            .join(", "),
        _ => body.chars().take(200).collect(),
    }
}

/// A `null` result set is structurally empty; an empty list is a valid "nothing matched".
fn first_result<T>(envelope: CloudflareEnvelope<Vec<T>>) -> Result<T, EdgeError> {
    let results = envelope.result.ok_or(EdgeError::EmptyResponse)?;
    results.into_iter().next().ok_or(EdgeError::NoResult)
}

pub(crate) fn parse_zone_id(body: &str) -> Result<String, EdgeError> {
    let envelope: CloudflareEnvelope<Vec<CloudflareZone>> = decode(body)?;
    Ok(first_result(envelope)?.id)
}

pub(crate) fn parse_certificate_pack(body: &str) -> Result<CertificatePack, EdgeError> {
    let envelope: CloudflareEnvelope<Vec<CloudflareCertificatePack>> = decode(body)?;
    let pack = first_result(envelope)?;
    let status: CertificateStatus = pack.status.as_deref().unwrap_or_default().parse()?;
    Ok(CertificatePack {
        id: pack.id.unwrap_or_default(),
        status,
        validation_records: convert_validation_records(pack.validation_records),
    })
}

pub(crate) fn parse_validation_records(body: &str) -> Result<Vec<ValidationRecord>, EdgeError> {
    let envelope: CloudflareEnvelope<Vec<CloudflareCertificatePack>> = decode(body)?;
    let pack = first_result(envelope)?;
    Ok(convert_validation_records(pack.validation_records))
}

pub(crate) fn parse_revalidation(body: &str) -> Result<(), EdgeError> {
    let envelope: CloudflareEnvelope<CloudflareRevalidation> = decode(body)?;
    if envelope.success != Some(true) {
        let reason = envelope
            .errors
            .map(|errors| {
                errors
                    .iter()
                    .map(|err| format!("{}: {}", err.code, err.message))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(EdgeError::Api(format!(
            "error while triggering the certificates revalidation: {reason}"
        )));
    }
    let status = envelope
        .result
        .and_then(|result| result.status)
        .unwrap_or_default();
    if status != CertificateStatus::Initializing.as_str() {
        return Err(EdgeError::UnexpectedRevalidation(status));
    }
    Ok(())
}

// Records without a TXT value (HTTP validation) cannot be published; order is kept for the rest.
fn convert_validation_records(
    records: Option<Vec<CloudflareValidationRecord>>,
) -> Vec<ValidationRecord> {
    records
        .unwrap_or_default()
        .into_iter()
        .filter_map(|record| match record.txt_value {
            Some(txt_value) if !txt_value.is_empty() => Some(ValidationRecord {
                txt_name: record.txt_name.unwrap_or_default(),
                txt_value,
                status: record.status,
            }),
            _ => None,
        })
        .collect()
}
