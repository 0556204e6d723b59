use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Builds the blocking client shared by every call a provider makes. Each request is bounded
/// by `timeout`; an elapsed timeout surfaces as an ordinary transport error.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let timeout = if timeout.is_zero() {
        log::warn!("[http] invalid timeout value; using default");
        Duration::from_secs(DEFAULT_TIMEOUT_SECS)
    } else {
        timeout
    };
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("acme-txt-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

pub fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

pub fn status_error(provider: &str, status: StatusCode, body: Option<String>) -> anyhow::Error {
    if is_auth_failure(status) {
        return anyhow!("{provider} authentication failed");
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return anyhow!("{provider} rate limit exceeded");
    }
    match body {
        Some(body) if !body.trim().is_empty() => anyhow!("{provider} API error ({status}): {body}"),
        _ => anyhow!("{provider} API error: {status}"),
    }
}
