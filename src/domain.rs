use anyhow::{Result, anyhow};

/// Label prefixed to every validation record name.
pub const CHALLENGE_LABEL: &str = "_acme-challenge";

pub fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(anyhow!("domain name is required"));
    }
    let ascii = idna::domain_to_ascii(trimmed)
        .map_err(|err| anyhow!("invalid domain name: {err}"))?;
    Ok(ascii.to_lowercase())
}

/// Returns true when `domain` is `base` itself or one of its subdomains.
pub fn is_within_base(domain: &str, base: &str) -> bool {
    domain == base || domain.ends_with(&format!(".{base}"))
}

/// Subdomain, relative to `base`, under which the validation TXT records of `domain` live.
///
/// - `example.com` under `example.com` -> `_acme-challenge`
/// - `api.example.com` under `example.com` -> `_acme-challenge.api`
/// - `www.staging.example.com` under `example.com` -> `_acme-challenge.www.staging`
pub fn challenge_subdomain(domain: &str, base: &str) -> String {
    if domain == base {
        return CHALLENGE_LABEL.to_string();
    }
    let full = format!("{CHALLENGE_LABEL}.{domain}");
    full.strip_suffix(&format!(".{base}"))
        .map(str::to_string)
        .unwrap_or(full)
}
