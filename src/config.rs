//! Configuration file loading and validation.
//!
//! The file is TOML and is read once at startup; the resulting [`Config`] is an immutable
//! snapshot for the whole run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{is_within_base, normalize_domain};
use crate::dns_providers::ovh::DEFAULT_TTL;
use crate::http::DEFAULT_TIMEOUT_SECS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("configuration is not valid: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub checks: ChecksConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Colored console lines when true, single-line `key=value` records otherwise.
    pub human_readable: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            human_readable: true,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub cloudflare: CloudflareAuth,
    pub ovh: Option<OvhAuth>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudflareAuth {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OvhAuth {
    #[serde(default = "default_ovh_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub application_key: String,
    #[serde(default)]
    pub application_secret: String,
    #[serde(default)]
    pub consumer_key: String,
}

impl OvhAuth {
    fn is_complete(&self) -> bool {
        !self.application_key.is_empty()
            && !self.application_secret.is_empty()
            && !self.consumer_key.is_empty()
    }
}

fn default_ovh_endpoint() -> String {
    "ovh-eu".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Debug,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn period(&self) -> Duration {
        const HOUR: u64 = 60 * 60;
        match self {
            Frequency::Debug => Duration::from_secs(60),
            Frequency::Hourly => Duration::from_secs(HOUR),
            Frequency::Daily => Duration::from_secs(24 * HOUR),
            Frequency::Weekly => Duration::from_secs(7 * 24 * HOUR),
            // 30 days a month
            Frequency::Monthly => Duration::from_secs(30 * 24 * HOUR),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChecksConfig {
    pub base_domain: String,
    pub frequency: Frequency,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// How the reconciler decides that validation records are already published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceCheck {
    /// Any TXT record at the validation subdomain counts as published.
    #[default]
    Coarse,
    /// Every desired value must be held by a record; otherwise the records are rewritten.
    ValueDiff,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub dry_run: bool,
    pub existence_check: ExistenceCheck,
    pub record_ttl: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            existence_check: ExistenceCheck::Coarse,
            record_ttl: DEFAULT_TTL,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Config {
    /// Reads, parses and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)?.validate()
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Checks the required fields and normalizes every domain name.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.logging.level_filter()?;

        if self.auth.cloudflare.token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "cloudflare configuration is incomplete: missing auth.cloudflare.token field"
                    .to_string(),
            ));
        }

        match &self.auth.ovh {
            Some(ovh) if ovh.is_complete() => {}
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "ovh configuration is incomplete: application_key, application_secret and consumer_key are required"
                        .to_string(),
                ));
            }
            None => {
                return Err(ConfigError::Invalid(
                    "no DNS provider configured: add an [auth.ovh] section".to_string(),
                ));
            }
        }

        let base = normalize_domain(&self.checks.base_domain)
            .map_err(|err| ConfigError::Invalid(format!("checks.base_domain: {err}")))?;

        if self.checks.domains.is_empty() {
            return Err(ConfigError::Invalid(
                "checks.domains must list at least one domain".to_string(),
            ));
        }
        let mut domains: Vec<String> = Vec::with_capacity(self.checks.domains.len());
        for raw in &self.checks.domains {
            let domain = normalize_domain(raw)
                .map_err(|err| ConfigError::Invalid(format!("checks.domains '{raw}': {err}")))?;
            if !is_within_base(&domain, &base) {
                return Err(ConfigError::Invalid(format!(
                    "domain {domain} is not part of base domain {base}"
                )));
            }
            if domains.contains(&domain) {
                return Err(ConfigError::Invalid(format!("domain {domain} is listed twice")));
            }
            domains.push(domain);
        }
        self.checks.base_domain = base;
        self.checks.domains = domains;

        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Invalid(
                "metrics.port must be set when metrics are enabled".to_string(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
        [logging]
        level = "debug"

        [auth.cloudflare]
        token = "cf-token"

        [auth.ovh]
        application_key = "ak"
        application_secret = "as"
        consumer_key = "ck"

        [checks]
        base_domain = "Example.com"
        frequency = "hourly"
        domains = ["example.com", "API.example.com."]
    "#;

    #[test]
    fn parses_and_normalizes_valid_config() {
        let config = Config::parse(VALID).unwrap().validate().unwrap();
        assert_eq!(config.checks.base_domain, "example.com");
        assert_eq!(config.checks.domains, vec!["example.com", "api.example.com"]);
        assert_eq!(config.checks.frequency, Frequency::Hourly);
        assert_eq!(config.logging.level_filter().unwrap(), LevelFilter::Debug);
        assert_eq!(config.auth.ovh.unwrap().endpoint, "ovh-eu");
        assert!(!config.reconcile.dry_run);
        assert_eq!(config.reconcile.existence_check, ExistenceCheck::Coarse);
        assert_eq!(config.reconcile.record_ttl, 120);
        assert_eq!(config.http.timeout(), Duration::from_secs(15));
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn frequencies_map_to_periods() {
        assert_eq!(Frequency::Debug.period(), Duration::from_secs(60));
        assert_eq!(Frequency::Daily.period(), Duration::from_secs(86_400));
        assert_eq!(Frequency::Monthly.period(), Duration::from_secs(30 * 86_400));
    }

    #[test]
    fn rejects_unknown_frequency() {
        let raw = VALID.replace("\"hourly\"", "\"foobar\"");
        assert!(matches!(Config::parse(&raw), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_missing_cloudflare_token() {
        let raw = VALID.replace("token = \"cf-token\"", "");
        let err = Config::parse(&raw).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("auth.cloudflare.token"));
    }

    #[test]
    fn rejects_incomplete_ovh_credentials() {
        let raw = VALID.replace("consumer_key = \"ck\"", "");
        let err = Config::parse(&raw).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("ovh configuration is incomplete"));
    }

    #[test]
    fn rejects_domain_outside_base() {
        let raw = VALID.replace("\"API.example.com.\"", "\"api.example.org\"");
        let err = Config::parse(&raw).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("not part of base domain"));
    }

    #[test]
    fn rejects_duplicate_domains() {
        let raw = VALID.replace("\"API.example.com.\"", "\"EXAMPLE.com\"");
        let err = Config::parse(&raw).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let raw = VALID.replace("\"debug\"", "\"loud\"");
        let err = Config::parse(&raw).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("unknown log level"));
    }

    #[test]
    fn reads_reconcile_and_metrics_sections() {
        let raw = format!(
            "{VALID}\n[reconcile]\ndry_run = true\nexistence_check = \"value_diff\"\n\n[metrics]\nenabled = true\nport = 9100\n"
        );
        let config = Config::parse(&raw).unwrap().validate().unwrap();
        assert!(config.reconcile.dry_run);
        assert_eq!(config.reconcile.existence_check, ExistenceCheck::ValueDiff);
        assert_eq!(config.metrics.listen_addr(), "0.0.0.0:9100");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.checks.domains.len(), 2);
    }

    #[test]
    fn reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/acme-txt-sync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
