//! Metrics sink used by the reconciliation driver, and its Prometheus exposition.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Fire-and-forget observations emitted while reconciling.
pub trait MetricsSink: Send + Sync {
    fn set_watched_count(&self, count: usize);
    fn set_last_updated(&self, domain: &str, at: DateTime<Utc>);
}

/// Sink used when metrics are disabled.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_watched_count(&self, _count: usize) {}
    fn set_last_updated(&self, _domain: &str, _at: DateTime<Utc>) {}
}

pub struct PrometheusMetrics {
    registry: Registry,
    domains_watched: IntGauge,
    last_updated: IntGaugeVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let domains_watched = IntGauge::new(
            "acme_txt_sync_domains_watched_total",
            "Number of domains watched by acme-txt-sync.",
        )
        .context("failed to create domains watched gauge")?;
        let last_updated = IntGaugeVec::new(
            Opts::new(
                "acme_txt_sync_last_updated_timestamp",
                "Last time the domain's TXT records have been updated.",
            ),
            &["domain"],
        )
        .context("failed to create last updated gauge")?;

        registry
            .register(Box::new(domains_watched.clone()))
            .context("failed to register domains watched gauge")?;
        registry
            .register(Box::new(last_updated.clone()))
            .context("failed to register last updated gauge")?;

        Ok(Self {
            registry,
            domains_watched,
            last_updated,
        })
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics are not valid UTF-8")
    }
}

impl MetricsSink for PrometheusMetrics {
    fn set_watched_count(&self, count: usize) {
        self.domains_watched
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    fn set_last_updated(&self, domain: &str, at: DateTime<Utc>) {
        self.last_updated
            .with_label_values(&[domain])
            .set(at.timestamp());
    }
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        ),
        Err(err) => {
            warn!("[metrics] cannot render metrics: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                err.to_string(),
            )
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

pub fn router(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health))
        .with_state(metrics)
}

/// Serves `/metrics` and `/health` on `addr` until the process exits.
pub async fn serve(addr: &str, metrics: Arc<PrometheusMetrics>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind metrics server on {addr}"))?;
    info!("[metrics] starting metrics server on address '{addr}'");
    axum::serve(listener, router(metrics))
        .await
        .context("metrics server stopped")
}
