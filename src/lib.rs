pub mod config;
pub mod dns_providers;
pub mod domain;
pub mod edge;
pub(crate) mod http;
pub mod logging;
pub mod metrics;
pub mod reconcile;
pub mod scheduler;
