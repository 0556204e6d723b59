use thiserror::Error;

use crate::edge::EdgeError;

mod driver;
mod reconciler;

pub use driver::{Driver, FatalError, TickSummary};
pub use reconciler::{DomainReport, Outcome, PlannedChange, ReconcileOptions, Reconciler};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Edge(#[from] EdgeError),
    #[error("DNS provider error: {0:#}")]
    Dns(anyhow::Error),
}

impl ReconcileError {
    /// Fatal errors stop the whole batch; everything else only skips the current domain.
    pub fn is_fatal(&self) -> bool {
        match self {
            ReconcileError::Edge(err) => err.is_fatal(),
            ReconcileError::Dns(_) => false,
        }
    }
}
