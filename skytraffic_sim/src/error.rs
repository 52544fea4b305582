//! Error types for the simulation harness.

use crate::oracle::Violation;
use skytraffic_core::TrafficError;
use thiserror::Error;

/// Errors surfaced by the harness.
#[derive(Debug, Error)]
pub enum SimError {
    /// The traffic engine rejected the world or configuration
    #[error("Traffic error: {0}")]
    Traffic(#[from] TrafficError),

    /// The oracle caught an invariant breach
    #[error("Invariant violated: {0}")]
    Invariant(#[from] Violation),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Export failed: {0}")]
    Export(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
