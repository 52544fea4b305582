//! Error types for the traffic engine.

use skytraffic_env::EnvError;
use thiserror::Error;

/// Errors raised while building or routing traffic.
///
/// None of these halt a running simulation: the state machine recovers
/// from routing and configuration failures locally and logs them. Only
/// configuration loading surfaces them to the host.
#[derive(Debug, Error)]
pub enum TrafficError {
    /// No airport with this id / index
    #[error("Unknown airport: {0}")]
    UnknownAirport(String),

    /// Airport references a taxi network that is not defined
    #[error("Unknown taxi network: {0}")]
    UnknownNetwork(String),

    /// Derived networks reference each other in a loop
    #[error("Taxi network derivation cycle through {0}")]
    NetworkCycle(String),

    /// A referenced node is absent from the network
    #[error("Node {node} missing from network {network}")]
    MissingNode { network: String, node: String },

    /// Airport has no usable gate
    #[error("Airport {0} has no gate in its taxi network")]
    MissingGate(String),

    /// Airport has no runway
    #[error("Airport {0} has no runway")]
    NoRunways(String),

    /// Runway has no hold-short node
    #[error("Runway {runway} at {airport} has no hold-short node")]
    MissingHoldShort { airport: String, runway: String },

    /// BFS found no route between two nodes
    #[error("No taxi route from {from} to {to} in {network}")]
    NoPath {
        network: String,
        from: String,
        to: String,
    },

    /// Traffic needs at least two airports
    #[error("At least two airports are required, got {0}")]
    NotEnoughAirports(usize),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A collaborator failed
    #[error(transparent)]
    Env(#[from] EnvError),
}

pub type Result<T> = std::result::Result<T, TrafficError>;
