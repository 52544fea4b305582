//! Error types for the SkyTraffic environment abstraction.

use thiserror::Error;

/// Errors that can occur when talking to external collaborators.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The visual model library could not produce a model
    #[error("Model build failed: {0}")]
    ModelBuild(String),

    /// The audio backend rejected a request
    #[error("Audio error: {0}")]
    Audio(String),
}

impl EnvError {
    /// Creates a model build error.
    pub fn model_build(msg: impl Into<String>) -> Self {
        Self::ModelBuild(msg.into())
    }

    /// Creates an audio error.
    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }
}
