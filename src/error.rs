//! Error types for Engage Flux

use thiserror::Error;

/// Errors surfaced by the engagement engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Session not found or already ended: {0}")]
    SessionNotFound(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame observation: {0}")]
    InvalidObservation(String),
}

/// Failure reported by an external classifier.
///
/// These never leave the engine: a failing collaborator is treated as
/// "no detection" for the frame.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Malformed image: {0}")]
    InvalidImage(String),

    #[error("Model inference failed: {0}")]
    Inference(String),

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
}

/// Geometry computed on landmarks that cannot support it.
///
/// Internal only; resolved to a 0-valued ratio by the geometry module.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum DegenerateInput {
    #[error("landmark index {0} not available")]
    MissingLandmark(usize),

    #[error("landmark {0} has non-finite coordinates")]
    NonFinite(usize),

    #[error("zero-length horizontal span")]
    ZeroSpan,
}
