//! Error taxonomy for the filter engine
//!
//! Out-of-range parameter values are never errors: every setter clamps.
//! What remains are interface misuses that a caller can detect and test for.

use thiserror::Error;

/// Errors that can occur in the filter engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EqError {
    /// A parameter id was routed to a stage that does not own it
    #[error("Unknown parameter '{id}' for stage '{stage}'")]
    UnknownParameter { stage: String, id: String },

    /// No stage carries the prefix of the given parameter id
    #[error("Stage not found: {0}")]
    StageNotFound(String),

    /// Structural misuse detected while building or preparing a stage
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, EqError>;
