//! Error taxonomy for the integrator (spec.md §7).
//!
//! Configuration errors are surfaced at construction time; everything that
//! can only be discovered mid-run (a non-positive normalization, a
//! non-finite integrand value, a worker-count mismatch during reduction) is
//! surfaced as an aborted block rather than poisoning the running estimate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("normalization was non-positive at the end of a block (iteration {iteration}, block {block})")]
    NonPositiveNormalization { iteration: usize, block: usize },

    #[error("non-finite integrand value for integrand {integrand} at iteration {iteration}, block {block}")]
    NonFiniteIntegrand {
        iteration: usize,
        block: usize,
        integrand: usize,
    },

    #[error("block count mismatch during reduction: expected {expected}, got {got}")]
    BlockCountMismatch { expected: usize, got: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl IntegrationError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        IntegrationError::Config(msg.into())
    }
}
