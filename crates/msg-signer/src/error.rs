//! Errors raised before any message is sent.

use crate::config::ConfigError;
use sign_types::OperationError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the process-level signing helpers.
///
/// Transport failures are not here: they are reported inside the signing
/// outcome.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("failed to read input file {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
