//! # Process-Level Helpers
//!
//! What command-line and automation wrappers are built from: resolve inputs,
//! load the configuration, run one operation and shape the response.

use crate::config::load_config;
use crate::error::SignerError;
use crate::signer::MsgSigner;
use serde::Serialize;
use sign_bus::MessageBus;
use sign_types::{
    ClearSignOperation, ContainerSignOperation, SignOperation, SignerResults, SigningOutcome,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix marking an input as a file reference.
pub const FILE_INPUT_PREFIX: char = '@';

/// Replace every `@path` input with the contents of that file.
pub fn resolve_inputs(inputs: &[String]) -> Result<Vec<String>, SignerError> {
    inputs
        .iter()
        .map(|input| match input.strip_prefix(FILE_INPUT_PREFIX) {
            Some(path) => fs::read_to_string(path).map_err(|source| SignerError::Input {
                path: PathBuf::from(path),
                source,
            }),
            None => Ok(input.clone()),
        })
        .collect()
}

/// Response printed by the signing commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigningResponse {
    pub signer_result: SignerResults,
    pub operation_results: Vec<String>,
    pub signing_key: String,
}

impl From<&SigningOutcome> for SigningResponse {
    fn from(outcome: &SigningOutcome) -> Self {
        Self {
            signer_result: outcome.signer_results().clone(),
            operation_results: outcome.result().slots().to_vec(),
            signing_key: outcome.result().signing_key().to_string(),
        }
    }
}

impl SigningResponse {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.signer_result.status == sign_types::SignerStatus::Ok
    }
}

/// Response reported to an automation tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutomationResponse {
    pub changed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<SigningResponse>,
}

impl AutomationResponse {
    /// `changed` when signing succeeded, `failed` with the joined error
    /// message otherwise.
    #[must_use]
    pub fn from_response(response: SigningResponse) -> Self {
        let ok = response.is_ok();
        Self {
            changed: ok,
            failed: !ok,
            msg: (!ok).then(|| response.signer_result.error_message.clone()),
            message: Some(response),
        }
    }

    /// A failure raised before signing started.
    #[must_use]
    pub fn from_error(error: &SignerError) -> Self {
        Self {
            changed: false,
            failed: true,
            msg: Some(error.to_string()),
            message: None,
        }
    }

    #[must_use]
    pub fn from_result(result: Result<SigningResponse, SignerError>) -> Self {
        match result {
            Ok(response) => Self::from_response(response),
            Err(error) => Self::from_error(&error),
        }
    }
}

async fn sign_with_config(
    bus: Arc<dyn MessageBus>,
    config_path: Option<&Path>,
    operation: SignOperation,
) -> Result<SigningResponse, SignerError> {
    let config = load_config(config_path)?;
    let signer = MsgSigner::new(config, bus);
    let outcome = signer.sign(&operation).await;
    Ok(SigningResponse::from(&outcome))
}

/// Clear-sign `inputs`, reading `@file` inputs first.
pub async fn clear_sign_with_config(
    bus: Arc<dyn MessageBus>,
    config_path: Option<&Path>,
    inputs: &[String],
    signing_key: &str,
    task_id: &str,
) -> Result<SigningResponse, SignerError> {
    let inputs = resolve_inputs(inputs)?;
    let operation = ClearSignOperation::new(inputs, signing_key, task_id);
    sign_with_config(bus, config_path, operation.into()).await
}

/// Sign container manifests given as parallel digest and reference lists.
pub async fn container_sign_with_config(
    bus: Arc<dyn MessageBus>,
    config_path: Option<&Path>,
    digests: Vec<String>,
    references: Vec<String>,
    signing_key: &str,
    task_id: &str,
) -> Result<SigningResponse, SignerError> {
    let operation = ContainerSignOperation::new(digests, references, signing_key, task_id)?;
    sign_with_config(bus, config_path, operation.into()).await
}
