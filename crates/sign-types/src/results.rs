//! # Signing Results
//!
//! Result variants mirror the operation variants, and the aggregate
//! [`SigningOutcome`] is what a `sign()` call hands back to its caller.

use crate::errors::ErrorRecord;
use crate::operations::SignOperation;
use crate::schema::{DescribeFields, FieldDoc};
use serde::{Deserialize, Serialize};

/// Result of a clear-sign operation; `outputs[i]` answers `inputs[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearSignResult {
    pub outputs: Vec<String>,
    pub signing_key: String,
}

impl DescribeFields for ClearSignResult {
    fn field_docs() -> &'static [FieldDoc] {
        const DOCS: &[FieldDoc] = &[
            FieldDoc::new(
                "outputs",
                "Signing result output",
                r#"["signed:'hello world'"]"#,
            ),
            FieldDoc::new(
                "signing_key",
                "The signing key which is used during signing.",
                "123",
            ),
        ];
        DOCS
    }
}

/// Result of a container-sign operation; `signed_claims[i]` answers the
/// i-th digest/reference pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSignResult {
    pub signed_claims: Vec<String>,
    pub signing_key: String,
}

impl DescribeFields for ContainerSignResult {
    fn field_docs() -> &'static [FieldDoc] {
        const DOCS: &[FieldDoc] = &[
            FieldDoc::new(
                "signed_claims",
                "Signed manifest claims, one per digest",
                r#"["signed:'claim'"]"#,
            ),
            FieldDoc::new(
                "signing_key",
                "The signing key which is used during signing.",
                "123",
            ),
        ];
        DOCS
    }
}

/// Result of one operation, one slot per unit of work in input order.
///
/// A slot holds the reply body text only. Reply headers are available on the
/// receive path's `Receipt` and are not carried into the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignResult {
    ClearSign(ClearSignResult),
    ContainerSign(ContainerSignResult),
}

impl SignResult {
    /// Positional result slots.
    #[must_use]
    pub fn slots(&self) -> &[String] {
        match self {
            Self::ClearSign(r) => &r.outputs,
            Self::ContainerSign(r) => &r.signed_claims,
        }
    }

    pub fn slots_mut(&mut self) -> &mut [String] {
        match self {
            Self::ClearSign(r) => &mut r.outputs,
            Self::ContainerSign(r) => &mut r.signed_claims,
        }
    }

    #[must_use]
    pub fn signing_key(&self) -> &str {
        match self {
            Self::ClearSign(r) => &r.signing_key,
            Self::ContainerSign(r) => &r.signing_key,
        }
    }
}

/// Terminal state of a `sign()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerStatus {
    Ok,
    Error,
}

/// Status part of an outcome, reported as `signer_result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerResults {
    pub status: SignerStatus,
    pub error_message: String,
}

impl SignerResults {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: SignerStatus::Ok,
            error_message: String::new(),
        }
    }

    /// An error status whose message joins every record, one per line.
    #[must_use]
    pub fn failed(errors: &[ErrorRecord]) -> Self {
        Self {
            status: SignerStatus::Error,
            error_message: ErrorRecord::join(errors),
        }
    }
}

impl DescribeFields for SignerResults {
    fn field_docs() -> &'static [FieldDoc] {
        const DOCS: &[FieldDoc] = &[FieldDoc::new(
            "signer_result",
            "Signing result status.",
            r#"{"status": "ok", "error_message": ""}"#,
        )];
        DOCS
    }
}

/// Aggregate record of one `sign()` call. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigningOutcome {
    requester: String,
    operation: SignOperation,
    signer_results: SignerResults,
    result: SignResult,
}

impl SigningOutcome {
    #[must_use]
    pub fn new(
        requester: impl Into<String>,
        operation: SignOperation,
        signer_results: SignerResults,
        result: SignResult,
    ) -> Self {
        Self {
            requester: requester.into(),
            operation,
            signer_results,
            result,
        }
    }

    /// Identity of the signer that produced this outcome.
    #[must_use]
    pub fn requester(&self) -> &str {
        &self.requester
    }

    #[must_use]
    pub fn operation(&self) -> &SignOperation {
        &self.operation
    }

    #[must_use]
    pub fn status(&self) -> SignerStatus {
        self.signer_results.status
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status() == SignerStatus::Ok
    }

    #[must_use]
    pub fn error_message(&self) -> &str {
        &self.signer_results.error_message
    }

    #[must_use]
    pub fn signer_results(&self) -> &SignerResults {
        &self.signer_results
    }

    #[must_use]
    pub fn result(&self) -> &SignResult {
        &self.result
    }
}
