//! # Signing Operations
//!
//! The closed set of requests the engine knows how to dispatch. Operations
//! are immutable once constructed; container operations are validated at
//! construction so a digest/reference mismatch can never reach the network.

use crate::errors::OperationError;
use crate::results::{ClearSignResult, ContainerSignResult, SignResult};
use crate::schema::{DescribeFields, FieldDoc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Discriminant of a [`SignOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ClearSign,
    ContainerSign,
}

impl OperationKind {
    /// Value of the `mtype` header for messages of this kind.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::ClearSign => "clearsig_signature",
            Self::ContainerSign => "container_signature",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearSign => "clear_sign",
            Self::ContainerSign => "container_sign",
        }
    }
}

impl FromStr for OperationKind {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clear_sign" => Ok(Self::ClearSign),
            "container_sign" => Ok(Self::ContainerSign),
            other => Err(OperationError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Clear-sign a list of text inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearSignOperation {
    inputs: Vec<String>,
    signing_key: String,
    task_id: String,
}

impl ClearSignOperation {
    pub fn new(
        inputs: Vec<String>,
        signing_key: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            inputs,
            signing_key: signing_key.into(),
            task_id: task_id.into(),
        }
    }

    #[must_use]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    #[must_use]
    pub fn signing_key(&self) -> &str {
        &self.signing_key
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl DescribeFields for ClearSignOperation {
    fn field_docs() -> &'static [FieldDoc] {
        const DOCS: &[FieldDoc] = &[
            FieldDoc::new("inputs", "Signing data", r#"["input1", "input2"]"#),
            FieldDoc::new(
                "signing_key",
                "Signing key short id which should be used for signing",
                "123",
            ),
            FieldDoc::new(
                "task_id",
                "Usually pub task id, serves as identifier for in signing request",
                "1",
            ),
        ];
        DOCS
    }
}

/// Sign container manifests, one claim per digest/reference pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawContainerSign")]
pub struct ContainerSignOperation {
    digests: Vec<String>,
    references: Vec<String>,
    signing_key: String,
    task_id: String,
}

impl ContainerSignOperation {
    /// Create a container signing operation.
    ///
    /// # Errors
    ///
    /// `OperationError::MismatchedPairs` when `digests` and `references`
    /// differ in length.
    pub fn new(
        digests: Vec<String>,
        references: Vec<String>,
        signing_key: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Result<Self, OperationError> {
        if digests.len() != references.len() {
            return Err(OperationError::MismatchedPairs {
                digests: digests.len(),
                references: references.len(),
            });
        }
        Ok(Self {
            digests,
            references,
            signing_key: signing_key.into(),
            task_id: task_id.into(),
        })
    }

    #[must_use]
    pub fn digests(&self) -> &[String] {
        &self.digests
    }

    #[must_use]
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Digest/reference pairs in input order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.digests
            .iter()
            .zip(&self.references)
            .map(|(d, r)| (d.as_str(), r.as_str()))
    }

    #[must_use]
    pub fn signing_key(&self) -> &str {
        &self.signing_key
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl DescribeFields for ContainerSignOperation {
    fn field_docs() -> &'static [FieldDoc] {
        const DOCS: &[FieldDoc] = &[
            FieldDoc::new("digests", "List of digest to sign", r#"["sha256:abcdefg"]"#),
            FieldDoc::new(
                "references",
                "List of references to sign",
                r#"["registry/namespace/repo:tag"]"#,
            ),
            FieldDoc::new(
                "signing_key",
                "Signing key short id which should be used for signing",
                "123",
            ),
            FieldDoc::new(
                "task_id",
                "Usually pub task id, serves as identifier for in signing request",
                "1",
            ),
        ];
        DOCS
    }
}

/// Unvalidated wire form, checked on deserialization.
#[derive(Deserialize)]
struct RawContainerSign {
    digests: Vec<String>,
    references: Vec<String>,
    signing_key: String,
    task_id: String,
}

impl TryFrom<RawContainerSign> for ContainerSignOperation {
    type Error = OperationError;

    fn try_from(raw: RawContainerSign) -> Result<Self, Self::Error> {
        Self::new(raw.digests, raw.references, raw.signing_key, raw.task_id)
    }
}

/// A signing request. Each variant fixes the [`SignResult`] variant it
/// produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignOperation {
    ClearSign(ClearSignOperation),
    ContainerSign(ContainerSignOperation),
}

impl SignOperation {
    /// Operation kinds a message signer accepts.
    #[must_use]
    pub fn supported_kinds() -> &'static [OperationKind] {
        &[OperationKind::ContainerSign, OperationKind::ClearSign]
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::ClearSign(_) => OperationKind::ClearSign,
            Self::ContainerSign(_) => OperationKind::ContainerSign,
        }
    }

    #[must_use]
    pub fn signing_key(&self) -> &str {
        match self {
            Self::ClearSign(op) => op.signing_key(),
            Self::ContainerSign(op) => op.signing_key(),
        }
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::ClearSign(op) => op.task_id(),
            Self::ContainerSign(op) => op.task_id(),
        }
    }

    /// Number of messages this operation turns into.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        match self {
            Self::ClearSign(op) => op.inputs().len(),
            Self::ContainerSign(op) => op.digests().len(),
        }
    }

    /// A result of the matching variant with every slot empty.
    #[must_use]
    pub fn empty_result(&self) -> SignResult {
        let slots = vec![String::new(); self.unit_count()];
        match self {
            Self::ClearSign(op) => SignResult::ClearSign(ClearSignResult {
                outputs: slots,
                signing_key: op.signing_key().to_string(),
            }),
            Self::ContainerSign(op) => SignResult::ContainerSign(ContainerSignResult {
                signed_claims: slots,
                signing_key: op.signing_key().to_string(),
            }),
        }
    }
}

impl From<ClearSignOperation> for SignOperation {
    fn from(op: ClearSignOperation) -> Self {
        Self::ClearSign(op)
    }
}

impl From<ContainerSignOperation> for SignOperation {
    fn from(op: ContainerSignOperation) -> Self {
        Self::ContainerSign(op)
    }
}
