//! # Sign Types Crate
//!
//! Data model shared by the bus layer and the signing engine.
//!
//! ## Design Principles
//!
//! - **Correlation lives in the body**: every request envelope carries a
//!   unique `request_id` generated when the envelope is built, never by the
//!   transport.
//! - **Closed operation set**: signing kinds are variants of [`SignOperation`],
//!   and each kind fixes its [`SignResult`] variant.
//! - **Positional results**: result lists always have the same length as the
//!   input list they answer, unfilled slots hold an empty string.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod claim;
pub mod envelope;
pub mod errors;
pub mod operations;
pub mod results;
pub mod schema;

pub use claim::create_manifest_claim;
pub use envelope::{Body, Headers, MsgEnvelope, REQUEST_ID_FIELD};
pub use errors::{ErrorRecord, ErrorSource, OperationError};
pub use operations::{ClearSignOperation, ContainerSignOperation, OperationKind, SignOperation};
pub use results::{
    ClearSignResult, ContainerSignResult, SignResult, SignerResults, SignerStatus, SigningOutcome,
};
pub use schema::{DescribeFields, FieldDoc};
