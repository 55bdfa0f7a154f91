//! # Msg Signer - Message Dispatch and Reply Correlation
//!
//! Sends signing requests to a remote signing authority over a message bus
//! and assembles its replies into ordered results.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`Dispatcher`] | Send path: one message per unit of work, counted acks |
//! | [`Correlator`] | Receive path: replies matched by correlation id under a deadline |
//! | [`RetryPolicy`] | Attempt budget wrapping both paths |
//! | [`MsgSigner`] | Build, dispatch, await, fold |
//!
//! ## Usage
//!
//! ```ignore
//! let config = load_config(None)?;
//! init_logging(config.log_level);
//! let signer = MsgSigner::new(config, Arc::new(bus));
//! let outcome = signer
//!     .clear_sign(ClearSignOperation::new(inputs, "abcd1234", "42"))
//!     .await;
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod address;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod logging;
pub mod retry;
pub mod signer;

// Re-export main types
pub use address::{AddressFields, AddressTemplate, Placeholder, TemplateError};
pub use config::{find_config_file, load_config, ConfigError, MsgSignerConfig, CONFIG_PATHS};
pub use correlator::{Correlator, Receipt, ReceiveRun, Reply, ReplyIdPath};
pub use dispatcher::{Dispatcher, SendProgress, SendRun};
pub use entry::{
    clear_sign_with_config, container_sign_with_config, resolve_inputs, AutomationResponse,
    SigningResponse,
};
pub use error::SignerError;
pub use logging::{init_logging, LogLevel, UnknownLogLevel};
pub use retry::{Attempt, RetryOutcome, RetryPolicy};
pub use signer::MsgSigner;
