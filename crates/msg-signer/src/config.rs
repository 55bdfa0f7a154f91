//! # Signer Configuration
//!
//! Loaded from a TOML file with a single `[msg_signer]` table:
//!
//! ```toml
//! [msg_signer]
//! messaging_brokers = ["amqps://broker-01:5671", "amqps://broker-02:5671"]
//! messaging_cert = "~/messaging/cert.crt"
//! messaging_ca_cert = "~/messaging/ca_cert.crt"
//! topic_send_to = "topic://Topic.sign"
//! topic_listen_to = "queue://Consumer.{creator}.{task_id}.Topic.sign.{task_id}"
//! creator = "msg-sign"
//! environment = "prod"
//! service = "msg-sign"
//! timeout = 60
//! retries = 3
//! message_id_key = "request_id"
//! log_level = "info"
//! ```
//!
//! Unknown keys are rejected. Everything is validated before a signer is
//! built, so a loaded [`MsgSignerConfig`] is always usable.

use crate::address::{AddressFields, AddressTemplate, TemplateError};
use crate::logging::{LogLevel, UnknownLogLevel};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use sign_bus::{BrokerEndpoint, PeerAuthentication, TlsSettings};
use sign_types::{DescribeFields, FieldDoc, SignOperation};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Locations searched, in order, when no explicit file exists.
pub const CONFIG_PATHS: [&str; 2] = ["~/.config/msg-sign/conf.toml", "/etc/msg-sign/conf.toml"];

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRIES: u32 = 3;

/// Configuration errors. Always raised before any operation is attempted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration file found: {}", format_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid address template in {field}: {source}")]
    Template {
        field: &'static str,
        #[source]
        source: TemplateError,
    },

    #[error(transparent)]
    LogLevel(#[from] UnknownLogLevel),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    msg_signer: SignerSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignerSection {
    messaging_brokers: Vec<String>,
    messaging_cert: String,
    messaging_ca_cert: String,
    topic_send_to: String,
    topic_listen_to: String,
    creator: String,
    environment: String,
    service: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default = "default_retries")]
    retries: u32,
    message_id_key: String,
    #[serde(default)]
    log_level: Option<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

/// Validated signer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgSignerConfig {
    pub messaging_brokers: Vec<String>,
    /// Client certificate, `~` already expanded.
    pub messaging_cert: PathBuf,
    pub messaging_ca_cert: PathBuf,
    pub topic_send_to: AddressTemplate,
    pub topic_listen_to: AddressTemplate,
    /// Requester identity written into every request.
    pub creator: String,
    pub environment: String,
    pub service: String,
    /// Deadline of one receive attempt.
    pub timeout: Duration,
    /// Attempt budget for both the send and the receive path.
    pub retries: u32,
    /// Key of the correlation identifier inside the `msg` object of a reply.
    pub message_id_key: String,
    pub log_level: LogLevel,
}

impl MsgSignerConfig {
    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_section(file.msg_signer)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    fn from_section(section: SignerSection) -> Result<Self, ConfigError> {
        if section.messaging_brokers.is_empty() {
            return Err(ConfigError::Invalid {
                field: "messaging_brokers",
                reason: "at least one broker is required".into(),
            });
        }
        if section.retries == 0 {
            return Err(ConfigError::Invalid {
                field: "retries",
                reason: "must be at least 1".into(),
            });
        }
        if section.timeout == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "must be at least 1 second".into(),
            });
        }
        if section.message_id_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "message_id_key",
                reason: "must not be empty".into(),
            });
        }

        let topic_send_to =
            AddressTemplate::parse(&section.topic_send_to).map_err(|source| {
                ConfigError::Template {
                    field: "topic_send_to",
                    source,
                }
            })?;
        let topic_listen_to =
            AddressTemplate::parse(&section.topic_listen_to).map_err(|source| {
                ConfigError::Template {
                    field: "topic_listen_to",
                    source,
                }
            })?;
        let log_level = match section.log_level.as_deref() {
            Some(level) => level.parse()?,
            None => LogLevel::default(),
        };

        Ok(Self {
            messaging_brokers: section.messaging_brokers,
            messaging_cert: expand_user(&section.messaging_cert),
            messaging_ca_cert: expand_user(&section.messaging_ca_cert),
            topic_send_to,
            topic_listen_to,
            creator: section.creator,
            environment: section.environment,
            service: section.service,
            timeout: Duration::from_secs(section.timeout),
            retries: section.retries,
            message_id_key: section.message_id_key,
            log_level,
        })
    }

    /// Brokers and transport security used by both paths. Peers are never
    /// authenticated.
    #[must_use]
    pub fn endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint::new(
            self.messaging_brokers.clone(),
            TlsSettings {
                client_cert: Some(self.messaging_cert.clone()),
                ca_cert: Some(self.messaging_ca_cert.clone()),
                peer_authentication: PeerAuthentication::Anonymous,
            },
        )
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries)
    }

    /// Template fields for an operation issued by this signer.
    #[must_use]
    pub fn address_fields<'a>(&'a self, operation: &'a SignOperation) -> AddressFields<'a> {
        AddressFields {
            creator: &self.creator,
            environment: &self.environment,
            service: &self.service,
            task_id: operation.task_id(),
            signing_key: operation.signing_key(),
        }
    }
}

impl DescribeFields for MsgSignerConfig {
    fn field_docs() -> &'static [FieldDoc] {
        const DOCS: &[FieldDoc] = &[
            FieldDoc::new(
                "messaging_brokers",
                "List of brokers URLS",
                r#"["amqps://broker-01:5671", "amqps://broker-02:5671"]"#,
            ),
            FieldDoc::new(
                "messaging_cert",
                "Client certificate for messaging authorization",
                "~/messaging/cert.crt",
            ),
            FieldDoc::new(
                "messaging_ca_cert",
                "Messaging CA certificate",
                "~/messaging/ca_cert.crt",
            ),
            FieldDoc::new(
                "topic_send_to",
                "Topic where to send the messages",
                "topic://Topic.sign",
            ),
            FieldDoc::new(
                "topic_listen_to",
                "Topic where to listen for replies",
                "queue://Consumer.{creator}.{task_id}.Topic.sign.{task_id}",
            ),
            FieldDoc::new(
                "creator",
                "Identification of creator of signing request",
                "msg-sign",
            ),
            FieldDoc::new(
                "environment",
                "Environment identification in sent messages",
                "prod",
            ),
            FieldDoc::new("service", "Service identificator", "msg-sign"),
            FieldDoc::new("timeout", "Timeout in seconds for receiving replies", "60"),
            FieldDoc::new("retries", "Attempts for messaging send/receive", "3"),
            FieldDoc::new(
                "message_id_key",
                "Attribute name in message body which should be used as message id",
                "request_id",
            ),
            FieldDoc::new("log_level", "Log level", "debug"),
        ];
        DOCS
    }
}

/// Expand a leading `~` to the user's home directory.
#[must_use]
pub fn expand_user(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Pick the configuration file: `explicit` when it exists, else the first
/// existing default location.
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let defaults: Vec<PathBuf> = CONFIG_PATHS.iter().map(|p| expand_user(p)).collect();
    find_config_file_in(explicit, &defaults)
}

/// [`find_config_file`] over an explicit candidate list.
pub fn find_config_file_in(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }
    if let Some(found) = candidates.iter().find(|c| c.exists()) {
        return Ok(found.clone());
    }

    let mut searched = candidates.to_vec();
    if let Some(path) = explicit {
        if !searched.iter().any(|c| c == path) {
            searched.push(path.to_path_buf());
        }
    }
    Err(ConfigError::NotFound { searched })
}

/// Locate and load the signer configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<MsgSignerConfig, ConfigError> {
    let path = find_config_file(explicit)?;
    tracing::debug!(path = %path.display(), "Loading signer configuration");
    MsgSignerConfig::load(&path)
}
