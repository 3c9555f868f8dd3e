//! Centralized error types and handling

use thiserror::Error;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("network namespace error: {0}")]
    Namespace(#[from] NamespaceError),

    #[error("name resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--{flag} out of range [{range}], got: {value}")]
    OutOfRange {
        flag: &'static str,
        value: String,
        range: &'static str,
    },

    #[error("invalid duration '{0}': expected forms like '100ms' or '1s'")]
    InvalidDuration(String),
}

/// Container discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot connect to the Docker daemon: {0}")]
    ConnectionFailed(String),

    #[error("container not found: {container}")]
    ContainerNotFound { container: String },

    #[error("container '{container}' is not running")]
    NotRunning { container: String },

    #[error("Docker API error: {0}")]
    Api(String),
}

/// Network namespace switching errors
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("namespace path does not exist: {0}")]
    NotFound(String),

    #[error("insufficient privileges for network namespace operation")]
    InsufficientPrivileges,

    #[error("failed to switch network namespace: {0}")]
    SwitchFailed(String),

    #[error("namespace worker thread failed: {0}")]
    WorkerFailed(String),
}

/// Name resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to dial DNS resolver at {addr}: {reason}")]
    Dial { addr: String, reason: String },

    #[error("DNS query failed: {0}")]
    Query(String),

    #[error("malformed DNS message: {0}")]
    Protocol(String),

    #[error("query for '{name}' yields no answers")]
    NoAnswers { name: String },

    #[error("resolution cancelled")]
    Cancelled,
}

/// Address probing errors
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("not an IP address literal: {0}")]
    BadAddress(String),

    #[error("cannot open echo socket: {0}")]
    Socket(String),

    #[error("no replies or too many losses")]
    Unreachable,

    #[error("probe cancelled")]
    Cancelled,
}
