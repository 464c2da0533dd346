//! Error taxonomy of the adapter and translation of transport failures.

use std::fmt::{self, Display};

use cim_core::WbemError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmisError {
    // ========================================================================
    // Lookup failures
    // ========================================================================
    #[error("system '{0}' not found")]
    SystemNotFound(String),

    #[error("pool '{0}' not found")]
    PoolNotFound(String),

    #[error("volume '{0}' not found")]
    VolumeNotFound(String),

    #[error("disk '{0}' not found")]
    DiskNotFound(String),

    #[error("access group '{0}' not found")]
    AccessGroupNotFound(String),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    // ========================================================================
    // Capability and argument errors
    // ========================================================================
    #[error("not supported: {0}")]
    NoSupport(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // Transport errors
    // ========================================================================
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("host is down: {0}")]
    HostDown(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    // ========================================================================
    // Provider misbehaviour and everything else
    // ========================================================================
    #[error("internal bug: {0}")]
    InternalBug(String),

    #[error("plugin error: {0}")]
    Plugin(String),
}

/// Stable error codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFoundSystem,
    NotFoundPool,
    NotFoundVolume,
    NotFoundDisk,
    NotFoundAccessGroup,
    NotFoundJob,
    NoSupport,
    InvalidArgument,
    NetworkConnrefused,
    NetworkHostdown,
    NetworkError,
    AuthFailed,
    InternalBug,
    PluginError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFoundSystem => "NOT_FOUND_SYSTEM",
            ErrorCode::NotFoundPool => "NOT_FOUND_POOL",
            ErrorCode::NotFoundVolume => "NOT_FOUND_VOLUME",
            ErrorCode::NotFoundDisk => "NOT_FOUND_DISK",
            ErrorCode::NotFoundAccessGroup => "NOT_FOUND_ACCESS_GROUP",
            ErrorCode::NotFoundJob => "NOT_FOUND_JOB",
            ErrorCode::NoSupport => "NO_SUPPORT",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NetworkConnrefused => "NETWORK_CONNREFUSED",
            ErrorCode::NetworkHostdown => "NETWORK_HOSTDOWN",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::InternalBug => "INTERNAL_BUG",
            ErrorCode::PluginError => "PLUGIN_ERROR",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl SmisError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SmisError::SystemNotFound(_) => ErrorCode::NotFoundSystem,
            SmisError::PoolNotFound(_) => ErrorCode::NotFoundPool,
            SmisError::VolumeNotFound(_) => ErrorCode::NotFoundVolume,
            SmisError::DiskNotFound(_) => ErrorCode::NotFoundDisk,
            SmisError::AccessGroupNotFound(_) => ErrorCode::NotFoundAccessGroup,
            SmisError::JobNotFound(_) => ErrorCode::NotFoundJob,
            SmisError::NoSupport(_) => ErrorCode::NoSupport,
            SmisError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            SmisError::ConnectionRefused(_) => ErrorCode::NetworkConnrefused,
            SmisError::HostDown(_) => ErrorCode::NetworkHostdown,
            SmisError::Network(_) => ErrorCode::NetworkError,
            SmisError::AuthFailed(_) => ErrorCode::AuthFailed,
            SmisError::InternalBug(_) => ErrorCode::InternalBug,
            SmisError::Plugin(_) => ErrorCode::PluginError,
        }
    }
}

/// Transport failures map onto the taxonomy; CIM errors that escape to
/// this point mean the provider broke an assumption we rely on.
impl From<WbemError> for SmisError {
    fn from(err: WbemError) -> Self {
        match err {
            WbemError::ConnectionRefused(msg) => SmisError::ConnectionRefused(msg),
            WbemError::HostUnreachable(msg) => SmisError::HostDown(msg),
            WbemError::Auth(msg) => SmisError::AuthFailed(msg),
            WbemError::Http(msg) => SmisError::Network(msg),
            WbemError::Cim {
                status,
                description,
            } => SmisError::InternalBug(format!("{}: {}", status, description)),
            WbemError::Other(msg) => SmisError::Plugin(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, SmisError>;
