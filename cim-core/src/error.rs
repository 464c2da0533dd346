use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// DMTF CIM status codes (DSP0200).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CimStatus {
    Failed,
    AccessDenied,
    InvalidNamespace,
    InvalidParameter,
    InvalidClass,
    NotFound,
    NotSupported,
    ClassHasChildren,
    ClassHasInstances,
    InvalidSuperclass,
    AlreadyExists,
    NoSuchProperty,
    TypeMismatch,
    QueryLanguageNotSupported,
    InvalidQuery,
    MethodNotAvailable,
    MethodNotFound,
    Other(u32),
}

impl CimStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => CimStatus::Failed,
            2 => CimStatus::AccessDenied,
            3 => CimStatus::InvalidNamespace,
            4 => CimStatus::InvalidParameter,
            5 => CimStatus::InvalidClass,
            6 => CimStatus::NotFound,
            7 => CimStatus::NotSupported,
            8 => CimStatus::ClassHasChildren,
            9 => CimStatus::ClassHasInstances,
            10 => CimStatus::InvalidSuperclass,
            11 => CimStatus::AlreadyExists,
            12 => CimStatus::NoSuchProperty,
            13 => CimStatus::TypeMismatch,
            14 => CimStatus::QueryLanguageNotSupported,
            15 => CimStatus::InvalidQuery,
            16 => CimStatus::MethodNotAvailable,
            17 => CimStatus::MethodNotFound,
            other => CimStatus::Other(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            CimStatus::Failed => 1,
            CimStatus::AccessDenied => 2,
            CimStatus::InvalidNamespace => 3,
            CimStatus::InvalidParameter => 4,
            CimStatus::InvalidClass => 5,
            CimStatus::NotFound => 6,
            CimStatus::NotSupported => 7,
            CimStatus::ClassHasChildren => 8,
            CimStatus::ClassHasInstances => 9,
            CimStatus::InvalidSuperclass => 10,
            CimStatus::AlreadyExists => 11,
            CimStatus::NoSuchProperty => 12,
            CimStatus::TypeMismatch => 13,
            CimStatus::QueryLanguageNotSupported => 14,
            CimStatus::InvalidQuery => 15,
            CimStatus::MethodNotAvailable => 16,
            CimStatus::MethodNotFound => 17,
            CimStatus::Other(code) => *code,
        }
    }
}

impl Display for CimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CimStatus::Failed => "CIM_ERR_FAILED",
            CimStatus::AccessDenied => "CIM_ERR_ACCESS_DENIED",
            CimStatus::InvalidNamespace => "CIM_ERR_INVALID_NAMESPACE",
            CimStatus::InvalidParameter => "CIM_ERR_INVALID_PARAMETER",
            CimStatus::InvalidClass => "CIM_ERR_INVALID_CLASS",
            CimStatus::NotFound => "CIM_ERR_NOT_FOUND",
            CimStatus::NotSupported => "CIM_ERR_NOT_SUPPORTED",
            CimStatus::ClassHasChildren => "CIM_ERR_CLASS_HAS_CHILDREN",
            CimStatus::ClassHasInstances => "CIM_ERR_CLASS_HAS_INSTANCES",
            CimStatus::InvalidSuperclass => "CIM_ERR_INVALID_SUPERCLASS",
            CimStatus::AlreadyExists => "CIM_ERR_ALREADY_EXISTS",
            CimStatus::NoSuchProperty => "CIM_ERR_NO_SUCH_PROPERTY",
            CimStatus::TypeMismatch => "CIM_ERR_TYPE_MISMATCH",
            CimStatus::QueryLanguageNotSupported => "CIM_ERR_QUERY_LANGUAGE_NOT_SUPPORTED",
            CimStatus::InvalidQuery => "CIM_ERR_INVALID_QUERY",
            CimStatus::MethodNotAvailable => "CIM_ERR_METHOD_NOT_AVAILABLE",
            CimStatus::MethodNotFound => "CIM_ERR_METHOD_NOT_FOUND",
            CimStatus::Other(code) => return write!(f, "CIM_ERR_{}", code),
        };
        write!(f, "{}", name)
    }
}

/// Failures reported by a WBEM transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WbemError {
    #[error("{status}: {description}")]
    Cim { status: CimStatus, description: String },

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

impl WbemError {
    pub fn cim(status: CimStatus, description: impl Into<String>) -> Self {
        WbemError::Cim {
            status,
            description: description.into(),
        }
    }

    pub fn status(&self) -> Option<CimStatus> {
        match self {
            WbemError::Cim { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when this is a CIM error carrying one of `statuses`.
    pub fn is_status(&self, statuses: &[CimStatus]) -> bool {
        self.status().is_some_and(|s| statuses.contains(&s))
    }

    /// The server does not implement the class or operation at all.
    pub fn is_unsupported_class(&self) -> bool {
        self.is_status(&[CimStatus::NotSupported, CimStatus::InvalidClass])
    }
}

pub type Result<T> = std::result::Result<T, WbemError>;
