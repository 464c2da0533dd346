//! Typed CIM property values.
//!
//! CIM distinguishes many integer widths (uint8..uint64, sint8..sint64);
//! the adapter only ever compares them as numbers, so they collapse into
//! `Uint` and `Sint` here.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::instance::CimInstanceName;

/// A single CIM property, key binding or method parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CimValue {
    Null,
    Bool(bool),
    Uint(u64),
    Sint(i64),
    String(String),
    Reference(CimInstanceName),
    Array(Vec<CimValue>),
}

impl CimValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CimValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CimValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned view of an integer value. Negative signed values yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            CimValue::Uint(v) => Some(*v),
            CimValue::Sint(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CimValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&CimInstanceName> {
        match self {
            CimValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CimValue]> {
        match self {
            CimValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Integer elements of an array value, skipping anything non-numeric.
    pub fn u64_array(&self) -> Vec<u64> {
        self.as_array()
            .map(|items| items.iter().filter_map(CimValue::as_u64).collect())
            .unwrap_or_default()
    }

    /// String elements of an array value, skipping anything non-string.
    pub fn string_array(&self) -> Vec<String> {
        self.as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Display for CimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CimValue::Null => Ok(()),
            CimValue::Bool(b) => write!(f, "{}", b),
            CimValue::Uint(v) => write!(f, "{}", v),
            CimValue::Sint(v) => write!(f, "{}", v),
            CimValue::String(s) => write!(f, "{}", s),
            CimValue::Reference(r) => write!(f, "{}", r),
            CimValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<&str> for CimValue {
    fn from(s: &str) -> Self {
        CimValue::String(s.to_string())
    }
}

impl From<String> for CimValue {
    fn from(s: String) -> Self {
        CimValue::String(s)
    }
}

impl From<bool> for CimValue {
    fn from(b: bool) -> Self {
        CimValue::Bool(b)
    }
}

impl From<u16> for CimValue {
    fn from(v: u16) -> Self {
        CimValue::Uint(u64::from(v))
    }
}

impl From<u32> for CimValue {
    fn from(v: u32) -> Self {
        CimValue::Uint(u64::from(v))
    }
}

impl From<u64> for CimValue {
    fn from(v: u64) -> Self {
        CimValue::Uint(v)
    }
}

impl From<i64> for CimValue {
    fn from(v: i64) -> Self {
        CimValue::Sint(v)
    }
}

impl From<CimInstanceName> for CimValue {
    fn from(r: CimInstanceName) -> Self {
        CimValue::Reference(r)
    }
}

impl<T: Into<CimValue>> From<Vec<T>> for CimValue {
    fn from(items: Vec<T>) -> Self {
        CimValue::Array(items.into_iter().map(Into::into).collect())
    }
}
