//! CIM object model and WBEM transport abstraction
//!
//! This crate holds the pieces shared by the SMI-S adapter and anything
//! that talks CIM/WBEM on its behalf:
//! - `value`: typed CIM property values
//! - `instance`: instance names (object paths) and instances
//! - `client`: the transport-agnostic [`WbemClient`] trait and connector
//! - `error`: CIM status codes and transport errors
//! - `credentials`: username/password pair with redacted formatting

pub mod client;
pub mod credentials;
pub mod error;
pub mod instance;
pub mod value;

pub use client::{AssociationQuery, ConnectTarget, MethodParams, MethodResult, WbemClient, WbemConnector};
pub use credentials::Credentials;
pub use error::{CimStatus, Result, WbemError};
pub use instance::{CimInstance, CimInstanceName};
pub use value::CimValue;
