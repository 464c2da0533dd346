//! Transport-agnostic WBEM client abstraction
//!
//! [`WbemClient`] is the minimal set of CIM-XML intrinsic and extrinsic
//! operations the SMI-S adapter relies on. Implementations own the wire
//! protocol, authentication and TLS; callers only see CIM objects and
//! [`WbemError`]s.
//!
//! Operation semantics follow DSP0200:
//! - `enumerate_instances` / `enumerate_instance_names` list a class and its
//!   subclasses in one namespace (`None` selects the connection default).
//! - `associators` / `associator_names` follow association instances from
//!   an object, optionally filtered by association class, result class and
//!   the roles played on either side.
//! - `references` returns the association instances themselves.
//! - `get_instance` fetches one instance by path.
//! - `invoke_method` calls an extrinsic method and returns its numeric
//!   return value together with the output parameters.
//! - `delete_instance` removes an instance.
//!
//! The trait is `Send + Sync` and returns `Send` futures so implementations
//! can be shared across tasks.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::credentials::Credentials;
use crate::error::Result;
use crate::instance::{CimInstance, CimInstanceName};
use crate::value::CimValue;

/// Input or output parameters of an extrinsic method call.
pub type MethodParams = BTreeMap<String, CimValue>;

/// Outcome of an extrinsic method call that reached the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodResult {
    pub return_value: u32,
    pub out_params: MethodParams,
}

impl MethodResult {
    pub fn new(return_value: u32) -> Self {
        Self {
            return_value,
            out_params: MethodParams::new(),
        }
    }

    pub fn with_out(mut self, name: impl Into<String>, value: impl Into<CimValue>) -> Self {
        self.out_params.insert(name.into(), value.into());
        self
    }

    pub fn out_ref(&self, name: &str) -> Option<&CimInstanceName> {
        self.out_params.get(name).and_then(CimValue::as_reference)
    }
}

/// Filters for association traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationQuery {
    pub assoc_class: Option<String>,
    pub result_class: Option<String>,
    pub role: Option<String>,
    pub result_role: Option<String>,
    pub property_list: Option<Vec<String>>,
}

impl AssociationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assoc_class(mut self, class: impl Into<String>) -> Self {
        self.assoc_class = Some(class.into());
        self
    }

    pub fn result_class(mut self, class: impl Into<String>) -> Self {
        self.result_class = Some(class.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn result_role(mut self, role: impl Into<String>) -> Self {
        self.result_role = Some(role.into());
        self
    }

    pub fn properties(mut self, names: &[&str]) -> Self {
        self.property_list = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }
}

/// WBEM operations consumed by the adapter.
pub trait WbemClient: Send + Sync {
    fn enumerate_instances(
        &self,
        classname: &str,
        namespace: Option<&str>,
        property_list: Option<&[&str]>,
    ) -> impl Future<Output = Result<Vec<CimInstance>>> + Send;

    fn enumerate_instance_names(
        &self,
        classname: &str,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<Vec<CimInstanceName>>> + Send;

    fn associators(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> impl Future<Output = Result<Vec<CimInstance>>> + Send;

    fn associator_names(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> impl Future<Output = Result<Vec<CimInstanceName>>> + Send;

    /// Association instances referring to `object`. Only `result_class`,
    /// `role` and `property_list` of the query apply.
    fn references(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> impl Future<Output = Result<Vec<CimInstance>>> + Send;

    fn get_instance(
        &self,
        name: &CimInstanceName,
        property_list: Option<&[&str]>,
    ) -> impl Future<Output = Result<CimInstance>> + Send;

    fn invoke_method(
        &self,
        method: &str,
        object: &CimInstanceName,
        params: MethodParams,
    ) -> impl Future<Output = Result<MethodResult>> + Send;

    fn delete_instance(&self, name: &CimInstanceName) -> impl Future<Output = Result<()>> + Send;
}

impl<T: WbemClient> WbemClient for Arc<T> {
    fn enumerate_instances(
        &self,
        classname: &str,
        namespace: Option<&str>,
        property_list: Option<&[&str]>,
    ) -> impl Future<Output = Result<Vec<CimInstance>>> + Send {
        (**self).enumerate_instances(classname, namespace, property_list)
    }

    fn enumerate_instance_names(
        &self,
        classname: &str,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<Vec<CimInstanceName>>> + Send {
        (**self).enumerate_instance_names(classname, namespace)
    }

    fn associators(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> impl Future<Output = Result<Vec<CimInstance>>> + Send {
        (**self).associators(object, query)
    }

    fn associator_names(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> impl Future<Output = Result<Vec<CimInstanceName>>> + Send {
        (**self).associator_names(object, query)
    }

    fn references(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> impl Future<Output = Result<Vec<CimInstance>>> + Send {
        (**self).references(object, query)
    }

    fn get_instance(
        &self,
        name: &CimInstanceName,
        property_list: Option<&[&str]>,
    ) -> impl Future<Output = Result<CimInstance>> + Send {
        (**self).get_instance(name, property_list)
    }

    fn invoke_method(
        &self,
        method: &str,
        object: &CimInstanceName,
        params: MethodParams,
    ) -> impl Future<Output = Result<MethodResult>> + Send {
        (**self).invoke_method(method, object, params)
    }

    fn delete_instance(&self, name: &CimInstanceName) -> impl Future<Output = Result<()>> + Send {
        (**self).delete_instance(name)
    }
}

/// Where and how to open a WBEM connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Base URL, e.g. `https://array.example.com:5989`.
    pub url: String,
    /// Namespace used when an operation does not name one.
    pub default_namespace: String,
    pub verify_certificates: bool,
}

/// Factory for [`WbemClient`] connections.
pub trait WbemConnector: Send + Sync {
    type Client: WbemClient;

    fn connect(
        &self,
        target: &ConnectTarget,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Client>> + Send;
}
