//! Connection URI parsing.
//!
//! ```text
//! smispy://user@host[:port]/?namespace=root/emc&systems=SYS1:SYS2
//! smispy+ssl://user@host/?no_ssl_verify=yes&force_fallback_mode=yes
//! ```

use std::time::Duration;

use cim_core::ConnectTarget;
use tracing::debug;
use url::Url;

use crate::error::{Result, SmisError};

/// IANA port for CIM-XML over HTTP
pub const WBEM_HTTP_PORT: u16 = 5988;
/// IANA port for CIM-XML over HTTPS
pub const WBEM_HTTPS_PORT: u16 = 5989;
/// Namespace used when the URI does not name one
pub const DEFAULT_NAMESPACE: &str = "interop";
/// Interval between two job status polls
pub const JOB_POLL_INTERVAL: Duration = Duration::from_millis(250);

const SCHEME_PLAIN: &str = "smispy";
const SCHEME_TLS: &str = "smispy+ssl";

/// Everything needed to open a session, taken from the connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub use_tls: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Namespace given explicitly in the URI
    pub namespace: Option<String>,
    /// Only report these system ids (`systems=a:b`)
    pub systems: Option<Vec<String>>,
    pub force_fallback_mode: bool,
    pub verify_certificates: bool,
}

impl ConnectionConfig {
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| SmisError::InvalidArgument(format!("malformed URI '{}': {}", uri, e)))?;

        let use_tls = match url.scheme() {
            SCHEME_PLAIN => false,
            SCHEME_TLS => true,
            other => {
                return Err(SmisError::InvalidArgument(format!(
                    "unsupported URI scheme '{}': expected {} or {}",
                    other, SCHEME_PLAIN, SCHEME_TLS
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SmisError::InvalidArgument(format!("URI '{}' has no host", uri)))?
            .to_string();
        let port = url
            .port()
            .unwrap_or(if use_tls { WBEM_HTTPS_PORT } else { WBEM_HTTP_PORT });

        let mut config = Self {
            use_tls,
            host,
            port,
            username: url.username().to_string(),
            namespace: None,
            systems: None,
            force_fallback_mode: false,
            verify_certificates: true,
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "namespace" if !value.is_empty() => config.namespace = Some(value.into_owned()),
                "systems" => {
                    config.systems = Some(
                        value
                            .split(':')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect(),
                    )
                }
                "force_fallback_mode" => config.force_fallback_mode = value == "yes",
                "no_ssl_verify" => config.verify_certificates = value != "yes",
                other => debug!(parameter = other, "Ignoring unknown URI parameter"),
            }
        }

        Ok(config)
    }

    /// Base URL of the CIMOM, e.g. `https://array:5989`.
    pub fn base_url(&self) -> String {
        let protocol = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", protocol, self.host, self.port)
    }

    pub fn connect_target(&self) -> ConnectTarget {
        ConnectTarget {
            url: self.base_url(),
            default_namespace: self
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            verify_certificates: self.verify_certificates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_uri_defaults() {
        let config = ConnectionConfig::parse("smispy://admin@array.example.com").unwrap();
        assert!(!config.use_tls);
        assert_eq!(config.port, WBEM_HTTP_PORT);
        assert_eq!(config.username, "admin");
        assert_eq!(config.namespace, None);
        assert!(config.verify_certificates);
        assert_eq!(config.base_url(), "http://array.example.com:5988");
        assert_eq!(config.connect_target().default_namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_ssl_uri_with_parameters() {
        let config = ConnectionConfig::parse(
            "smispy+ssl://root@10.0.0.5:15989/?namespace=root/emc&systems=SYS-A:SYS-B&no_ssl_verify=yes&force_fallback_mode=yes",
        )
        .unwrap();
        assert!(config.use_tls);
        assert_eq!(config.port, 15989);
        assert_eq!(config.namespace.as_deref(), Some("root/emc"));
        assert_eq!(
            config.systems,
            Some(vec!["SYS-A".to_string(), "SYS-B".to_string()])
        );
        assert!(config.force_fallback_mode);
        assert!(!config.verify_certificates);
        assert_eq!(config.connect_target().url, "https://10.0.0.5:15989");
    }

    #[test]
    fn test_ssl_default_port() {
        let config = ConnectionConfig::parse("smispy+ssl://u@host/").unwrap();
        assert_eq!(config.port, WBEM_HTTPS_PORT);
    }

    #[test]
    fn test_rejects_foreign_scheme() {
        let err = ConnectionConfig::parse("http://host").unwrap_err();
        assert!(matches!(err, SmisError::InvalidArgument(_)));
        assert!(ConnectionConfig::parse("not a uri").is_err());
    }
}
