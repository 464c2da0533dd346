//! The adapter facade.
//!
//! [`SmisPlugin`] owns one WBEM connection and the [`SessionContext`]
//! negotiated at registration. Every public operation is timed through
//! [`OperationTimer`](crate::metrics::OperationTimer) and opens a tracing
//! span; mutating operations hand back a [`Completion`](crate::job::Completion)
//! that is either the finished result or a job token to poll.

mod inventory;
mod jobs;
mod masking;
mod pool;
mod system;
mod volume;

use std::time::Duration;

use cim_core::{Credentials, WbemClient, WbemConnector};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::ConnectionConfig;
use crate::error::{Result, SmisError};
use crate::navigator::Navigator;
use crate::profile::{self, Profile, SpecVersion};
use crate::session::SessionContext;

/// Name and version reported by [`SmisPlugin::plugin_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub description: String,
    pub version: String,
}

/// A registered SMI-S session.
pub struct SmisPlugin<C: WbemClient> {
    client: C,
    session: SessionContext,
    config: ConnectionConfig,
    timeout: Duration,
}

impl<C: WbemClient> SmisPlugin<C> {
    /// Connect to the provider named by `uri` and negotiate the session.
    ///
    /// With `force_fallback_mode=yes` no profile registration is probed.
    /// Otherwise a provider that registers profiles must register SNIA
    /// `Array` 1.4 or later; one that registers nothing is driven in
    /// fallback mode.
    #[instrument(skip(connector, password))]
    pub async fn register<K>(connector: &K, uri: &str, password: &str, timeout_ms: u64) -> Result<Self>
    where
        K: WbemConnector<Client = C>,
    {
        let config = ConnectionConfig::parse(uri)?;
        let credentials = Credentials::new(config.username.clone(), password);
        let target = config.connect_target();
        info!(url = %target.url, namespace = %target.default_namespace, "Connecting to SMI-S provider");
        let client = connector.connect(&target, &credentials).await?;

        let pinned = config.namespace.clone().map(|ns| vec![ns]);
        let session = if config.force_fallback_mode {
            info!("Fallback mode forced by URI");
            fallback_session(&config, pinned)
        } else {
            let profiles = profile::discover(&client, config.namespace.as_deref()).await?;
            if profiles.is_empty() {
                info!("No registered profiles found, using fallback mode");
                fallback_session(&config, pinned)
            } else {
                if profiles
                    .supported(Profile::Array, SpecVersion::SMIS_1_4, false)
                    .is_none()
                {
                    return Err(SmisError::NoSupport(
                        "Target SMI-S provider does not support SNIA SMI-S SPEC 1.4 'Array' profile"
                            .to_string(),
                    ));
                }
                debug!(count = profiles.len(), "Registered profiles");
                SessionContext::new(false, profiles, config.systems.clone())
            }
        };

        Ok(Self {
            client,
            session,
            config,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn time_out_set(&mut self, ms: u64) {
        self.timeout = Duration::from_millis(ms);
    }

    pub fn time_out_get(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    pub fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            description: "Generic SMI-S support".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn is_fallback_mode(&self) -> bool {
        self.session.fallback_mode
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Vendor namespaces in use, discovering them if needed.
    pub async fn vendor_namespaces(&self) -> Result<Vec<String>> {
        Ok(self.nav().vendor_namespaces().await?.to_vec())
    }

    fn nav(&self) -> Navigator<'_, C> {
        Navigator::new(&self.client, &self.session)
    }

    #[cfg(test)]
    pub(crate) fn with_session(client: C, session: SessionContext) -> Self {
        Self {
            client,
            session,
            config: ConnectionConfig {
                use_tls: false,
                host: "localhost".to_string(),
                port: crate::config::WBEM_HTTP_PORT,
                username: "test".to_string(),
                namespace: None,
                systems: None,
                force_fallback_mode: false,
                verify_certificates: true,
            },
            timeout: Duration::from_secs(5),
        }
    }
}

fn fallback_session(config: &ConnectionConfig, pinned: Option<Vec<String>>) -> SessionContext {
    let session = SessionContext::new(true, Default::default(), config.systems.clone());
    match pinned {
        Some(namespaces) => session.with_vendor_namespaces(namespaces),
        None => session,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use cim_core::{CimInstance, CimInstanceName, CimStatus, WbemError};
    use cim_mock::{FailOn, MockConnector, MockWbem};

    fn registered(name: &str, version: &str) -> CimInstance {
        CimInstance::new(
            CimInstanceName::new("CIM_RegisteredProfile")
                .with_namespace("interop")
                .with_key("InstanceID", format!("{}-{}", name, version)),
        )
        .with("RegisteredName", name)
        .with("RegisteredVersion", version)
        .with("RegisteredOrganization", 11u16)
    }

    #[tokio::test]
    async fn test_register_with_array_profile() {
        let mock = Arc::new(MockWbem::new());
        mock.add_instance(registered("Array", "1.5.1"));
        let connector = MockConnector::new(Arc::clone(&mock));

        let plugin = SmisPlugin::register(&connector, "smispy://admin@array/", "secret", 30_000)
            .await
            .unwrap();
        assert!(!plugin.is_fallback_mode());
        assert_eq!(plugin.time_out_get(), 30_000);
        assert_eq!(connector.attempts()[0].0.default_namespace, "interop");
        assert_eq!(connector.attempts()[0].1, "admin");
    }

    #[tokio::test]
    async fn test_register_rejects_old_array_profile() {
        let mock = Arc::new(MockWbem::new());
        mock.add_instance(registered("Array", "1.3"));
        let connector = MockConnector::new(mock);

        let err = SmisPlugin::register(&connector, "smispy://admin@array/", "secret", 1000)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SmisError::NoSupport(ref m) if m.contains("'Array' profile")));
    }

    #[tokio::test]
    async fn test_register_without_profiles_is_fallback() {
        let mock = Arc::new(MockWbem::new());
        mock.fail(
            FailOn::Namespace("root/interop".into()),
            WbemError::cim(CimStatus::InvalidNamespace, "root/interop"),
        );
        let connector = MockConnector::new(mock);

        let plugin = SmisPlugin::register(&connector, "smispy://admin@array/?namespace=root/acme", "pw", 1000)
            .await
            .unwrap();
        assert!(plugin.is_fallback_mode());
        assert_eq!(plugin.session().vendor_namespaces(), Some(&["root/acme".to_string()][..]));
    }

    #[tokio::test]
    async fn test_forced_fallback_skips_probe() {
        let mock = Arc::new(MockWbem::new());
        mock.add_instance(registered("Array", "1.5"));
        let connector = MockConnector::new(Arc::clone(&mock));

        let mut plugin = SmisPlugin::register(
            &connector,
            "smispy+ssl://admin@array/?force_fallback_mode=yes",
            "pw",
            1000,
        )
        .await
        .unwrap();
        assert!(plugin.is_fallback_mode());
        assert!(mock.calls().is_empty());

        plugin.time_out_set(5000);
        assert_eq!(plugin.time_out_get(), 5000);
        assert_eq!(plugin.plugin_info().description, "Generic SMI-S support");
    }

    #[tokio::test]
    async fn test_connection_errors_are_translated() {
        let mock = Arc::new(MockWbem::new());
        let connector = MockConnector::new(mock);
        connector.fail_next(WbemError::ConnectionRefused("array:5988".into()));

        let err = SmisPlugin::register(&connector, "smispy://admin@array/", "pw", 1000)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SmisError::ConnectionRefused(_)));
    }
}
