//! Association graph traversal.
//!
//! [`Navigator`] borrows the transport and the session context for the
//! length of one adapter operation and answers the structural questions the
//! operations ask: which systems are there, which pools does a system host,
//! what is a pool made of, which access groups see a volume, and so on.
//!
//! Recursive walks (leaf systems, extent composition) use explicit
//! worklists bounded by [`MAX_TRAVERSAL_DEPTH`] and a visited set, so a
//! provider reporting a cyclic graph cannot send us into a loop.

mod masking;
mod pools;
mod ports;

use cim_core::{AssociationQuery, CimInstance, CimInstanceName, CimStatus, WbemClient};
use tracing::{debug, warn};

use crate::error::{Result, SmisError};
use crate::ids::{self, EntityKind};
use crate::session::SessionContext;

/// Deepest nesting followed in system and extent hierarchies.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

const FALLBACK_HINT: &str = "Try add 'force_fallback_mode=yes' into URI";

pub struct Navigator<'a, C: WbemClient> {
    client: &'a C,
    session: &'a SessionContext,
}

impl<'a, C: WbemClient> Navigator<'a, C> {
    pub fn new(client: &'a C, session: &'a SessionContext) -> Self {
        Self { client, session }
    }

    pub fn client(&self) -> &'a C {
        self.client
    }

    pub fn session(&self) -> &'a SessionContext {
        self.session
    }

    // ========================================================================
    // Systems
    // ========================================================================

    /// Top level storage systems, after the URI system filter.
    pub async fn root_systems(&self) -> Result<Vec<CimInstance>> {
        let systems = if self.session.fallback_mode {
            self.fallback_root_systems().await?
        } else {
            self.profile_root_systems().await?
        };

        let mut out: Vec<CimInstance> = Vec::with_capacity(systems.len());
        for system in systems {
            if out.iter().any(|s| s.path.same_object(&system.path)) {
                continue;
            }
            let id = ids::id_of(self.client, EntityKind::System, &system).await?;
            if self.session.system_wanted(&id) {
                out.push(system);
            } else {
                debug!(system = %id, "Filtered out by URI system list");
            }
        }
        Ok(out)
    }

    /// Systems conforming to the SNIA `Array` registration.
    async fn profile_root_systems(&self) -> Result<Vec<CimInstance>> {
        let no_root = || {
            SmisError::NoSupport(format!(
                "Current SMI-S provider does not provide the root CIM_ComputerSystem \
                 associated to 'Array' CIM_RegisteredProfile. {}",
                FALLBACK_HINT
            ))
        };
        let root_profile = self.session.profiles.root_profile().ok_or_else(no_root)?;

        let query = AssociationQuery::new()
            .assoc_class("CIM_ElementConformsToProfile")
            .result_class("CIM_ComputerSystem")
            .properties(crate::mapper::SYSTEM_PROPERTIES);
        let systems = self.client.associators(&root_profile.path, &query).await?;
        if systems.is_empty() {
            return Err(no_root());
        }
        Ok(systems)
    }

    /// Without profile registration, systems are found through the storage
    /// configuration services they host.
    async fn fallback_root_systems(&self) -> Result<Vec<CimInstance>> {
        let services = match self
            .client
            .enumerate_instance_names("CIM_StorageConfigurationService", None)
            .await
        {
            Ok(services) => services,
            Err(e) if e.is_status(&[CimStatus::InvalidClass]) => {
                debug!("No CIM_StorageConfigurationService, enumerating CIM_ComputerSystem");
                return Ok(self
                    .client
                    .enumerate_instances(
                        "CIM_ComputerSystem",
                        None,
                        Some(crate::mapper::SYSTEM_PROPERTIES),
                    )
                    .await?);
            }
            Err(e) => return Err(e.into()),
        };

        let query = AssociationQuery::new()
            .assoc_class("CIM_HostedService")
            .result_class("CIM_ComputerSystem")
            .properties(crate::mapper::SYSTEM_PROPERTIES);
        let mut systems = Vec::new();
        for service in services {
            if let Some(system) = self.client.associators(&service, &query).await?.into_iter().next() {
                systems.push(system);
            }
        }
        Ok(systems)
    }

    /// Every system nested below `system` through `CIM_ComponentCS`.
    pub async fn leaf_systems(&self, system: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_ComponentCS")
            .role("GroupComponent")
            .result_role("PartComponent")
            .result_class("CIM_ComputerSystem")
            .properties(EntityKind::System.id_properties());

        let mut out: Vec<CimInstance> = Vec::new();
        let mut visited = vec![system.clone()];
        let mut worklist = vec![(system.clone(), 0usize)];
        while let Some((current, depth)) = worklist.pop() {
            if depth >= MAX_TRAVERSAL_DEPTH {
                warn!(system = %current, "System hierarchy deeper than {} levels", MAX_TRAVERSAL_DEPTH);
                continue;
            }
            for leaf in self.client.associators(&current, &query).await? {
                if visited.iter().any(|v| v.same_object(&leaf.path)) {
                    continue;
                }
                visited.push(leaf.path.clone());
                worklist.push((leaf.path.clone(), depth + 1));
                out.push(leaf);
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Enumeration and lookup
    // ========================================================================

    /// Vendor namespaces of this session, discovered from the root systems on
    /// first use.
    pub async fn vendor_namespaces(&self) -> Result<&'a [String]> {
        let namespaces = self
            .session
            .vendor_namespace_cell()
            .get_or_try_init(|| async {
                let mut found: Vec<String> = Vec::new();
                for system in self.root_systems().await? {
                    if let Some(ns) = system.path.namespace {
                        if !found.contains(&ns) {
                            found.push(ns);
                        }
                    }
                }
                debug!(namespaces = ?found, "Discovered vendor namespaces");
                Ok::<_, SmisError>(found)
            })
            .await?;
        Ok(namespaces.as_slice())
    }

    /// Instances of `classname` across all vendor namespaces.
    ///
    /// The URI system filter is not applied here.
    pub async fn enumerate(&self, classname: &str, properties: &[&str]) -> Result<Vec<CimInstance>> {
        let mut out = Vec::new();
        for namespace in self.vendor_namespaces().await? {
            out.extend(
                self.client
                    .enumerate_instances(classname, Some(namespace), Some(properties))
                    .await?,
            );
        }
        Ok(out)
    }

    /// The instance of `kind` whose derived id is `id`, if any.
    pub async fn find_by_id(
        &self,
        kind: EntityKind,
        id: &str,
        properties: &[&str],
    ) -> Result<Option<CimInstance>> {
        let Some(classname) = kind.cim_class() else {
            return Ok(None);
        };
        let mut wanted: Vec<&str> = kind.id_properties().to_vec();
        for p in properties {
            if !wanted.contains(p) {
                wanted.push(p);
            }
        }

        for instance in self.enumerate(classname, &wanted).await? {
            if ids::id_of(self.client, kind, &instance).await? == id {
                return Ok(Some(instance));
            }
        }
        Ok(None)
    }

    /// Like [`Navigator::find_by_id`], failing with the kind's not-found error.
    pub async fn instance_by_id(
        &self,
        kind: EntityKind,
        id: &str,
        properties: &[&str],
    ) -> Result<CimInstance> {
        self.find_by_id(kind, id, properties)
            .await?
            .ok_or_else(|| kind.not_found(id))
    }

    /// First instance of `classname` whose `property` equals `value`.
    ///
    /// A class the provider does not implement yields `None`.
    pub async fn class_instance(
        &self,
        classname: &str,
        property: &str,
        value: &str,
    ) -> Result<Option<CimInstance>> {
        let mut found = None;
        for namespace in self.vendor_namespaces().await? {
            let instances = match self
                .client
                .enumerate_instances(classname, Some(namespace), None)
                .await
            {
                Ok(instances) => instances,
                Err(e) if e.is_status(&[CimStatus::InvalidClass]) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            found = instances
                .into_iter()
                .find(|i| i.str_prop(property) == Some(value));
            if found.is_some() {
                break;
            }
        }
        Ok(found)
    }

    /// Like [`Navigator::class_instance`], treating absence as a provider bug.
    pub async fn require_class_instance(
        &self,
        classname: &str,
        property: &str,
        value: &str,
    ) -> Result<CimInstance> {
        self.class_instance(classname, property, value)
            .await?
            .ok_or_else(|| {
                SmisError::InternalBug(format!(
                    "Unable to find class instance {} with property {} with value {}",
                    classname, property, value
                ))
            })
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Element of `result_class` a job worked on.
    pub async fn affected_element(
        &self,
        job: &CimInstanceName,
        result_class: &str,
        properties: &[&str],
    ) -> Result<Option<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_AffectedJobElement")
            .result_class(result_class)
            .properties(properties);
        Ok(self.client.associators(job, &query).await?.into_iter().next())
    }

    /// Hosted service of `service_class` on `system`, as an instance name.
    pub async fn hosted_services(
        &self,
        system: &CimInstanceName,
        service_class: &str,
    ) -> Result<Vec<CimInstanceName>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_HostedService")
            .result_class(service_class);
        Ok(self.client.associator_names(system, &query).await?)
    }

    /// Capabilities instances of `capabilities_class` attached to `element`.
    pub async fn capabilities_of(
        &self,
        element: &CimInstanceName,
        capabilities_class: &str,
    ) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_ElementCapabilities")
            .result_class(capabilities_class);
        Ok(self.client.associators(element, &query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::RegisteredProfiles;
    use cim_core::{CimValue, WbemError};
    use cim_mock::{FailOn, MockWbem};

    fn system(name: &str, ns: &str) -> CimInstance {
        CimInstance::new(
            CimInstanceName::new("ACME_ComputerSystem")
                .with_namespace(ns)
                .with_key("Name", name)
                .with_key("CreationClassName", "ACME_ComputerSystem"),
        )
        .with("Name", name)
        .with("ElementName", name)
        .with("OperationalStatus", CimValue::from(vec![2u16]))
    }

    fn scs(system: &str, ns: &str) -> CimInstance {
        CimInstance::new(
            CimInstanceName::new("ACME_StorageConfigurationService")
                .with_namespace(ns)
                .with_key("Name", format!("SCS-{}", system)),
        )
        .with("SystemName", system)
    }

    fn fallback_mock() -> MockWbem {
        let mock = MockWbem::with_default_namespace("root/acme");
        let sys = mock.add_instance(system("ARRAY-A", "root/acme"));
        let svc = mock.add_instance(scs("ARRAY-A", "root/acme"));
        mock.associate("CIM_HostedService", ("Antecedent", &sys), ("Dependent", &svc));
        mock
    }

    #[tokio::test]
    async fn test_fallback_root_systems_via_configuration_service() {
        let mock = fallback_mock();
        let session = SessionContext::new(true, RegisteredProfiles::default(), None);
        let nav = Navigator::new(&mock, &session);

        let systems = nav.root_systems().await.unwrap();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].str_prop("Name"), Some("ARRAY-A"));
        assert_eq!(nav.vendor_namespaces().await.unwrap(), &["root/acme".to_string()][..]);
    }

    #[tokio::test]
    async fn test_fallback_enumerates_systems_without_configuration_service() {
        let mock = MockWbem::with_default_namespace("root/acme");
        mock.add_instance(system("ARRAY-B", "root/acme"));
        mock.fail(
            FailOn::Class("CIM_StorageConfigurationService".into()),
            WbemError::cim(CimStatus::InvalidClass, "CIM_StorageConfigurationService"),
        );
        let session = SessionContext::new(true, RegisteredProfiles::default(), None);
        let systems = Navigator::new(&mock, &session).root_systems().await.unwrap();
        assert_eq!(systems.len(), 1);
    }

    #[tokio::test]
    async fn test_system_filter_applies() {
        let mock = fallback_mock();
        let session = SessionContext::new(true, RegisteredProfiles::default(), Some(vec!["OTHER".into()]));
        let systems = Navigator::new(&mock, &session).root_systems().await.unwrap();
        assert!(systems.is_empty());
    }

    #[tokio::test]
    async fn test_profile_mode_without_root_is_no_support() {
        let mock = fallback_mock();
        let session = SessionContext::new(false, RegisteredProfiles::default(), None);
        let err = Navigator::new(&mock, &session).root_systems().await.unwrap_err();
        assert!(matches!(err, SmisError::NoSupport(ref m) if m.contains("force_fallback_mode=yes")));
    }

    #[tokio::test]
    async fn test_leaf_systems_tolerate_cycles() {
        let mock = fallback_mock();
        let root = system("ARRAY-A", "root/acme").path;
        let leaf = mock.add_instance(system("NODE-1", "root/acme"));
        let nested = mock.add_instance(system("NODE-2", "root/acme"));
        mock.associate("CIM_ComponentCS", ("GroupComponent", &root), ("PartComponent", &leaf));
        mock.associate("CIM_ComponentCS", ("GroupComponent", &leaf), ("PartComponent", &nested));
        mock.associate("CIM_ComponentCS", ("GroupComponent", &nested), ("PartComponent", &root));

        let session = SessionContext::new(true, RegisteredProfiles::default(), None);
        let leaves = Navigator::new(&mock, &session).leaf_systems(&root).await.unwrap();
        let mut names: Vec<&str> = leaves.iter().filter_map(|s| s.str_prop("Name")).collect();
        names.sort();
        assert_eq!(names, vec!["NODE-1", "NODE-2"]);
    }

    #[tokio::test]
    async fn test_lookup_by_id_and_property() {
        let mock = fallback_mock();
        let session = SessionContext::new(true, RegisteredProfiles::default(), None);
        let nav = Navigator::new(&mock, &session);

        let sys = nav.instance_by_id(EntityKind::System, "ARRAY-A", &[]).await.unwrap();
        assert_eq!(sys.str_prop("Name"), Some("ARRAY-A"));

        let err = nav.instance_by_id(EntityKind::Pool, "nope", &[]).await.unwrap_err();
        assert!(matches!(err, SmisError::PoolNotFound(_)));

        let svc = nav
            .class_instance("CIM_StorageConfigurationService", "SystemName", "ARRAY-A")
            .await
            .unwrap();
        assert!(svc.is_some());

        let err = nav
            .require_class_instance("CIM_StorageConfigurationService", "SystemName", "ARRAY-Z")
            .await
            .unwrap_err();
        assert!(matches!(err, SmisError::InternalBug(_)));
    }
}
