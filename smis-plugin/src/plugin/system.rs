//! Systems and per-system capability reporting.

use cim_core::{AssociationQuery, CimStatus, WbemClient};
use tracing::{debug, instrument};

use super::SmisPlugin;
use crate::capabilities::{Capability, CapabilitySet};
use crate::dmtf::{pool as pool_values, replication};
use crate::error::Result;
use crate::ids::EntityKind;
use crate::mapper::{self, SYSTEM_PROPERTIES};
use crate::metrics::OperationTimer;
use crate::profile::{Profile, SpecVersion};
use crate::types::{self, Search, System};

const MASKING_QUERY_CAPS: &[Capability] = &[
    Capability::AccessGroups,
    Capability::AccessGroupsGrantedToVolume,
    Capability::VolumesAccessibleByAccessGroup,
];

const MASKING_CHANGE_CAPS: &[Capability] = &[
    Capability::VolumeMask,
    Capability::VolumeUnmask,
    Capability::AccessGroupInitiatorAdd,
    Capability::AccessGroupInitiatorDelete,
];

/// Errors that mean "the provider does not implement this class".
const ABSENT: &[CimStatus] = &[CimStatus::NotSupported, CimStatus::InvalidClass];

fn any_of(values: &[u64], wanted: &[u64]) -> bool {
    wanted.iter().any(|w| values.contains(w))
}

impl<C: WbemClient> SmisPlugin<C> {
    /// Whether instances of `classname` can be enumerated in the vendor
    /// namespaces.
    pub(super) async fn class_present(&self, classname: &str) -> Result<bool> {
        for namespace in self.nav().vendor_namespaces().await? {
            match self.client.enumerate_instance_names(classname, Some(namespace)).await {
                Ok(_) => {}
                Err(e) if e.is_status(ABSENT) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    async fn configuration_capabilities(&self, system: &System, caps: &mut CapabilitySet) -> Result<()> {
        let nav = self.nav();
        let Some(scs) = nav
            .class_instance("CIM_StorageConfigurationService", "SystemName", &system.id)
            .await?
        else {
            return Ok(());
        };
        let found = nav
            .capabilities_of(&scs.path, "CIM_StorageConfigurationCapabilities")
            .await?;
        let Some(scc) = found.first() else {
            return Ok(());
        };

        if scc
            .u64_array("SupportedStorageElementTypes")
            .contains(&pool_values::ELEMENT_THICK_VOLUME)
        {
            caps.set(Capability::Volumes);
        }
        let mut actions = scc.u64_array("SupportedAsynchronousActions");
        actions.extend(scc.u64_array("SupportedSynchronousActions"));
        for (action, cap) in [
            (pool_values::ACTION_VOLUME_CREATE, Capability::VolumeCreate),
            (pool_values::ACTION_VOLUME_DELETE, Capability::VolumeDelete),
            (pool_values::ACTION_VOLUME_MODIFY, Capability::VolumeResize),
        ] {
            if actions.contains(&action) {
                caps.set(cap);
            }
        }
        Ok(())
    }

    async fn replication_capabilities(&self, system: &System, caps: &mut CapabilitySet) -> Result<()> {
        let nav = self.nav();
        if let Some(rs) = nav
            .class_instance("CIM_ReplicationService", "SystemName", &system.id)
            .await?
        {
            let found = nav
                .capabilities_of(&rs.path, "CIM_ReplicationServiceCapabilities")
                .await?;
            let types = found
                .first()
                .map(|c| c.u64_array("SupportedReplicationTypes"))
                .unwrap_or_default();
            let snapshot = any_of(&types, &[replication::SYNC_SNAPSHOT_LOCAL, replication::ASYNC_SNAPSHOT_LOCAL]);
            let clone = any_of(&types, &[replication::SYNC_CLONE_LOCAL, replication::ASYNC_CLONE_LOCAL]);
            if snapshot {
                caps.set(Capability::VolumeReplicateClone);
            }
            if clone {
                caps.set(Capability::VolumeReplicateCopy);
            }
            if snapshot || clone {
                caps.set(Capability::VolumeReplicate);
            }
            return Ok(());
        }

        // Older providers advertise copies on the configuration service
        let Some(scs) = nav
            .class_instance("CIM_StorageConfigurationService", "SystemName", &system.id)
            .await?
        else {
            return Ok(());
        };
        let found = nav
            .capabilities_of(&scs.path, "CIM_StorageConfigurationCapabilities")
            .await?;
        let copy_types = found
            .first()
            .map(|c| c.u64_array("SupportedCopyTypes"))
            .unwrap_or_default();
        if copy_types.is_empty() {
            return Ok(());
        }
        caps.set(Capability::VolumeReplicate);
        if copy_types.contains(&replication::COPY_TYPE_UNSYNC_ASSOC) {
            caps.set(Capability::VolumeReplicateClone);
        }
        if copy_types.contains(&replication::COPY_TYPE_UNSYNC_UNASSOC) {
            caps.set(Capability::VolumeReplicateCopy);
        }
        Ok(())
    }

    async fn masking_capabilities(&self, system: &System, caps: &mut CapabilitySet) -> Result<()> {
        if !self.session.fallback_mode {
            // ExposePaths and HidePaths are mandatory with a registered array
            caps.set_all(MASKING_QUERY_CAPS);
            caps.set_all(MASKING_CHANGE_CAPS);
            return Ok(());
        }

        let cim_system = self
            .nav()
            .instance_by_id(EntityKind::System, &system.id, SYSTEM_PROPERTIES)
            .await?;
        let query = AssociationQuery::new()
            .result_class("CIM_ProtocolControllerMaskingCapabilities")
            .properties(&["ExposePathsSupported"]);
        let found = match self.client.associators(&cim_system.path, &query).await {
            Ok(found) => found,
            Err(e) if e.is_status(ABSENT) => {
                debug!("No protocol controller masking capabilities");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if let [pcm] = found.as_slice() {
            caps.set_all(MASKING_QUERY_CAPS);
            if pcm.bool_prop("ExposePathsSupported") == Some(true) {
                caps.set_all(MASKING_CHANGE_CAPS);
            }
        }
        Ok(())
    }

    async fn target_port_capability(&self) -> Result<bool> {
        if self.session.fallback_mode {
            return Ok(self.class_present("CIM_FCPort").await?
                || self.class_present("CIM_iSCSIProtocolEndpoint").await?);
        }
        Ok(self.session.is_supported(Profile::FcTargetPorts, SpecVersion::SMIS_1_4)
            || self.session.is_supported(Profile::IscsiTargetPorts, SpecVersion::SMIS_1_4))
    }

    async fn system_capabilities(&self, system: &System) -> Result<CapabilitySet> {
        let mut caps = CapabilitySet::new();
        caps.set(Capability::BlockSupport);
        self.configuration_capabilities(system, &mut caps).await?;
        self.replication_capabilities(system, &mut caps).await?;
        self.masking_capabilities(system, &mut caps).await?;
        if self.target_port_capability().await? {
            caps.set(Capability::TargetPorts);
        }

        let fallback = self.session.fallback_mode;
        if fallback || self.session.is_supported(Profile::DiskDriveLite, SpecVersion::SMIS_1_4) {
            caps.set(Capability::Disks);
        }
        if fallback || self.session.is_supported(Profile::BlockServices, SpecVersion::SMIS_1_4) {
            caps.set_all(&[Capability::PoolCreate, Capability::PoolDelete]);
        }
        Ok(caps)
    }

    /// Storage systems reachable through this session.
    #[instrument(skip(self))]
    pub async fn systems(&self, search: Option<&Search>) -> Result<Vec<System>> {
        let timer = OperationTimer::new("systems");
        let systems = async {
            let mut out = Vec::new();
            for system in self.nav().root_systems().await? {
                out.push(mapper::map_system(&system)?);
            }
            types::filter(out, search)
        }
        .await;
        timer.finish(systems)
    }

    /// What the adapter can do on `system`.
    #[instrument(skip(self, system), fields(system = %system.id))]
    pub async fn capabilities(&self, system: &System) -> Result<CapabilitySet> {
        let timer = OperationTimer::new("capabilities");
        timer.finish(self.system_capabilities(system).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::RegisteredProfiles;
    use crate::session::SessionContext;
    use cim_core::{CimInstance, CimInstanceName, CimValue, WbemError};
    use cim_mock::{FailOn, MockWbem};

    const NS: &str = "root/acme";

    fn array() -> MockWbem {
        let mock = MockWbem::with_default_namespace(NS);
        let sys = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_ComputerSystem").with_key("Name", "ARRAY-A"))
                .with("Name", "ARRAY-A")
                .with("ElementName", "array")
                .with("OperationalStatus", CimValue::from(vec![2u16])),
        );
        let scs = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_StorageConfigurationService").with_key("Name", "SCS"))
                .with("SystemName", "ARRAY-A"),
        );
        mock.associate("CIM_HostedService", ("Antecedent", &sys), ("Dependent", &scs));
        let scc = mock.add_instance(
            CimInstance::new(
                CimInstanceName::new("ACME_StorageConfigurationCapabilities").with_key("InstanceID", "SCC"),
            )
            .with("SupportedStorageElementTypes", CimValue::from(vec![2u16]))
            .with("SupportedAsynchronousActions", CimValue::from(vec![5u16, 6]))
            .with("SupportedSynchronousActions", CimValue::from(vec![7u16]))
            .with("SupportedCopyTypes", CimValue::from(vec![4u16])),
        );
        mock.associate("CIM_ElementCapabilities", ("ManagedElement", &scs), ("Capabilities", &scc));
        mock
    }

    fn system() -> System {
        System {
            id: "ARRAY-A".into(),
            name: "array".into(),
            status: crate::types::SystemStatus::OK,
            status_info: String::new(),
        }
    }

    fn fallback(mock: MockWbem) -> SmisPlugin<MockWbem> {
        let session = SessionContext::new(true, RegisteredProfiles::default(), None)
            .with_vendor_namespaces(vec![NS.to_string()]);
        SmisPlugin::with_session(mock, session)
    }

    #[tokio::test]
    async fn test_systems() {
        let plugin = fallback(array());
        let systems = plugin.systems(None).await.unwrap();
        assert_eq!(systems, vec![system()]);

        let none = plugin
            .systems(Some(&Search::new(types::SearchKey::Id, "OTHER")))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_capabilities_from_classes() {
        let mock = array();
        let sys = CimInstanceName::new("ACME_ComputerSystem")
            .with_namespace(NS)
            .with_key("Name", "ARRAY-A");
        let pcm = mock.add_instance(
            CimInstance::new(
                CimInstanceName::new("ACME_ProtocolControllerMaskingCapabilities").with_key("InstanceID", "PCM"),
            )
            .with("ExposePathsSupported", false),
        );
        mock.associate("CIM_ElementCapabilities", ("ManagedElement", &sys), ("Capabilities", &pcm));
        mock.fail(
            FailOn::Class("CIM_FCPort".into()),
            WbemError::cim(CimStatus::InvalidClass, "CIM_FCPort"),
        );
        let plugin = fallback(mock);

        let caps = plugin.capabilities(&system()).await.unwrap();
        for cap in [
            Capability::BlockSupport,
            Capability::Volumes,
            Capability::VolumeCreate,
            Capability::VolumeDelete,
            Capability::VolumeResize,
            Capability::VolumeReplicate,
            Capability::VolumeReplicateClone,
            Capability::AccessGroups,
            Capability::TargetPorts,
            Capability::Disks,
            Capability::PoolCreate,
        ] {
            assert!(caps.has(cap), "missing {}", cap);
        }
        assert!(!caps.has(Capability::VolumeReplicateCopy));
        assert!(!caps.has(Capability::VolumeMask));
    }

    #[tokio::test]
    async fn test_profile_mode_capabilities() {
        let mock = array();
        let rs = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_ReplicationService").with_key("Name", "RS"))
                .with("SystemName", "ARRAY-A"),
        );
        let rsc = mock.add_instance(
            CimInstance::new(
                CimInstanceName::new("ACME_ReplicationServiceCapabilities").with_key("InstanceID", "RSC"),
            )
            .with("SupportedReplicationTypes", CimValue::from(vec![11u16])),
        );
        mock.associate("CIM_ElementCapabilities", ("ManagedElement", &rs), ("Capabilities", &rsc));

        let profiles: Vec<CimInstance> = [("Array", "1.5"), ("Masking and Mapping", "1.4"), ("FC Target Port", "1.4")]
            .iter()
            .map(|(name, version)| {
                CimInstance::new(CimInstanceName::new("CIM_RegisteredProfile").with_key("InstanceID", *name))
                    .with("RegisteredName", *name)
                    .with("RegisteredVersion", *version)
                    .with("RegisteredOrganization", 11u16)
            })
            .collect();
        let session = SessionContext::new(false, RegisteredProfiles::from_instances(&profiles), None)
            .with_vendor_namespaces(vec![NS.to_string()]);
        let plugin = SmisPlugin::with_session(mock, session);

        let caps = plugin.capabilities(&system()).await.unwrap();
        assert!(caps.has(Capability::VolumeMask));
        assert!(caps.has(Capability::AccessGroupInitiatorAdd));
        assert!(caps.has(Capability::TargetPorts));
        assert!(caps.has(Capability::VolumeReplicateCopy));
        assert!(!caps.has(Capability::VolumeReplicateClone));
        assert!(!caps.has(Capability::Disks));
        assert!(!caps.has(Capability::PoolCreate));
    }
}
