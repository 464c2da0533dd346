//! Masking and mapping: access groups, initiators and the volumes they see.

use cim_core::{AssociationQuery, CimInstance, CimInstanceName, CimStatus, WbemClient};
use tracing::debug;

use super::Navigator;
use crate::error::{Result, SmisError};
use crate::mapper::{ACCESS_GROUP_PROPERTIES, INITIATOR_PROPERTIES, VOLUME_PROPERTIES};
use crate::profile::{Profile, SpecVersion};
use crate::quirks;

const NO_ACCESS_GROUPS: &str = "AccessGroup is not supported by this array";

impl<'a, C: WbemClient> Navigator<'a, C> {
    /// Masking views (`CIM_SCSIProtocolController`) of `system`.
    pub async fn access_groups_of(&self, system: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_HostedService")
            .result_class("CIM_ControllerConfigurationService");
        let mut services = match self.client.associator_names(system, &query).await {
            Ok(services) => services,
            Err(e) if e.is_status(&[CimStatus::InvalidClass, CimStatus::InvalidParameter]) => {
                return Err(SmisError::NoSupport(NO_ACCESS_GROUPS.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let ccs = match services.len() {
            1 => services.remove(0),
            0 => return Err(SmisError::NoSupport(NO_ACCESS_GROUPS.to_string())),
            n => {
                return Err(SmisError::InternalBug(format!(
                    "Got {} instances of ControllerConfigurationService from {}",
                    n, system
                )));
            }
        };

        let query = AssociationQuery::new()
            .assoc_class("CIM_ConcreteDependency")
            .result_class("CIM_SCSIProtocolController")
            .properties(ACCESS_GROUP_PROPERTIES);
        let controllers = self.client.associators(&ccs, &query).await?;
        Ok(controllers
            .into_iter()
            .filter(quirks::is_masking_controller)
            .collect())
    }

    /// Hardware ids (initiators) granted access through `access_group`.
    pub async fn initiators_of(&self, access_group: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let direct = !self.session.fallback_mode
            && self
                .session
                .is_supported(Profile::MaskingMapping, SpecVersion::SMIS_1_6);
        if direct {
            let query = AssociationQuery::new()
                .assoc_class("CIM_AssociatedPrivilege")
                .result_class("CIM_StorageHardwareID")
                .properties(INITIATOR_PROPERTIES);
            return Ok(self.client.associators(access_group, &query).await?);
        }

        let privileges = self
            .client
            .associator_names(
                access_group,
                &AssociationQuery::new()
                    .assoc_class("CIM_AuthorizedTarget")
                    .result_class("CIM_AuthorizedPrivilege"),
            )
            .await?;
        let query = AssociationQuery::new()
            .assoc_class("CIM_AuthorizedSubject")
            .result_class("CIM_StorageHardwareID")
            .properties(INITIATOR_PROPERTIES);
        let mut initiators = Vec::new();
        for privilege in privileges {
            initiators.extend(self.client.associators(&privilege, &query).await?);
        }
        Ok(initiators)
    }

    /// Volumes exposed through `access_group`.
    pub async fn volumes_masked_to(&self, access_group: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_ProtocolControllerForUnit")
            .result_class("CIM_StorageVolume")
            .properties(VOLUME_PROPERTIES);
        Ok(self.client.associators(access_group, &query).await?)
    }

    /// Masking views exposing `volume`.
    pub async fn access_groups_masked_to(&self, volume: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_ProtocolControllerForUnit")
            .result_class("CIM_SCSIProtocolController")
            .properties(ACCESS_GROUP_PROPERTIES);
        let controllers = self.client.associators(volume, &query).await?;
        Ok(controllers
            .into_iter()
            .filter(quirks::is_masking_controller)
            .collect())
    }

    /// The hardware id management service of `system`, used to register new
    /// initiators.
    pub async fn hardware_id_management_service(
        &self,
        system: &CimInstanceName,
    ) -> Result<CimInstanceName> {
        let mut services = self
            .hosted_services(system, "CIM_StorageHardwareIDManagementService")
            .await?;
        match services.len() {
            1 => Ok(services.remove(0)),
            0 => Err(SmisError::NoSupport(
                "Target SMI-S provider does not support access_group_initiator_add(): \
                 No CIM_StorageHardwareIDManagementService to create new initiator"
                    .to_string(),
            )),
            _ => Err(SmisError::InternalBug(
                "Got more than one CIM_StorageHardwareIDManagementService".to_string(),
            )),
        }
    }

    /// `CIM_StorageSynchronized` relationships referring to `volume`. A
    /// provider without the class has none.
    pub async fn sync_relationships_of(&self, volume: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new().result_class("CIM_StorageSynchronized");
        match self.client.references(volume, &query).await {
            Ok(relationships) => Ok(relationships),
            Err(e) if e.is_status(&[CimStatus::InvalidClass]) => {
                debug!("CIM_StorageSynchronized not implemented");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::RegisteredProfiles;
    use crate::session::SessionContext;
    use cim_core::WbemError;
    use cim_mock::{FailOn, MockWbem};

    fn spc(id: &str) -> CimInstance {
        CimInstance::new(CimInstanceName::new("ACME_SCSIProtocolController").with_key("DeviceID", id))
            .with("DeviceID", id)
            .with("ElementName", id)
    }

    fn hardware_id(id: &str) -> CimInstance {
        CimInstance::new(CimInstanceName::new("ACME_StorageHardwareID").with_key("InstanceID", id))
            .with("StorageID", id)
            .with("IDType", 2u16)
    }

    fn profiles(masking_version: &str) -> RegisteredProfiles {
        let instance = CimInstance::new(CimInstanceName::new("CIM_RegisteredProfile").with_key("InstanceID", "M"))
            .with("RegisteredName", "Masking and Mapping")
            .with("RegisteredVersion", masking_version)
            .with("RegisteredOrganization", 11u16);
        RegisteredProfiles::from_instances(&[instance])
    }

    #[tokio::test]
    async fn test_initiators_through_privileges() {
        let mock = MockWbem::new();
        let ag = mock.add_instance(spc("AG-1"));
        let privilege = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_AuthorizedPrivilege").with_key("InstanceID", "PRIV-1")),
        );
        let init = mock.add_instance(hardware_id("500a0981891b8dc5"));
        mock.associate("CIM_AuthorizedTarget", ("TargetElement", &ag), ("Privilege", &privilege));
        mock.associate("CIM_AuthorizedSubject", ("Privilege", &privilege), ("PrivilegedElement", &init));

        let session = SessionContext::new(false, profiles("1.4.0"), None);
        let found = Navigator::new(&mock, &session).initiators_of(&ag).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].str_prop("StorageID"), Some("500a0981891b8dc5"));
    }

    #[tokio::test]
    async fn test_initiators_direct_with_masking_1_6() {
        let mock = MockWbem::new();
        let ag = mock.add_instance(spc("AG-2"));
        let init = mock.add_instance(hardware_id("iqn.1994-05.com.redhat:host"));
        mock.associate("CIM_AssociatedPrivilege", ("UserOfService", &init), ("ServiceProvider", &ag));

        let session = SessionContext::new(false, profiles("1.6.0"), None);
        let found = Navigator::new(&mock, &session).initiators_of(&ag).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(mock.calls().iter().all(|c| !matches!(
            c,
            cim_mock::Call::AssociatorNames { .. }
        )));
    }

    #[tokio::test]
    async fn test_access_groups_need_one_configuration_service() {
        let mock = MockWbem::new();
        let sys = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_ComputerSystem").with_key("Name", "S")).with("Name", "S"),
        );
        let session = SessionContext::default();
        let nav = Navigator::new(&mock, &session);
        assert!(matches!(
            nav.access_groups_of(&sys).await,
            Err(SmisError::NoSupport(ref m)) if m == NO_ACCESS_GROUPS
        ));

        let ccs = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_ControllerConfigurationService").with_key("Name", "CCS")),
        );
        mock.associate("CIM_HostedService", ("Antecedent", &sys), ("Dependent", &ccs));
        let ag = mock.add_instance(spc("AG-3"));
        let mapping_only = mock.add_instance(spc("AG-4").with("EMCAdapterRole", "FA_PORT"));
        mock.associate("CIM_ConcreteDependency", ("Antecedent", &ccs), ("Dependent", &ag));
        mock.associate("CIM_ConcreteDependency", ("Antecedent", &ccs), ("Dependent", &mapping_only));

        let groups = nav.access_groups_of(&sys).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].str_prop("DeviceID"), Some("AG-3"));
    }

    #[tokio::test]
    async fn test_missing_sync_class_means_no_relationships() {
        let mock = MockWbem::new();
        let vol = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_StorageVolume").with_key("DeviceID", "V")),
        );
        mock.fail(
            FailOn::Association("CIM_StorageSynchronized".into()),
            WbemError::cim(CimStatus::InvalidClass, "CIM_StorageSynchronized"),
        );
        let session = SessionContext::default();
        let found = Navigator::new(&mock, &session).sync_relationships_of(&vol).await.unwrap();
        assert!(found.is_empty());
    }
}
