//! Pool create and delete through `CIM_StorageConfigurationService`.

use cim_core::{AssociationQuery, CimInstance, CimInstanceName, CimValue, MethodParams, WbemClient};
use tracing::{debug, info, instrument};

use super::SmisPlugin;
use crate::dmtf::pool as pool_values;
use crate::error::{Result, SmisError};
use crate::ids::EntityKind;
use crate::job::{Completion, JobResult, RetrieveKind};
use crate::mapper::SYSTEM_PROPERTIES;
use crate::metrics::OperationTimer;
use crate::profile::{Profile, SpecVersion};
use crate::quirks::{self, Quirk};
use crate::types::{DiskType, MemberType, Pool, PoolCreateRequest, RaidType};

const SETTING_PROPERTIES: &[&str] = &["ElementName", "ThinProvisionedPoolType"];

/// Reject member layouts pool creation cannot express.
fn check_member_type(request: &PoolCreateRequest) -> Result<()> {
    match request.member_type {
        MemberType::Disk => match request.disk_type {
            Some(disk_type) if disk_type != DiskType::Unknown => Err(SmisError::NoSupport(
                "Pool creation does not support defining disk type in member type".to_string(),
            )),
            _ => Ok(()),
        },
        MemberType::Pool => Err(SmisError::NoSupport(
            "Pool creation does not support creating pool over pool".to_string(),
        )),
        MemberType::Unknown => Ok(()),
        MemberType::Volume => Err(SmisError::InvalidArgument(
            "Got invalid member type VOLUME".to_string(),
        )),
    }
}

/// Setting among `settings` whose name matches `raid_type`, thin preferred.
fn pick_setting(settings: Vec<CimInstance>, raid_type: RaidType) -> Option<CimInstance> {
    let names = raid_type.setting_names();
    let mut matching: Vec<CimInstance> = settings
        .into_iter()
        .filter(|s| s.str_prop("ElementName").is_some_and(|n| names.contains(&n)))
        .collect();
    let thin = matching
        .iter()
        .position(|s| s.u64_prop("ThinProvisionedPoolType") == Some(pool_values::THINP_POOL_TYPE_ALLOCATED));
    match thin {
        Some(index) => Some(matching.swap_remove(index)),
        None if matching.is_empty() => None,
        None => Some(matching.swap_remove(0)),
    }
}

/// Check the parameters of `CreateOrModifyStoragePool` against the
/// configuration service's `SupportedStoragePoolFeatures`.
fn check_pool_features(params: &MethodParams, features: &[u64]) -> Result<()> {
    if params.contains_key("InExtents") && !features.contains(&pool_values::POOL_FEATURE_IN_EXTENTS) {
        return Err(SmisError::NoSupport(
            "Current array does not support creating Pool from Volume or Disk".to_string(),
        ));
    }
    if let Some(in_pools) = params.get("InPools") {
        let single = features.contains(&pool_values::POOL_FEATURE_SINGLE_IN_POOL);
        let multi = features.contains(&pool_values::POOL_FEATURE_MULTI_IN_POOL);
        if !single && !multi {
            return Err(SmisError::NoSupport(
                "Current array does not support creating Pool from Pool".to_string(),
            ));
        }
        if single && in_pools.as_array().is_some_and(|p| p.len() > 1) {
            return Err(SmisError::NoSupport(
                "Current array does not support creating Pool from multiple pools".to_string(),
            ));
        }
    }
    Ok(())
}

impl<C: WbemClient> SmisPlugin<C> {
    /// Pre-defined `CIM_StorageSetting` under the primordial pool of `system`
    /// describing `raid_type`.
    async fn goal_for(&self, raid_type: RaidType, system: &CimInstanceName) -> Result<CimInstanceName> {
        if raid_type.setting_names().is_empty() {
            return Err(SmisError::InvalidArgument(format!("Got unknown RAID type: {}", raid_type)));
        }

        let pools = self
            .client
            .associators(
                system,
                &AssociationQuery::new()
                    .result_class("CIM_StoragePool")
                    .properties(&["Primordial"]),
            )
            .await?;
        let primordial = pools
            .into_iter()
            .find(|p| p.bool_prop("Primordial") == Some(true))
            .ok_or_else(|| {
                SmisError::NoSupport("Target storage array does not have any Primordial CIM_StoragePool".to_string())
            })?;

        let capabilities = self
            .client
            .associators(
                &primordial.path,
                &AssociationQuery::new()
                    .result_class("CIM_StorageCapabilities")
                    .properties(&["ElementType"]),
            )
            .await?;
        let settings_query = AssociationQuery::new()
            .assoc_class("CIM_StorageSettingsAssociatedToCapabilities")
            .result_class("CIM_StorageSetting")
            .properties(SETTING_PROPERTIES);
        for caps in capabilities {
            let settings = self.client.associators(&caps.path, &settings_query).await?;
            if let Some(setting) = pick_setting(settings, raid_type) {
                debug!(setting = %setting.path, "Using storage setting as pool goal");
                return Ok(setting.path);
            }
        }
        Err(SmisError::NoSupport(format!(
            "Current array does not support RAID type: {}",
            raid_type
        )))
    }

    /// Pool features supported by the single configuration service of
    /// `system`. Anything else means nothing can be checked.
    async fn pool_features(&self, system: &CimInstanceName) -> Result<Option<Vec<u64>>> {
        let nav = self.nav();
        let services = nav
            .hosted_services(system, "CIM_StorageConfigurationService")
            .await?;
        let [service] = services.as_slice() else {
            return Ok(None);
        };
        let capabilities = nav
            .capabilities_of(service, "CIM_StorageConfigurationCapabilities")
            .await?;
        match capabilities.as_slice() {
            [caps] => Ok(Some(caps.u64_array("SupportedStoragePoolFeatures"))),
            _ => Ok(None),
        }
    }

    /// Vendor adjustments to the creation parameters.
    async fn adjust_for_vendor(&self, params: &mut MethodParams, system: &CimInstance) -> Result<()> {
        if !quirks::has_quirk(system.classname(), Quirk::ThickGoalWithoutName) {
            return Ok(());
        }
        if params.contains_key("Pool") && params.contains_key("Goal") {
            return Err(SmisError::NoSupport(
                "Changing the RAID type of an existing pool is not allowed on this array".to_string(),
            ));
        }
        let goal = match params.get("Goal") {
            Some(CimValue::Reference(goal)) if params.contains_key("ElementName") => goal.clone(),
            _ => return Ok(()),
        };
        let setting = self
            .client
            .get_instance(&goal, Some(&["ThinProvisionedPoolType"]))
            .await?;
        if setting.u64_prop("ThinProvisionedPoolType") == Some(pool_values::EMC_THINP_POOL_TYPE_THICK) {
            debug!("Thick pool goal, dropping ElementName");
            params.remove("ElementName");
        }
        Ok(())
    }

    async fn create_pool(&self, request: &PoolCreateRequest) -> Result<Completion<Option<Pool>>> {
        self.session.require(Profile::BlockServices, SpecVersion::SMIS_1_4)?;
        let system = self
            .nav()
            .instance_by_id(EntityKind::System, &request.system_id, SYSTEM_PROPERTIES)
            .await?;
        check_member_type(request)?;

        let mut params = MethodParams::new();
        if let Some(name) = request.name.as_deref().filter(|n| !n.is_empty()) {
            params.insert("ElementName".into(), name.into());
        }
        params.insert("Size".into(), request.size_bytes.into());
        if request.raid_type != RaidType::Unknown {
            let goal = self.goal_for(request.raid_type, &system.path).await?;
            params.insert("Goal".into(), goal.into());
        }

        let scs = self
            .nav()
            .require_class_instance("CIM_StorageConfigurationService", "SystemName", &request.system_id)
            .await?;
        if let Some(features) = self.pool_features(&system.path).await? {
            check_pool_features(&params, &features)?;
        }
        self.adjust_for_vendor(&mut params, &system).await?;

        let completion = self
            .invoke("CreateOrModifyStoragePool", &scs.path, params, RetrieveKind::Pool)
            .await?;
        Ok(completion.map(|r| r.and_then(JobResult::into_pool)))
    }

    async fn delete_pool(&self, pool: &Pool) -> Result<Completion<()>> {
        self.session.require(Profile::BlockServices, SpecVersion::SMIS_1_4)?;
        let nav = self.nav();
        let cim_pool = nav.instance_by_id(EntityKind::Pool, &pool.id, &[]).await?;
        let scs = nav
            .require_class_instance("CIM_StorageConfigurationService", "SystemName", &pool.system_id)
            .await?;

        let mut params = MethodParams::new();
        params.insert("Pool".into(), cim_pool.path.into());
        let completion = self
            .invoke("DeleteStoragePool", &scs.path, params, RetrieveKind::None)
            .await?;
        Ok(completion.map(|_| ()))
    }

    /// Create a pool on `request.system_id`.
    ///
    /// A RAID type other than UNKNOWN is turned into a goal setting; with
    /// UNKNOWN the provider picks the layout and the member disks.
    #[instrument(skip(self, request), fields(system = %request.system_id))]
    pub async fn pool_create(&self, request: &PoolCreateRequest) -> Result<Completion<Option<Pool>>> {
        let timer = OperationTimer::new("pool_create");
        info!(
            "Creating pool {:?} of {} bytes ({})",
            request.name, request.size_bytes, request.raid_type
        );
        timer.finish(self.create_pool(request).await)
    }

    #[instrument(skip(self, pool), fields(pool = %pool.id))]
    pub async fn pool_delete(&self, pool: &Pool) -> Result<Completion<()>> {
        let timer = OperationTimer::new("pool_delete");
        info!("Deleting pool {}", pool.name);
        timer.finish(self.delete_pool(pool).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper;
    use crate::profile::RegisteredProfiles;
    use crate::session::SessionContext;
    use crate::types::ElementType;
    use cim_core::MethodResult;
    use cim_mock::MockWbem;

    const NS: &str = "root/acme";

    fn setting(id: &str, name: &str, thinp: u16) -> CimInstance {
        CimInstance::new(CimInstanceName::new("ACME_StorageSetting").with_key("InstanceID", id))
            .with("ElementName", name)
            .with("ThinProvisionedPoolType", thinp)
    }

    /// One system with a primordial pool offering RAID5 thick and thin goals
    /// plus a RAID1 goal.
    fn array(system_class: &str, settings: Vec<CimInstance>) -> (MockWbem, Vec<CimInstanceName>) {
        let mock = MockWbem::with_default_namespace(NS);
        mock.define_class(system_class, "CIM_ComputerSystem");
        let sys = mock.add_instance(
            CimInstance::new(CimInstanceName::new(system_class).with_key("Name", "ARRAY-A"))
                .with("Name", "ARRAY-A")
                .with("ElementName", "array"),
        );
        let scs = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_StorageConfigurationService").with_key("Name", "SCS"))
                .with("SystemName", "ARRAY-A"),
        );
        mock.associate("CIM_HostedService", ("Antecedent", &sys), ("Dependent", &scs));
        let sccaps = mock.add_instance(
            CimInstance::new(
                CimInstanceName::new("ACME_StorageConfigurationCapabilities").with_key("InstanceID", "SCC"),
            )
            .with("SupportedStoragePoolFeatures", CimValue::from(vec![2u16])),
        );
        mock.associate("CIM_ElementCapabilities", ("ManagedElement", &scs), ("Capabilities", &sccaps));

        let primordial = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_StoragePool").with_key("InstanceID", "PRIMORDIAL"))
                .with("InstanceID", "PRIMORDIAL")
                .with("Primordial", true),
        );
        mock.associate("CIM_HostedStoragePool", ("GroupComponent", &sys), ("PartComponent", &primordial));
        let caps = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_StorageCapabilities").with_key("InstanceID", "CAPS"))
                .with("ElementType", 2u16),
        );
        mock.associate("CIM_ElementCapabilities", ("ManagedElement", &primordial), ("Capabilities", &caps));

        let mut paths = Vec::new();
        for s in settings {
            let path = mock.add_instance(s);
            mock.associate(
                "CIM_StorageSettingsAssociatedToCapabilities",
                ("Antecedent", &caps),
                ("Dependent", &path),
            );
            paths.push(path);
        }
        (mock, paths)
    }

    fn plugin(mock: MockWbem) -> SmisPlugin<MockWbem> {
        let session = SessionContext::new(true, RegisteredProfiles::default(), None)
            .with_vendor_namespaces(vec![NS.to_string()]);
        SmisPlugin::with_session(mock, session)
    }

    fn request(raid_type: RaidType) -> PoolCreateRequest {
        PoolCreateRequest {
            system_id: "ARRAY-A".into(),
            name: Some("pool-new".into()),
            size_bytes: 1 << 30,
            raid_type,
            member_type: MemberType::Unknown,
            disk_type: None,
        }
    }

    #[test]
    fn test_member_type_rules() {
        let mut req = request(RaidType::Unknown);
        req.member_type = MemberType::Disk;
        assert!(check_member_type(&req).is_ok());
        req.disk_type = Some(DiskType::Ssd);
        assert!(matches!(check_member_type(&req), Err(SmisError::NoSupport(_))));
        req.member_type = MemberType::Pool;
        assert!(matches!(check_member_type(&req), Err(SmisError::NoSupport(_))));
        req.member_type = MemberType::Volume;
        assert!(matches!(check_member_type(&req), Err(SmisError::InvalidArgument(_))));
    }

    #[test]
    fn test_pool_feature_check() {
        let mut params = MethodParams::new();
        params.insert(
            "InPools".into(),
            CimValue::Array(vec![CimValue::from("P1"), CimValue::from("P2")]),
        );
        assert!(check_pool_features(&params, &[4]).is_ok());
        assert!(check_pool_features(&params, &[3]).is_err());
        assert!(check_pool_features(&params, &[2]).is_err());
    }

    #[tokio::test]
    async fn test_create_prefers_thin_goal() {
        let (mock, settings) = array(
            "ACME_ComputerSystem",
            vec![
                setting("S-R5-THICK", "RAID5", 8),
                setting("S-R5-THIN", "RAID5", 7),
                setting("S-R1", "RAID1", 8),
            ],
        );
        let new_pool = mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_StoragePool").with_key("InstanceID", "POOL-NEW"))
                .with("InstanceID", "POOL-NEW")
                .with("ElementName", "pool-new")
                .with("Usage", 2u16),
        );
        let sys = CimInstanceName::new("ACME_ComputerSystem")
            .with_namespace(NS)
            .with_key("Name", "ARRAY-A");
        mock.associate("CIM_HostedStoragePool", ("GroupComponent", &sys), ("PartComponent", &new_pool));
        mock.expect_method(
            "CreateOrModifyStoragePool",
            Ok(MethodResult::new(0).with_out("Pool", new_pool.clone())),
        );
        let plugin = plugin(mock);

        let completion = plugin.pool_create(&request(RaidType::Raid5)).await.unwrap();
        let Completion::Done(Some(pool)) = completion else {
            panic!("expected a finished pool creation");
        };
        assert_eq!(pool.id, "POOL-NEW");
        assert_eq!(pool.system_id, "ARRAY-A");
        assert_eq!(pool.element_type, ElementType::VOLUME);

        let params = &plugin.client.method_params("CreateOrModifyStoragePool")[0];
        assert_eq!(params.get("Goal"), Some(&CimValue::Reference(settings[1].clone())));
        assert_eq!(params.get("ElementName"), Some(&CimValue::from("pool-new")));
    }

    #[tokio::test]
    async fn test_create_with_unsupported_raid() {
        let (mock, _) = array("ACME_ComputerSystem", vec![setting("S-R1", "RAID1", 8)]);
        let plugin = plugin(mock);

        let err = plugin.pool_create(&request(RaidType::Raid60)).await.unwrap_err();
        assert!(matches!(err, SmisError::NoSupport(ref m) if m.contains("RAID type")));
        let err = plugin.pool_create(&request(RaidType::Mixed)).await.unwrap_err();
        assert!(matches!(err, SmisError::InvalidArgument(_)));
        assert!(plugin.client.invoked_methods().is_empty());
    }

    #[tokio::test]
    async fn test_clariion_thick_goal_drops_name() {
        let (mock, _) = array("Clar_StorageSystem", vec![setting("S-R5", "RAID5", 0)]);
        mock.expect_method(
            "CreateOrModifyStoragePool",
            Ok(MethodResult::new(4096).with_out(
                "Job",
                CimInstanceName::new("ACME_ConcreteJob").with_key("InstanceID", "JOB-9"),
            )),
        );
        let plugin = plugin(mock);

        let completion = plugin.pool_create(&request(RaidType::Raid5)).await.unwrap();
        assert_eq!(completion.job().map(|t| t.retrieve), Some(RetrieveKind::Pool));
        let params = &plugin.client.method_params("CreateOrModifyStoragePool")[0];
        assert!(!params.contains_key("ElementName"));
        assert!(params.contains_key("Goal"));
    }

    #[tokio::test]
    async fn test_delete_requires_block_services() {
        let (mock, _) = array("ACME_ComputerSystem", Vec::new());
        let pool_inst = CimInstance::new(CimInstanceName::new("ACME_StoragePool").with_key("InstanceID", "POOL-1"))
            .with("InstanceID", "POOL-1");
        mock.add_instance(pool_inst.clone());
        let pool = mapper::map_pool(&pool_inst, "ARRAY-A", ElementType::VOLUME).unwrap();

        let session = SessionContext::new(false, RegisteredProfiles::default(), None)
            .with_vendor_namespaces(vec![NS.to_string()]);
        let strict = SmisPlugin::with_session(mock, session);
        let err = strict.pool_delete(&pool).await.unwrap_err();
        assert!(matches!(err, SmisError::NoSupport(ref m) if m.contains("Block Services")));

        let relaxed = plugin(strict.client);
        relaxed
            .client
            .expect_method("DeleteStoragePool", Ok(MethodResult::new(0)));
        assert_eq!(relaxed.pool_delete(&pool).await.unwrap(), Completion::Done(()));
        let params = &relaxed.client.method_params("DeleteStoragePool")[0];
        assert!(matches!(params.get("Pool"), Some(CimValue::Reference(_))));
    }
}
