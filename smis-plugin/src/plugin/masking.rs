//! Access groups, initiators and LUN masking.

use cim_core::{CimInstance, CimValue, MethodParams, WbemClient};
use tracing::{debug, info, instrument};

use super::SmisPlugin;
use crate::dmtf::masking as masking_values;
use crate::error::{Result, SmisError};
use crate::ids::{self, EntityKind};
use crate::job::{Completion, RetrieveKind};
use crate::mapper::{self, ACCESS_GROUP_PROPERTIES, SYSTEM_PROPERTIES};
use crate::metrics::OperationTimer;
use crate::profile::{Profile, SpecVersion};
use crate::types::{self, AccessGroup, Initiator, InitiatorType, Search, Volume};

const CONTROLLER_CONFIGURATION_SERVICE: &str = "CIM_ControllerConfigurationService";

impl<C: WbemClient> SmisPlugin<C> {
    async fn controller_service(&self, system_id: &str) -> Result<CimInstance> {
        self.nav()
            .require_class_instance(CONTROLLER_CONFIGURATION_SERVICE, "SystemName", system_id)
            .await
    }

    async fn initiators_in(&self, view: &CimInstance) -> Result<Vec<Initiator>> {
        self.nav()
            .initiators_of(&view.path)
            .await?
            .iter()
            .map(mapper::map_initiator)
            .collect()
    }

    /// Map a masking view. Without `system_id` the owner comes from the
    /// view's `SystemName`.
    async fn access_group_of(&self, view: &CimInstance, system_id: Option<&str>) -> Result<AccessGroup> {
        let initiators = self.initiators_in(view).await?;
        let system_id = match system_id {
            Some(id) => id.to_string(),
            None => ids::id_of(&self.client, EntityKind::SystemChild, view).await?,
        };
        mapper::map_access_group(view, &initiators, &system_id)
    }

    /// Masking views of every root system, with the owning system id.
    async fn masking_views(&self) -> Result<Vec<(CimInstance, String)>> {
        self.session.require(Profile::MaskingMapping, SpecVersion::SMIS_1_4)?;
        let nav = self.nav();
        let mut out = Vec::new();
        for system in nav.root_systems().await? {
            let system_id = ids::id_of(&self.client, EntityKind::System, &system).await?;
            for view in nav.access_groups_of(&system.path).await? {
                out.push((view, system_id.clone()));
            }
        }
        Ok(out)
    }

    async fn list_access_groups(&self) -> Result<Vec<AccessGroup>> {
        let mut out = Vec::new();
        for (view, system_id) in self.masking_views().await? {
            out.push(self.access_group_of(&view, Some(&system_id)).await?);
        }
        Ok(out)
    }

    async fn list_initiators(&self) -> Result<Vec<Initiator>> {
        let mut out: Vec<Initiator> = Vec::new();
        for (view, _) in self.masking_views().await? {
            for initiator in self.initiators_in(&view).await? {
                if !out.iter().any(|i| i.id == initiator.id) {
                    out.push(initiator);
                }
            }
        }
        Ok(out)
    }

    async fn mask(&self, access_group: &AccessGroup, volume: &Volume, expose: bool) -> Result<Completion<()>> {
        let nav = self.nav();
        let ccs = self.controller_service(&access_group.system_id).await?;
        let lun = nav.instance_by_id(EntityKind::Volume, &volume.id, &["Name"]).await?;
        let view = nav
            .instance_by_id(EntityKind::AccessGroup, &access_group.id, ACCESS_GROUP_PROPERTIES)
            .await?;
        let lu_name = lun
            .str_prop("Name")
            .ok_or_else(|| SmisError::InternalBug(format!("Volume {} has no Name", lun.path)))?;

        let mut params = MethodParams::new();
        params.insert("LUNames".into(), vec![lu_name].into());
        params.insert("ProtocolControllers".into(), vec![view.path].into());
        let method = if expose {
            params.insert(
                "DeviceAccesses".into(),
                CimValue::Array(vec![CimValue::Uint(masking_values::DEVICE_ACCESS_READ_WRITE)]),
            );
            "ExposePaths"
        } else {
            "HidePaths"
        };
        let completion = self.invoke(method, &ccs.path, params, RetrieveKind::None).await?;
        Ok(completion.map(|_| ()))
    }

    /// Register `init_id` with the array through the hardware id management
    /// service of `system_id`.
    async fn create_initiator(&self, system_id: &str, init_id: &str, init_type: InitiatorType) -> Result<()> {
        let id_type = mapper::id_type_of_initiator_type(init_type).ok_or_else(|| {
            SmisError::NoSupport(format!("Initiator type {:?} is not supported", init_type))
        })?;
        let nav = self.nav();
        let system = nav.instance_by_id(EntityKind::System, system_id, SYSTEM_PROPERTIES).await?;
        let service = nav.hardware_id_management_service(&system.path).await?;

        let mut params = MethodParams::new();
        params.insert("StorageID".into(), init_id.into());
        params.insert("IDType".into(), CimValue::Uint(id_type));
        let result = self
            .client
            .invoke_method("CreateStorageHardwareID", &service, params)
            .await?;
        if result.return_value != 0 {
            return Err(SmisError::InternalBug(format!(
                "CreateStorageHardwareID failed: rc={}, out={:?}",
                result.return_value, result.out_params
            )));
        }
        info!(initiator = %init_id, "Created storage hardware id");
        Ok(())
    }

    async fn change_initiator(
        &self,
        access_group: &AccessGroup,
        init_id: &str,
        add: Option<InitiatorType>,
    ) -> Result<Completion<()>> {
        if let Some(init_type) = add {
            self.session.require(Profile::MaskingMapping, SpecVersion::SMIS_1_4)?;
            let known = self
                .nav()
                .find_by_id(EntityKind::Initiator, init_id, &[])
                .await?
                .is_some();
            if !known {
                self.create_initiator(&access_group.system_id, init_id, init_type).await?;
            }
        }

        let view = self
            .nav()
            .instance_by_id(EntityKind::AccessGroup, &access_group.id, ACCESS_GROUP_PROPERTIES)
            .await?;
        let ccs = self.controller_service(&access_group.system_id).await?;

        let mut params = MethodParams::new();
        params.insert("InitiatorPortIDs".into(), vec![init_id].into());
        params.insert("ProtocolControllers".into(), vec![view.path].into());
        let method = if add.is_some() { "ExposePaths" } else { "HidePaths" };
        let completion = self.invoke(method, &ccs.path, params, RetrieveKind::None).await?;
        Ok(completion.map(|_| ()))
    }

    async fn masked_volumes(&self, access_group: &AccessGroup) -> Result<Vec<Volume>> {
        let nav = self.nav();
        let view = nav
            .instance_by_id(EntityKind::AccessGroup, &access_group.id, ACCESS_GROUP_PROPERTIES)
            .await?;
        let mut out = Vec::new();
        for lun in nav.volumes_masked_to(&view.path).await? {
            let pool_id = nav.pool_id_of_volume(&lun.path).await?;
            out.push(mapper::map_volume(&lun, &pool_id, None)?);
        }
        Ok(out)
    }

    async fn granted_groups(&self, volume: &Volume) -> Result<Vec<AccessGroup>> {
        let nav = self.nav();
        let lun = nav.instance_by_id(EntityKind::Volume, &volume.id, &[]).await?;
        let mut out = Vec::new();
        for view in nav.access_groups_masked_to(&lun.path).await? {
            out.push(self.access_group_of(&view, None).await?);
        }
        Ok(out)
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn access_groups(&self, search: Option<&Search>) -> Result<Vec<AccessGroup>> {
        let timer = OperationTimer::new("access_groups");
        let groups = self.list_access_groups().await;
        timer.finish(groups.and_then(|g| types::filter(g, search)))
    }

    /// Initiators known through any access group.
    #[instrument(skip(self))]
    pub async fn initiators(&self, search: Option<&Search>) -> Result<Vec<Initiator>> {
        let timer = OperationTimer::new("initiators");
        let initiators = self.list_initiators().await;
        timer.finish(initiators.and_then(|i| types::filter(i, search)))
    }

    /// Grant `access_group` read/write access to `volume`.
    #[instrument(skip(self, access_group, volume), fields(access_group = %access_group.id, volume = %volume.id))]
    pub async fn volume_mask(&self, access_group: &AccessGroup, volume: &Volume) -> Result<Completion<()>> {
        let timer = OperationTimer::new("volume_mask");
        info!("Masking volume {} to access group {}", volume.name, access_group.name);
        timer.finish(self.mask(access_group, volume, true).await)
    }

    #[instrument(skip(self, access_group, volume), fields(access_group = %access_group.id, volume = %volume.id))]
    pub async fn volume_unmask(&self, access_group: &AccessGroup, volume: &Volume) -> Result<Completion<()>> {
        let timer = OperationTimer::new("volume_unmask");
        info!("Unmasking volume {} from access group {}", volume.name, access_group.name);
        timer.finish(self.mask(access_group, volume, false).await)
    }

    /// Add an initiator to an access group, registering it with the array
    /// first if the array does not know it yet.
    #[instrument(skip(self, access_group), fields(access_group = %access_group.id))]
    pub async fn access_group_initiator_add(
        &self,
        access_group: &AccessGroup,
        init_id: &str,
        init_type: InitiatorType,
    ) -> Result<Completion<()>> {
        let timer = OperationTimer::new("access_group_initiator_add");
        debug!(?init_type, "Adding initiator {}", init_id);
        timer.finish(self.change_initiator(access_group, init_id, Some(init_type)).await)
    }

    #[instrument(skip(self, access_group), fields(access_group = %access_group.id))]
    pub async fn access_group_initiator_delete(
        &self,
        access_group: &AccessGroup,
        init_id: &str,
    ) -> Result<Completion<()>> {
        let timer = OperationTimer::new("access_group_initiator_delete");
        debug!("Removing initiator {}", init_id);
        timer.finish(self.change_initiator(access_group, init_id, None).await)
    }

    #[instrument(skip(self, access_group), fields(access_group = %access_group.id))]
    pub async fn volumes_accessible_by_access_group(&self, access_group: &AccessGroup) -> Result<Vec<Volume>> {
        let timer = OperationTimer::new("volumes_accessible_by_access_group");
        timer.finish(self.masked_volumes(access_group).await)
    }

    #[instrument(skip(self, volume), fields(volume = %volume.id))]
    pub async fn access_groups_granted_to_volume(&self, volume: &Volume) -> Result<Vec<AccessGroup>> {
        let timer = OperationTimer::new("access_groups_granted_to_volume");
        timer.finish(self.granted_groups(volume).await)
    }
}
