//! Pools, volumes, disks and the extent composition below them.

use cim_core::{AssociationQuery, CimInstance, CimInstanceName, CimStatus, WbemClient};
use tracing::{debug, warn};

use super::{Navigator, MAX_TRAVERSAL_DEPTH};
use crate::dmtf::pool as pool_values;
use crate::error::{Result, SmisError};
use crate::ids::{self, EntityKind};
use crate::mapper::{self, POOL_PROPERTIES, VOLUME_PROPERTIES};
use crate::quirks::{self, Quirk};
use crate::raid::{self, RAID_PROPERTIES};
use crate::types::{DiskType, ElementType, MemberType, PoolDetails, ThinpType};

const CAPABILITY_PROPERTIES: &[&str] = &["SupportedStorageElementFeatures", "SupportedStorageElementTypes"];

fn push_unique(ids: &mut Vec<String>, id: String) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

impl<'a, C: WbemClient> Navigator<'a, C> {
    // ========================================================================
    // Pools
    // ========================================================================

    /// Pools hosted by `system` that can be reported: primordial, spare and
    /// vendor-hidden pools are left out.
    pub async fn pools_of(&self, system: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_HostedStoragePool")
            .result_class("CIM_StoragePool")
            .properties(POOL_PROPERTIES);
        let pools = self.client.associators(system, &query).await?;
        Ok(pools
            .into_iter()
            .filter(|p| p.bool_prop("Primordial") != Some(true))
            .filter(|p| p.u64_prop("Usage") != Some(pool_values::USAGE_SPARE))
            .filter(|p| !quirks::has_quirk(p.classname(), Quirk::HiddenPool))
            .collect())
    }

    /// Id of the system hosting `pool`, or an empty string when the provider
    /// does not link exactly one.
    pub async fn pool_system_id(&self, pool: &CimInstanceName) -> Result<String> {
        let query = AssociationQuery::new()
            .result_class("CIM_ComputerSystem")
            .properties(EntityKind::System.id_properties());
        let systems = self.client.associators(pool, &query).await?;
        match systems.as_slice() {
            [system] => ids::id_of(self.client, EntityKind::System, system).await,
            _ => Ok(String::new()),
        }
    }

    async fn pool_configuration_capabilities(&self, pool: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_ElementCapabilities")
            .result_class("CIM_StorageConfigurationCapabilities")
            .properties(CAPABILITY_PROPERTIES);
        Ok(self.client.associators(pool, &query).await?)
    }

    /// What `pool` can hold.
    pub async fn pool_element_type(&self, pool: &CimInstance) -> Result<ElementType> {
        let mut element_type = ElementType::UNKNOWN;

        let capabilities = self.pool_configuration_capabilities(&pool.path).await?;
        if let [caps] = capabilities.as_slice() {
            if caps
                .u64_array("SupportedStorageElementFeatures")
                .contains(&pool_values::FEATURE_VOLUME_CREATION)
            {
                element_type = ElementType::VOLUME;
            }
        } else if quirks::has_quirk(pool.classname(), Quirk::VolumeElementWithoutCapabilities) {
            element_type = ElementType::VOLUME;
        } else if quirks::has_quirk(pool.classname(), Quirk::PoolElementWithoutCapabilities) {
            element_type = ElementType::POOL;
        }

        match pool.u64_prop("Usage") {
            Some(pool_values::USAGE_DELTA) => element_type = ElementType::DELTA,
            Some(pool_values::USAGE_UNRESTRICTED) => element_type = ElementType::VOLUME,
            _ => {}
        }
        Ok(element_type)
    }

    /// Layout, members and provisioning of `pool`.
    pub async fn pool_details(&self, pool: &CimInstance) -> Result<PoolDetails> {
        let mut details = PoolDetails::default();
        let classname = pool.classname();

        let capabilities = self.pool_configuration_capabilities(&pool.path).await?;
        if let [caps] = capabilities.as_slice() {
            if caps.has("SupportedStorageElementTypes") {
                details.thinp_type = if caps
                    .u64_array("SupportedStorageElementTypes")
                    .contains(&pool_values::ELEMENT_THIN_VOLUME)
                {
                    ThinpType::Thin
                } else {
                    ThinpType::Thick
                };
            }
        } else if quirks::has_quirk(classname, Quirk::ThickWithoutCapabilities) {
            details.thinp_type = ThinpType::Thick;
        }

        if !quirks::has_quirk(classname, Quirk::DiskPool) {
            for parent in self.parent_pools(&pool.path).await? {
                details.member_type = MemberType::Pool;
                let id = ids::id_of(self.client, EntityKind::Pool, &parent).await?;
                push_unique(&mut details.member_ids, id);
            }
        }

        if quirks::has_quirk(classname, Quirk::SkipExtentWalk) {
            debug!(pool = %pool.path, "Skipping extent walk");
            return Ok(details);
        }

        let extents = self.bottom_composite_extents(pool).await?;
        details.raid_type = raid::combine(extents.iter().map(raid::raid_type_of));

        if details.member_type == MemberType::Pool {
            return Ok(details);
        }
        for extent in &extents {
            for primordial in self.primordial_extents_below(&extent.path).await? {
                let Some(disk) = self.disk_of_primordial_extent(&primordial.path).await? else {
                    continue;
                };
                details.member_type = MemberType::Disk;
                let id = ids::id_of(self.client, EntityKind::Disk, &disk).await?;
                push_unique(&mut details.member_ids, id);
            }
        }
        Ok(details)
    }

    /// Non-primordial pools `pool` is allocated from.
    async fn parent_pools(&self, pool: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_AllocatedFromStoragePool")
            .role("Dependent")
            .result_role("Antecedent")
            .result_class("CIM_StoragePool")
            .properties(&["InstanceID", "Primordial"]);
        let parents = self.client.associators(pool, &query).await?;
        Ok(parents
            .into_iter()
            .filter(|p| p.bool_prop("Primordial") != Some(true))
            .collect())
    }

    // ========================================================================
    // Extent composition
    // ========================================================================

    fn composite_query(assoc_class: &str) -> AssociationQuery {
        AssociationQuery::new()
            .assoc_class(assoc_class)
            .role("GroupComponent")
            .result_role("PartComponent")
            .result_class("CIM_CompositeExtent")
            .properties(RAID_PROPERTIES)
    }

    /// Lowest level composite extents under `pool`. Intermediate levels are
    /// not returned.
    pub async fn bottom_composite_extents(&self, pool: &CimInstance) -> Result<Vec<CimInstance>> {
        let legacy = Self::composite_query("CIM_ConcreteComponent");
        let top = if quirks::has_quirk(pool.classname(), Quirk::LegacyExtentComposition) {
            self.client.associators(&pool.path, &legacy).await?
        } else {
            let current = Self::composite_query("CIM_AssociatedComponentExtent");
            match self.client.associators(&pool.path, &current).await {
                Ok(extents) => extents,
                Err(e) if e.is_status(&[CimStatus::InvalidClass, CimStatus::InvalidParameter]) => {
                    debug!(pool = %pool.path, "Falling back to CIM_ConcreteComponent");
                    self.client.associators(&pool.path, &legacy).await?
                }
                Err(e) => return Err(e.into()),
            }
        };

        let nested = Self::composite_query("CIM_BasedOn");
        let mut bottom: Vec<CimInstance> = Vec::new();
        let mut visited: Vec<CimInstanceName> = top.iter().map(|e| e.path.clone()).collect();
        let mut worklist: Vec<(CimInstance, usize)> = top.into_iter().rev().map(|e| (e, 0)).collect();
        while let Some((extent, depth)) = worklist.pop() {
            if depth >= MAX_TRAVERSAL_DEPTH {
                warn!(extent = %extent.path, "Extent composition deeper than {} levels", MAX_TRAVERSAL_DEPTH);
                bottom.push(extent);
                continue;
            }
            let children = self.client.associators(&extent.path, &nested).await?;
            let fresh: Vec<CimInstance> = children
                .into_iter()
                .filter(|c| !visited.iter().any(|v| v.same_object(&c.path)))
                .collect();
            if fresh.is_empty() {
                bottom.push(extent);
                continue;
            }
            for child in fresh.into_iter().rev() {
                visited.push(child.path.clone());
                worklist.push((child, depth + 1));
            }
        }
        Ok(bottom)
    }

    /// Primordial extents `extent` is built on, through any number of
    /// concrete extents.
    pub async fn primordial_extents_below(&self, extent: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_BasedOn")
            .role("Dependent")
            .result_role("Antecedent")
            .result_class("CIM_StorageExtent")
            .properties(&["Primordial"]);

        let mut out = Vec::new();
        let mut visited = vec![extent.clone()];
        let mut worklist = vec![(extent.clone(), 0usize)];
        while let Some((current, depth)) = worklist.pop() {
            if depth >= MAX_TRAVERSAL_DEPTH {
                warn!(extent = %current, "Extent chain deeper than {} levels", MAX_TRAVERSAL_DEPTH);
                continue;
            }
            for sub in self.client.associators(&current, &query).await? {
                if visited.iter().any(|v| v.same_object(&sub.path)) {
                    continue;
                }
                visited.push(sub.path.clone());
                if sub.bool_prop("Primordial") == Some(true) {
                    out.push(sub);
                } else {
                    worklist.push((sub.path.clone(), depth + 1));
                }
            }
        }
        Ok(out)
    }

    /// Disk drive presenting a primordial extent.
    ///
    /// Two drives mean a dual-ported disk reported twice; the extent is then
    /// skipped. An extent no drive presents is a provider bug.
    pub async fn disk_of_primordial_extent(&self, extent: &CimInstanceName) -> Result<Option<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_MediaPresent")
            .result_class("CIM_DiskDrive")
            .properties(EntityKind::Disk.id_properties());
        let mut disks = self.client.associators(extent, &query).await?;
        match disks.len() {
            0 => Err(SmisError::InternalBug(format!(
                "No CIM_DiskDrive associated to requested CIM_StorageExtent {}",
                extent
            ))),
            1 => Ok(disks.pop()),
            2 => Ok(None),
            _ => Err(SmisError::InternalBug(format!(
                "Found two or more CIM_DiskDrive associated to requested CIM_StorageExtent {}",
                extent
            ))),
        }
    }

    // ========================================================================
    // Volumes
    // ========================================================================

    /// Volumes allocated from `pool`, without the ones the array reserves
    /// for itself.
    pub async fn volumes_of(&self, pool: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_AllocatedFromStoragePool")
            .result_class("CIM_StorageVolume")
            .properties(VOLUME_PROPERTIES);
        let volumes = self.client.associators(pool, &query).await?;
        Ok(volumes
            .into_iter()
            .filter(|v| !mapper::is_system_reserved_volume(v))
            .collect())
    }

    /// Id of the pool `volume` is allocated from.
    pub async fn pool_id_of_volume(&self, volume: &CimInstanceName) -> Result<String> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_AllocatedFromStoragePool")
            .result_class("CIM_StoragePool")
            .properties(EntityKind::Pool.id_properties());
        let pools = self.client.associators(volume, &query).await?;
        match pools.first() {
            Some(pool) => ids::id_of(self.client, EntityKind::Pool, pool).await,
            None => Err(SmisError::InternalBug(format!(
                "Failed to find out the CIM_StoragePool of volume {}",
                volume
            ))),
        }
    }

    // ========================================================================
    // Disks
    // ========================================================================

    /// Primordial extent a disk presents; it carries the block geometry.
    pub async fn primordial_extent_of_disk(&self, disk: &CimInstanceName) -> Result<CimInstance> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_MediaPresent")
            .result_class("CIM_StorageExtent")
            .properties(&["BlockSize", "NumberOfBlocks", "Primordial"]);
        self.client
            .associators(disk, &query)
            .await?
            .into_iter()
            .find(|e| e.bool_prop("Primordial") == Some(true))
            .ok_or_else(|| {
                SmisError::InternalBug(format!(
                    "Failed to find out Primordial CIM_StorageExtent for CIM_DiskDrive {}",
                    disk
                ))
            })
    }

    /// Disk type, asking the attached protocol endpoint when the drive
    /// itself does not tell.
    pub async fn disk_type(&self, disk: &CimInstance) -> Result<DiskType> {
        let disk_type = mapper::disk_type_of(disk);
        if disk_type != DiskType::Unknown
            || !quirks::has_quirk(disk.classname(), Quirk::DiskTypeFromProtocolEndpoint)
        {
            return Ok(disk_type);
        }
        let query = AssociationQuery::new()
            .assoc_class("CIM_SAPAvailableForElement")
            .result_class("CIM_ProtocolEndpoint")
            .properties(&["CreationClassName"]);
        let endpoints = self.client.associators(&disk.path, &query).await?;
        Ok(endpoints
            .first()
            .and_then(|e| e.str_prop("CreationClassName"))
            .map(mapper::disk_type_of_endpoint_class)
            .unwrap_or(DiskType::Unknown))
    }
}
