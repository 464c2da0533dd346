//! Read-only listings: pools, volumes, disks and target ports.

use cim_core::{AssociationQuery, CimInstance, WbemClient};
use tracing::{debug, instrument};

use super::SmisPlugin;
use crate::error::{Result, SmisError};
use crate::ids::{self, EntityKind};
use crate::mapper::{self, DISK_PROPERTIES, POOL_PROPERTIES};
use crate::metrics::OperationTimer;
use crate::profile::{Profile, SpecVersion};
use crate::types::{self, Disk, Pool, PoolDetails, Search, TargetPort, Volume};

impl<C: WbemClient> SmisPlugin<C> {
    async fn list_pools(&self) -> Result<Vec<Pool>> {
        let nav = self.nav();
        let mut out = Vec::new();
        for system in nav.root_systems().await? {
            let system_id = ids::id_of(&self.client, EntityKind::System, &system).await?;
            for pool in nav.pools_of(&system.path).await? {
                let element_type = nav.pool_element_type(&pool).await?;
                out.push(mapper::map_pool(&pool, &system_id, element_type)?);
            }
        }
        Ok(out)
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        let nav = self.nav();
        let mut out = Vec::new();
        for system in nav.root_systems().await? {
            let system_id = ids::id_of(&self.client, EntityKind::System, &system).await?;
            for pool in nav.pools_of(&system.path).await? {
                let pool_id = ids::id_of(&self.client, EntityKind::Pool, &pool).await?;
                for volume in nav.volumes_of(&pool.path).await? {
                    out.push(mapper::map_volume(&volume, &pool_id, Some(&system_id))?);
                }
            }
        }
        Ok(out)
    }

    /// Disk drives of `system` through `CIM_SystemDevice`.
    async fn drives_of(&self, system: &CimInstance) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_SystemDevice")
            .result_class("CIM_DiskDrive")
            .properties(DISK_PROPERTIES);
        Ok(self.client.associators(&system.path, &query).await?)
    }

    async fn list_disks(&self) -> Result<Vec<Disk>> {
        self.session.require(Profile::DiskDriveLite, SpecVersion::SMIS_1_4)?;
        let nav = self.nav();
        let multi_system = self
            .session
            .is_supported(Profile::MultipleComputerSystem, SpecVersion::SMIS_1_4);

        let mut out = Vec::new();
        for system in nav.root_systems().await? {
            let mut hosts = vec![system.clone()];
            if multi_system {
                hosts.extend(nav.leaf_systems(&system.path).await?);
            }
            for host in &hosts {
                for drive in self.drives_of(host).await? {
                    let extent = nav.primordial_extent_of_disk(&drive.path).await?;
                    let disk_type = nav.disk_type(&drive).await?;
                    out.push(mapper::map_disk(&drive, &extent, disk_type)?);
                }
            }
        }
        Ok(out)
    }

    async fn list_target_ports(&self) -> Result<Vec<TargetPort>> {
        let (fc, iscsi) = if self.session.fallback_mode {
            (
                self.class_present("CIM_FCPort").await?,
                self.class_present("CIM_iSCSIProtocolEndpoint").await?,
            )
        } else {
            (
                self.session.is_supported(Profile::FcTargetPorts, SpecVersion::SMIS_1_4),
                self.session.is_supported(Profile::IscsiTargetPorts, SpecVersion::SMIS_1_4),
            )
        };
        if !fc && !iscsi {
            return Err(SmisError::NoSupport(format!(
                "Target SMI-S provider does not support {} or {} version {} or later profiles",
                Profile::FcTargetPorts,
                Profile::IscsiTargetPorts,
                SpecVersion::SMIS_1_4
            )));
        }

        let nav = self.nav();
        let multi_system = self
            .session
            .is_supported(Profile::MultipleComputerSystem, SpecVersion::SMIS_1_4);
        let mut out = Vec::new();
        if fc {
            out.extend(nav.fc_target_ports(multi_system).await?);
        }
        if iscsi {
            out.extend(nav.iscsi_target_ports(multi_system).await?);
        }
        debug!(fc, iscsi, count = out.len(), "Collected target ports");
        Ok(out)
    }

    /// Pools of every reachable system.
    #[instrument(skip(self))]
    pub async fn pools(&self, search: Option<&Search>) -> Result<Vec<Pool>> {
        let timer = OperationTimer::new("pools");
        let pools = match self.list_pools().await {
            Ok(pools) => types::filter(pools, search),
            Err(e) => Err(e),
        };
        timer.finish(pools)
    }

    /// RAID layout, members and provisioning of `pool`.
    #[instrument(skip(self, pool), fields(pool = %pool.id))]
    pub async fn pool_details(&self, pool: &Pool) -> Result<PoolDetails> {
        let timer = OperationTimer::new("pool_details");
        let details = async {
            let nav = self.nav();
            let cim_pool = nav
                .instance_by_id(EntityKind::Pool, &pool.id, POOL_PROPERTIES)
                .await?;
            nav.pool_details(&cim_pool).await
        }
        .await;
        timer.finish(details)
    }

    #[instrument(skip(self))]
    pub async fn volumes(&self, search: Option<&Search>) -> Result<Vec<Volume>> {
        let timer = OperationTimer::new("volumes");
        let volumes = match self.list_volumes().await {
            Ok(volumes) => types::filter(volumes, search),
            Err(e) => Err(e),
        };
        timer.finish(volumes)
    }

    /// Physical disks. Needs `Disk Drive Lite` unless in fallback mode.
    #[instrument(skip(self))]
    pub async fn disks(&self, search: Option<&Search>) -> Result<Vec<Disk>> {
        let timer = OperationTimer::new("disks");
        let disks = match self.list_disks().await {
            Ok(disks) => types::filter(disks, search),
            Err(e) => Err(e),
        };
        timer.finish(disks)
    }

    /// FC, FCoE and iSCSI front-end ports.
    #[instrument(skip(self))]
    pub async fn target_ports(&self, search: Option<&Search>) -> Result<Vec<TargetPort>> {
        let timer = OperationTimer::new("target_ports");
        let ports = match self.list_target_ports().await {
            Ok(ports) => types::filter(ports, search),
            Err(e) => Err(e),
        };
        timer.finish(ports)
    }
}
