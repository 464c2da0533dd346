//! Volume create, resize, delete and replicate.

use cim_core::{CimInstance, CimInstanceName, CimValue, MethodParams, WbemClient};
use tracing::{debug, info, instrument};

use super::SmisPlugin;
use crate::dmtf::{replication, volume as volume_values};
use crate::error::{Result, SmisError};
use crate::ids::EntityKind;
use crate::job::{Completion, JobResult, RetrieveKind};
use crate::metrics::{self, OperationTimer};
use crate::types::{Pool, Provisioning, ReplicationType, Volume};

const STORAGE_CONFIGURATION_SERVICE: &str = "CIM_StorageConfigurationService";
const REPLICATION_SERVICE: &str = "CIM_ReplicationService";

/// Keys that identify a volume across the references providers hand out.
const VOLUME_KEYS: &[&str] = &["DeviceID", "SystemName", "SystemCreationClassName"];

fn same_volume(a: &CimInstanceName, b: &CimInstanceName) -> bool {
    VOLUME_KEYS.iter().all(|k| a.key(k) == b.key(k))
}

/// A synchronized, non-clone relationship naming `volume` on either side
/// must be detached before the volume can go.
fn needs_detach(sync: &CimInstance, volume: &CimInstanceName) -> bool {
    if sync.u64_prop("SyncState") != Some(replication::SYNC_STATE_SYNCHRONIZED) {
        return false;
    }
    match sync.u64_prop("CopyType") {
        Some(copy_type) if copy_type != replication::COPY_TYPE_UNSYNC_ASSOC => {}
        _ => return false,
    }
    ["SyncedElement", "SystemElement"]
        .iter()
        .any(|role| sync.ref_prop(role).is_some_and(|r| same_volume(r, volume)))
}

/// `CreateReplica` copy type for replication through the configuration
/// service.
fn legacy_copy_type(rep_type: ReplicationType) -> Result<u64> {
    match rep_type {
        ReplicationType::Clone => Ok(replication::COPY_TYPE_UNSYNC_ASSOC),
        ReplicationType::Copy => Ok(replication::COPY_TYPE_UNSYNC_UNASSOC),
        _ => Err(SmisError::NoSupport("Replication type not supported".to_string())),
    }
}

/// `CreateElementReplica` sync type for `rep_type`, given the replication
/// types the service supports.
fn sync_type_for(rep_type: ReplicationType, supported: &[u64]) -> Result<u64> {
    let clone_local = [replication::SYNC_CLONE_LOCAL, replication::ASYNC_CLONE_LOCAL];
    let snapshot_local = [
        replication::SYNC_SNAPSHOT_LOCAL,
        replication::ASYNC_SNAPSHOT_LOCAL,
        replication::SYNC_CLONE_LOCAL,
        replication::ASYNC_CLONE_LOCAL,
    ];
    let any_of = |wanted: &[u64]| wanted.iter().any(|t| supported.contains(t));
    match rep_type {
        ReplicationType::Copy if any_of(&clone_local) => Ok(replication::SYNC_TYPE_CLONE),
        ReplicationType::Clone | ReplicationType::Snapshot if any_of(&snapshot_local) => {
            Ok(replication::SYNC_TYPE_SNAPSHOT)
        }
        _ => Err(SmisError::NoSupport("Replication type not supported".to_string())),
    }
}

fn into_volume(completion: Completion<Option<JobResult>>) -> Completion<Option<Volume>> {
    completion.map(|r| r.and_then(JobResult::into_volume))
}

impl<C: WbemClient> SmisPlugin<C> {
    async fn configuration_service(&self, system_id: &str) -> Result<CimInstance> {
        self.nav()
            .require_class_instance(STORAGE_CONFIGURATION_SERVICE, "SystemName", system_id)
            .await
    }

    async fn create_volume(
        &self,
        pool: &Pool,
        name: &str,
        size_bytes: u64,
        provisioning: Provisioning,
    ) -> Result<Completion<Option<Volume>>> {
        if provisioning != Provisioning::Default {
            return Err(SmisError::NoSupport("Unsupported provisioning".to_string()));
        }
        let scs = self.configuration_service(&pool.system_id).await?;
        let cim_pool = self.nav().instance_by_id(EntityKind::Pool, &pool.id, &[]).await?;

        let mut params = MethodParams::new();
        params.insert("ElementName".into(), name.into());
        params.insert("ElementType".into(), CimValue::Uint(volume_values::ELEMENT_TYPE_STORAGE_VOLUME));
        params.insert("InPool".into(), cim_pool.path.into());
        params.insert("Size".into(), size_bytes.into());

        let completion = self
            .invoke("CreateOrModifyElementFromStoragePool", &scs.path, params, RetrieveKind::Volume)
            .await?;
        Ok(into_volume(completion))
    }

    async fn resize_volume(&self, volume: &Volume, new_size_bytes: u64) -> Result<Completion<Option<Volume>>> {
        let scs = self.configuration_service(&volume.system_id).await?;
        let lun = self.nav().instance_by_id(EntityKind::Volume, &volume.id, &[]).await?;

        let mut params = MethodParams::new();
        params.insert("ElementType".into(), CimValue::Uint(volume_values::ELEMENT_TYPE_STORAGE_VOLUME));
        params.insert("TheElement".into(), lun.path.into());
        params.insert("Size".into(), new_size_bytes.into());

        let completion = self
            .invoke("CreateOrModifyElementFromStoragePool", &scs.path, params, RetrieveKind::Volume)
            .await?;
        Ok(into_volume(completion))
    }

    /// Break one replica relationship and wait for the provider to finish.
    async fn detach(&self, volume: &Volume, sync: &CimInstanceName) -> Result<()> {
        let Some(rs) = self
            .nav()
            .class_instance(REPLICATION_SERVICE, "SystemName", &volume.system_id)
            .await?
        else {
            debug!(volume = %volume.id, "No replication service to detach through");
            return Ok(());
        };

        let mut params = MethodParams::new();
        params.insert("Operation".into(), CimValue::Uint(replication::OPERATION_DETACH));
        params.insert("Synchronization".into(), sync.clone().into());
        let completion = self
            .invoke("ModifyReplicaSynchronization", &rs.path, params, RetrieveKind::None)
            .await?;
        self.settle(completion).await?;
        metrics::record_detach();
        info!(volume = %volume.id, relationship = %sync, "Detached replica");
        Ok(())
    }

    async fn delete_volume(&self, volume: &Volume) -> Result<Completion<()>> {
        let scs = self.configuration_service(&volume.system_id).await?;
        let lun = self.nav().instance_by_id(EntityKind::Volume, &volume.id, &[]).await?;

        for sync in self.nav().sync_relationships_of(&lun.path).await? {
            if needs_detach(&sync, &lun.path) {
                self.detach(volume, &sync.path).await?;
            }
        }

        let mut params = MethodParams::new();
        params.insert("TheElement".into(), lun.path.into());
        let completion = self
            .invoke("ReturnToStoragePool", &scs.path, params, RetrieveKind::None)
            .await?;
        Ok(completion.map(|_| ()))
    }

    async fn replicate_volume(
        &self,
        pool: Option<&Pool>,
        rep_type: ReplicationType,
        source: &Volume,
        name: &str,
    ) -> Result<Completion<Option<Volume>>> {
        if matches!(rep_type, ReplicationType::MirrorSync | ReplicationType::MirrorAsync) {
            return Err(SmisError::NoSupport("Mirroring not supported".to_string()));
        }
        let nav = self.nav();
        let rs = nav
            .class_instance(REPLICATION_SERVICE, "SystemName", &source.system_id)
            .await?;
        let target_pool = match pool {
            Some(p) => Some(nav.instance_by_id(EntityKind::Pool, &p.id, &[]).await?),
            None => None,
        };
        let lun = nav.instance_by_id(EntityKind::Volume, &source.id, &[]).await?;

        let mut params = MethodParams::new();
        params.insert("ElementName".into(), name.into());
        params.insert("SourceElement".into(), lun.path.into());
        if let Some(target_pool) = target_pool {
            params.insert("TargetPool".into(), target_pool.path.into());
        }

        let (method, service) = match rs {
            Some(rs) => {
                let capabilities = nav
                    .capabilities_of(&rs.path, "CIM_ReplicationServiceCapabilities")
                    .await?;
                let supported = capabilities
                    .first()
                    .map(|c| c.u64_array("SupportedReplicationTypes"))
                    .unwrap_or_default();
                params.insert("SyncType".into(), CimValue::Uint(sync_type_for(rep_type, &supported)?));
                params.insert(
                    "WaitForCopyState".into(),
                    CimValue::Uint(replication::COPY_STATE_SYNCHRONIZED),
                );
                ("CreateElementReplica", rs.path)
            }
            None => {
                let scs = nav
                    .class_instance(STORAGE_CONFIGURATION_SERVICE, "SystemName", &source.system_id)
                    .await?
                    .ok_or_else(|| SmisError::NoSupport("volume-replicate not supported".to_string()))?;
                params.insert("CopyType".into(), CimValue::Uint(legacy_copy_type(rep_type)?));
                ("CreateReplica", scs.path)
            }
        };

        let completion = self.invoke(method, &service, params, RetrieveKind::Volume).await?;
        Ok(into_volume(completion))
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Create a volume of `size_bytes` in `pool`.
    #[instrument(skip(self, pool), fields(pool = %pool.id))]
    pub async fn volume_create(
        &self,
        pool: &Pool,
        name: &str,
        size_bytes: u64,
        provisioning: Provisioning,
    ) -> Result<Completion<Option<Volume>>> {
        let timer = OperationTimer::new("volume_create");
        info!("Creating volume {} ({} bytes)", name, size_bytes);
        timer.finish(self.create_volume(pool, name, size_bytes, provisioning).await)
    }

    #[instrument(skip(self, volume), fields(volume = %volume.id))]
    pub async fn volume_resize(&self, volume: &Volume, new_size_bytes: u64) -> Result<Completion<Option<Volume>>> {
        let timer = OperationTimer::new("volume_resize");
        info!("Resizing volume {} to {} bytes", volume.name, new_size_bytes);
        timer.finish(self.resize_volume(volume, new_size_bytes).await)
    }

    /// Delete a volume, detaching synchronized replicas first.
    #[instrument(skip(self, volume), fields(volume = %volume.id))]
    pub async fn volume_delete(&self, volume: &Volume) -> Result<Completion<()>> {
        let timer = OperationTimer::new("volume_delete");
        info!("Deleting volume {}", volume.name);
        timer.finish(self.delete_volume(volume).await)
    }

    /// Replicate `source` into a new volume called `name`, in `pool` when
    /// given.
    #[instrument(skip(self, pool, source), fields(source = %source.id))]
    pub async fn volume_replicate(
        &self,
        pool: Option<&Pool>,
        rep_type: ReplicationType,
        source: &Volume,
        name: &str,
    ) -> Result<Completion<Option<Volume>>> {
        let timer = OperationTimer::new("volume_replicate");
        info!("Replicating volume {} as {} ({:?})", source.name, name, rep_type);
        timer.finish(self.replicate_volume(pool, rep_type, source, name).await)
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

    fn volume_inst(device_id: &str) -> CimInstance {
        CimInstance::new(
            CimInstanceName::new("ACME_StorageVolume")
                .with_key("SystemName", "ARRAY-A")
                .with_key("DeviceID", device_id)
                .with_key("SystemCreationClassName", "ACME_ComputerSystem"),
        )
        .with("SystemName", "ARRAY-A")
        .with("DeviceID", device_id)
        .with("ElementName", format!("vol-{}", device_id))
        .with("BlockSize", 512u64)
        .with("NumberOfBlocks", 2048u64)
    }

    struct Fixture {
        plugin: SmisPlugin<MockWbem>,
        pool: Pool,
        volume: Volume,
        lun: CimInstanceName,
    }

    fn fixture(with_rs: Option<Vec<u16>>) -> Fixture {
        let mock = MockWbem::with_default_namespace(NS);
        mock.add_instance(
            CimInstance::new(CimInstanceName::new("ACME_StorageConfigurationService").with_key("Name", "SCS"))
                .with("SystemName", "ARRAY-A"),
        );
        if let Some(types) = with_rs {
            let rs = mock.add_instance(
                CimInstance::new(CimInstanceName::new("ACME_ReplicationService").with_key("Name", "RS"))
                    .with("SystemName", "ARRAY-A"),
            );
            let caps = mock.add_instance(
                CimInstance::new(
                    CimInstanceName::new("ACME_ReplicationServiceCapabilities").with_key("InstanceID", "RSC"),
                )
                .with("SupportedReplicationTypes", CimValue::from(types)),
            );
            mock.associate("CIM_ElementCapabilities", ("ManagedElement", &rs), ("Capabilities", &caps));
        }
        let pool_inst = CimInstance::new(CimInstanceName::new("ACME_StoragePool").with_key("InstanceID", "POOL-1"))
            .with("InstanceID", "POOL-1");
        let pool_path = mock.add_instance(pool_inst.clone());
        let lun_inst = volume_inst("0001");
        let lun = mock.add_instance(lun_inst.clone());
        mock.associate("CIM_AllocatedFromStoragePool", ("Antecedent", &pool_path), ("Dependent", &lun));

        let session = SessionContext::new(true, RegisteredProfiles::default(), None)
            .with_vendor_namespaces(vec![NS.to_string()]);
        Fixture {
            plugin: SmisPlugin::with_session(mock, session),
            pool: mapper::map_pool(&pool_inst, "ARRAY-A", ElementType::VOLUME).unwrap(),
            volume: mapper::map_volume(&lun_inst, "POOL-1", None).unwrap(),
            lun,
        }
    }

    #[test]
    fn test_sync_type_selection() {
        assert_eq!(sync_type_for(ReplicationType::Copy, &[10]).unwrap(), 8);
        assert_eq!(sync_type_for(ReplicationType::Snapshot, &[7]).unwrap(), 7);
        assert_eq!(sync_type_for(ReplicationType::Clone, &[11]).unwrap(), 7);
        assert!(matches!(
            sync_type_for(ReplicationType::Copy, &[6, 7]),
            Err(SmisError::NoSupport(_))
        ));
        assert_eq!(legacy_copy_type(ReplicationType::Copy).unwrap(), 5);
        assert!(legacy_copy_type(ReplicationType::Snapshot).is_err());
    }

    #[tokio::test]
    async fn test_create_returns_new_volume() {
        let f = fixture(None);
        f.plugin.client.expect_method(
            "CreateOrModifyElementFromStoragePool",
            Ok(MethodResult::new(0).with_out("TheElement", f.lun.clone())),
        );
        let completion = f
            .plugin
            .volume_create(&f.pool, "vol-0001", 1 << 20, Provisioning::Default)
            .await
            .unwrap();
        assert_eq!(completion, Completion::Done(Some(f.volume.clone())));

        let params = &f.plugin.client.method_params("CreateOrModifyElementFromStoragePool")[0];
        assert_eq!(params.get("ElementType"), Some(&CimValue::Uint(2)));
        assert_eq!(params.get("Size"), Some(&CimValue::Uint(1 << 20)));
    }

    #[tokio::test]
    async fn test_create_rejects_thin_provisioning() {
        let f = fixture(None);
        let err = f
            .plugin
            .volume_create(&f.pool, "v", 1, Provisioning::Thin)
            .await
            .unwrap_err();
        assert!(matches!(err, SmisError::NoSupport(_)));
        assert!(f.plugin.client.invoked_methods().is_empty());
    }

    #[tokio::test]
    async fn test_delete_detaches_synchronized_replica_first() {
        let f = fixture(Some(vec![10]));
        let target = f.plugin.client.add_instance(volume_inst("0002"));
        f.plugin.client.associate_with(
            "CIM_StorageSynchronized",
            ("SystemElement", &f.lun),
            ("SyncedElement", &target),
            vec![("SyncState", CimValue::Uint(6)), ("CopyType", CimValue::Uint(5))],
        );
        f.plugin
            .client
            .expect_method("ModifyReplicaSynchronization", Ok(MethodResult::new(0)));
        f.plugin.client.expect_method("ReturnToStoragePool", Ok(MethodResult::new(0)));

        let completion = f.plugin.volume_delete(&f.volume).await.unwrap();
        assert_eq!(completion, Completion::Done(()));
        assert_eq!(
            f.plugin.client.invoked_methods(),
            vec!["ModifyReplicaSynchronization", "ReturnToStoragePool"]
        );
        let detach = &f.plugin.client.method_params("ModifyReplicaSynchronization")[0];
        assert_eq!(detach.get("Operation"), Some(&CimValue::Uint(8)));
    }

    #[tokio::test]
    async fn test_delete_leaves_clone_relationships_alone() {
        let f = fixture(Some(vec![10]));
        let target = f.plugin.client.add_instance(volume_inst("0003"));
        f.plugin.client.associate_with(
            "CIM_StorageSynchronized",
            ("SystemElement", &f.lun),
            ("SyncedElement", &target),
            vec![("SyncState", CimValue::Uint(6)), ("CopyType", CimValue::Uint(4))],
        );
        f.plugin.client.expect_method("ReturnToStoragePool", Ok(MethodResult::new(0)));

        f.plugin.volume_delete(&f.volume).await.unwrap();
        assert_eq!(f.plugin.client.invoked_methods(), vec!["ReturnToStoragePool"]);
    }

    #[tokio::test]
    async fn test_replicate_through_replication_service() {
        let f = fixture(Some(vec![10, 11]));
        f.plugin
            .client
            .expect_method("CreateElementReplica", Ok(MethodResult::new(0)));

        let completion = f
            .plugin
            .volume_replicate(Some(&f.pool), ReplicationType::Copy, &f.volume, "copy-1")
            .await
            .unwrap();
        assert_eq!(completion, Completion::Done(None));
        let params = &f.plugin.client.method_params("CreateElementReplica")[0];
        assert_eq!(params.get("SyncType"), Some(&CimValue::Uint(8)));
        assert_eq!(params.get("WaitForCopyState"), Some(&CimValue::Uint(4)));
        assert!(params.contains_key("TargetPool"));
    }

    #[tokio::test]
    async fn test_replicate_falls_back_to_create_replica() {
        let f = fixture(None);
        f.plugin.client.expect_method("CreateReplica", Ok(MethodResult::new(0)));

        f.plugin
            .volume_replicate(None, ReplicationType::Clone, &f.volume, "clone-1")
            .await
            .unwrap();
        let params = &f.plugin.client.method_params("CreateReplica")[0];
        assert_eq!(params.get("CopyType"), Some(&CimValue::Uint(4)));
        assert!(!params.contains_key("TargetPool"));
    }

    #[tokio::test]
    async fn test_mirrors_are_not_supported() {
        let f = fixture(Some(vec![2, 3]));
        let err = f
            .plugin
            .volume_replicate(None, ReplicationType::MirrorSync, &f.volume, "m")
            .await
            .unwrap_err();
        assert!(matches!(err, SmisError::NoSupport(ref m) if m == "Mirroring not supported"));
    }
}
