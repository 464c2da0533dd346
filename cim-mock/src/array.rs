//! Canned SMI-S object graph for a block array.

use cim_core::{CimInstance, CimInstanceName, CimValue, MethodResult};

use crate::repository::MockWbem;

/// Namespace profile registrations are placed in.
pub const INTEROP_NAMESPACE: &str = "interop";

/// SNIA value of `CIM_RegisteredProfile.RegisteredOrganization`.
const SNIA: u16 = 11;

/// `CIM_ConcreteJob` method return code for "job started".
const METHOD_ASYNC: u32 = 4096;

const JOB_RUNNING: (u16, u16, &[u16]) = (2, 0, &[]);

/// Populates a [`MockWbem`] with one array: its computer system, storage
/// configuration service and whatever pools, volumes, services and jobs a
/// test adds.
///
/// Classes are named `<prefix>_<CIM class suffix>` so that the repository's
/// vendor subclass rule applies.
pub struct ArrayBuilder<'a> {
    mock: &'a MockWbem,
    prefix: String,
    name: String,
    system: CimInstanceName,
    configuration_service: CimInstanceName,
}

impl<'a> ArrayBuilder<'a> {
    pub fn new(mock: &'a MockWbem, prefix: &str, name: &str) -> Self {
        let class = |suffix: &str| format!("{}_{}", prefix, suffix);
        let system = mock.add_instance(
            CimInstance::new(
                CimInstanceName::new(class("ComputerSystem"))
                    .with_key("CreationClassName", class("ComputerSystem"))
                    .with_key("Name", name),
            )
            .with("Name", name)
            .with("ElementName", name)
            .with("OperationalStatus", CimValue::from(vec![2u16])),
        );
        let configuration_service = mock.add_instance(
            CimInstance::new(
                CimInstanceName::new(class("StorageConfigurationService"))
                    .with_key("SystemName", name)
                    .with_key("Name", "SCS"),
            )
            .with("SystemName", name)
            .with("Name", "SCS"),
        );
        mock.associate(
            "CIM_HostedService",
            ("Antecedent", &system),
            ("Dependent", &configuration_service),
        );
        Self {
            mock,
            prefix: prefix.to_string(),
            name: name.to_string(),
            system,
            configuration_service,
        }
    }

    fn class(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    pub fn system(&self) -> &CimInstanceName {
        &self.system
    }

    pub fn configuration_service(&self) -> &CimInstanceName {
        &self.configuration_service
    }

    /// Register SNIA profiles as `(name, version)` pairs. The system
    /// conforms to the `Array` registration.
    pub fn register_profiles(&self, profiles: &[(&str, &str)]) {
        for (name, version) in profiles {
            let path = self.mock.add_instance(
                CimInstance::new(
                    CimInstanceName::new("CIM_RegisteredProfile")
                        .with_namespace(INTEROP_NAMESPACE)
                        .with_key("InstanceID", format!("SNIA:{}:{}", name, version)),
                )
                .with("RegisteredName", *name)
                .with("RegisteredVersion", *version)
                .with("RegisteredOrganization", SNIA),
            );
            if *name == "Array" {
                self.mock.associate(
                    "CIM_ElementConformsToProfile",
                    ("ConformantStandard", &path),
                    ("ManagedElement", &self.system),
                );
            }
        }
    }

    /// Capabilities of the storage configuration service.
    pub fn configuration_capabilities(&self, element_types: &[u16], actions: &[u16], copy_types: &[u16]) {
        let caps = self.mock.add_instance(
            CimInstance::new(
                CimInstanceName::new(self.class("StorageConfigurationCapabilities"))
                    .with_key("InstanceID", format!("{}:SCC", self.name)),
            )
            .with("SupportedStorageElementTypes", CimValue::from(element_types.to_vec()))
            .with("SupportedAsynchronousActions", CimValue::from(actions.to_vec()))
            .with("SupportedCopyTypes", CimValue::from(copy_types.to_vec())),
        );
        self.mock.associate(
            "CIM_ElementCapabilities",
            ("ManagedElement", &self.configuration_service),
            ("Capabilities", &caps),
        );
    }

    /// A replication service advertising `replication_types`.
    pub fn replication_service(&self, replication_types: &[u16]) -> CimInstanceName {
        let service = self.mock.add_instance(
            CimInstance::new(
                CimInstanceName::new(self.class("ReplicationService"))
                    .with_key("SystemName", self.name.as_str())
                    .with_key("Name", "RS"),
            )
            .with("SystemName", self.name.as_str())
            .with("Name", "RS"),
        );
        self.mock.associate("CIM_HostedService", ("Antecedent", &self.system), ("Dependent", &service));
        let caps = self.mock.add_instance(
            CimInstance::new(
                CimInstanceName::new(self.class("ReplicationServiceCapabilities"))
                    .with_key("InstanceID", format!("{}:RSC", self.name)),
            )
            .with("SupportedReplicationTypes", CimValue::from(replication_types.to_vec())),
        );
        self.mock.associate(
            "CIM_ElementCapabilities",
            ("ManagedElement", &service),
            ("Capabilities", &caps),
        );
        service
    }

    /// A pool hosted by the system. `usage` follows `CIM_StoragePool.Usage`.
    pub fn pool(&self, id: &str, usage: u16, total: u64, free: u64) -> CimInstanceName {
        let pool = self.mock.add_instance(
            CimInstance::new(CimInstanceName::new(self.class("StoragePool")).with_key("InstanceID", id))
                .with("InstanceID", id)
                .with("ElementName", id)
                .with("TotalManagedSpace", total)
                .with("RemainingManagedSpace", free)
                .with("Usage", usage)
                .with("Primordial", false)
                .with("OperationalStatus", CimValue::from(vec![2u16])),
        );
        self.mock.associate(
            "CIM_HostedStoragePool",
            ("GroupComponent", &self.system),
            ("PartComponent", &pool),
        );
        pool
    }

    /// A 512-byte block volume allocated from `pool`.
    pub fn volume(&self, pool: &CimInstanceName, device_id: &str, blocks: u64) -> CimInstanceName {
        let volume = self.mock.add_instance(self.volume_instance(device_id, blocks));
        self.mock.associate(
            "CIM_AllocatedFromStoragePool",
            ("Antecedent", pool),
            ("Dependent", &volume),
        );
        volume
    }

    /// Volume instance as `pool` would hold it, not yet in the repository.
    pub fn volume_instance(&self, device_id: &str, blocks: u64) -> CimInstance {
        CimInstance::new(
            CimInstanceName::new(self.class("StorageVolume"))
                .with_key("SystemCreationClassName", self.class("ComputerSystem"))
                .with_key("SystemName", self.name.as_str())
                .with_key("DeviceID", device_id),
        )
        .with("SystemName", self.name.as_str())
        .with("DeviceID", device_id)
        .with("ElementName", device_id)
        .with("BlockSize", 512u64)
        .with("NumberOfBlocks", blocks)
        .with("Usage", 2u16)
        .with("OperationalStatus", CimValue::from(vec![2u16]))
    }

    /// `CIM_StorageSynchronized` between two volumes.
    pub fn synchronize(
        &self,
        source: &CimInstanceName,
        target: &CimInstanceName,
        sync_state: u16,
        copy_type: u16,
    ) -> CimInstanceName {
        self.mock.associate_with(
            "CIM_StorageSynchronized",
            ("SystemElement", source),
            ("SyncedElement", target),
            vec![
                ("SyncState", CimValue::from(sync_state)),
                ("CopyType", CimValue::from(copy_type)),
            ],
        )
    }

    /// A job the provider reports through `versions` on successive reads,
    /// as `(JobState, PercentComplete, OperationalStatus)`.
    pub fn job(&self, id: &str, versions: &[(u16, u16, &[u16])]) -> CimInstanceName {
        let job = |(state, percent, status): &(u16, u16, &[u16])| {
            CimInstance::new(CimInstanceName::new(self.class("ConcreteJob")).with_key("InstanceID", id))
                .with("InstanceID", id)
                .with("JobState", *state)
                .with("PercentComplete", *percent)
                .with("OperationalStatus", CimValue::from(status.to_vec()))
                .with("DeleteOnCompletion", false)
        };
        let path = self.mock.add_instance(job(versions.first().unwrap_or(&JOB_RUNNING)));
        self.mock.evolve(&path, versions.iter().map(job).collect());
        path
    }

    /// Link a job to the element it produced.
    pub fn affect(&self, job: &CimInstanceName, element: &CimInstanceName) {
        self.mock.associate(
            "CIM_AffectedJobElement",
            ("AffectingElement", job),
            ("AffectedElement", element),
        );
    }

    /// Script `method` to start `job` asynchronously.
    pub fn start_job(&self, method: &str, job: &CimInstanceName) {
        self.mock.expect_method(
            method,
            Ok(MethodResult::new(METHOD_ASYNC).with_out("Job", job.clone())),
        );
    }
}
