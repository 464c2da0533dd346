//! DMTF and SNIA value maps used by the adapter.
//!
//! Grouped by the CIM class and property they belong to.

/// SNIA registered organization code in `CIM_RegisteredProfile`
pub const SNIA_ORGANIZATION: u64 = 11;

/// Namespaces searched for `CIM_RegisteredProfile`, in order (DSP1033)
pub const INTEROP_NAMESPACES: &[&str] = &["interop", "root/interop"];

// ============================================================================
// CIM_ManagedSystemElement.OperationalStatus
// ============================================================================

pub mod op_status {
    pub const UNKNOWN: u64 = 0;
    pub const OTHER: u64 = 1;
    pub const OK: u64 = 2;
    pub const DEGRADED: u64 = 3;
    pub const STRESSED: u64 = 4;
    pub const PREDICTIVE_FAILURE: u64 = 5;
    pub const ERROR: u64 = 6;
    pub const NON_RECOVERABLE_ERROR: u64 = 7;
    pub const STARTING: u64 = 8;
    pub const STOPPING: u64 = 9;
    pub const STOPPED: u64 = 10;
    pub const IN_SERVICE: u64 = 11;
    pub const NO_CONTACT: u64 = 12;
    pub const LOST_COMMUNICATION: u64 = 13;
    pub const ABORTED: u64 = 14;
    pub const DORMANT: u64 = 15;
    pub const SUPPORTING_ENTITY_IN_ERROR: u64 = 16;
    pub const COMPLETED: u64 = 17;
    pub const POWER_MODE: u64 = 18;
}

// ============================================================================
// CIM_ConcreteJob
// ============================================================================

pub mod job_state {
    pub const NEW: u64 = 2;
    pub const STARTING: u64 = 3;
    pub const RUNNING: u64 = 4;
    pub const SUSPENDED: u64 = 5;
    pub const SHUTTING_DOWN: u64 = 6;
    pub const COMPLETED: u64 = 7;
    pub const TERMINATED: u64 = 8;
    pub const KILLED: u64 = 9;
    pub const EXCEPTION: u64 = 10;
}

/// Extrinsic method return values (SMI-S 1.5 Block, "Job control")
pub mod invoke {
    pub const OK: u32 = 0;
    pub const NOT_SUPPORTED: u32 = 1;
    pub const TIMEOUT: u32 = 3;
    pub const FAILED: u32 = 4;
    pub const INVALID_PARAMETER: u32 = 5;
    pub const IN_USE: u32 = 6;
    pub const ASYNC: u32 = 4096;
    pub const SIZE_NOT_SUPPORTED: u32 = 4097;
}

// ============================================================================
// CIM_StorageVolume
// ============================================================================

pub mod volume {
    /// `Usage` of volumes reserved by the array itself
    pub const USAGE_SYSTEM_RESERVED: u64 = 3;

    /// `NameFormat`
    pub const NAME_FORMAT_NAA: u64 = 9;
    pub const NAME_FORMAT_EUI64: u64 = 10;
    pub const NAME_FORMAT_T10VID: u64 = 11;

    /// `NameNamespace`
    pub const NAME_SPACE_OTHER: u64 = 1;
    pub const NAME_SPACE_VPD83_TYPE3: u64 = 2;
    pub const NAME_SPACE_VPD83_TYPE2: u64 = 3;
    pub const NAME_SPACE_VPD83_TYPE1: u64 = 4;

    /// `IdentifyingDescriptions` entries whose `OtherIdentifyingInfo`
    /// counterpart is a VPD page 0x83 identifier
    pub const VPD83_DESCRIPTIONS: &[&str] = &[
        "NAA;VPD83Type1",
        "NAA;VPD83Type3",
        "EUI64;VPD83Type2",
        "T10VID;VPD83Type1",
    ];

    /// `ElementType` for `CreateOrModifyElementFromStoragePool`
    pub const ELEMENT_TYPE_STORAGE_VOLUME: u64 = 2;
}

// ============================================================================
// CIM_StoragePool and capabilities
// ============================================================================

pub mod pool {
    pub const USAGE_UNRESTRICTED: u64 = 2;
    pub const USAGE_DELTA: u64 = 4;
    pub const USAGE_SPARE: u64 = 8;

    /// `SupportedStorageElementFeatures`: StorageVolume creation
    pub const FEATURE_VOLUME_CREATION: u64 = 3;

    /// `SupportedStorageElementTypes`
    pub const ELEMENT_THICK_VOLUME: u64 = 2;
    pub const ELEMENT_THIN_VOLUME: u64 = 5;

    /// `SupportedStoragePoolFeatures`
    pub const POOL_FEATURE_IN_EXTENTS: u64 = 2;
    pub const POOL_FEATURE_SINGLE_IN_POOL: u64 = 3;
    pub const POOL_FEATURE_MULTI_IN_POOL: u64 = 4;

    /// `CIM_StorageSetting.ThinProvisionedPoolType`
    pub const THINP_POOL_TYPE_ALLOCATED: u64 = 7;
    /// EMC value for a thick pool setting
    pub const EMC_THINP_POOL_TYPE_THICK: u64 = 0;

    /// `SupportedSynchronousActions` / `SupportedAsynchronousActions`
    pub const ACTION_VOLUME_CREATE: u64 = 5;
    pub const ACTION_VOLUME_DELETE: u64 = 6;
    pub const ACTION_VOLUME_MODIFY: u64 = 7;
}

// ============================================================================
// Replication
// ============================================================================

pub mod replication {
    /// `CIM_ReplicationServiceCapabilities.SupportedReplicationTypes`
    pub const SYNC_MIRROR_LOCAL: u64 = 2;
    pub const ASYNC_MIRROR_LOCAL: u64 = 3;
    pub const SYNC_SNAPSHOT_LOCAL: u64 = 6;
    pub const ASYNC_SNAPSHOT_LOCAL: u64 = 7;
    pub const SYNC_CLONE_LOCAL: u64 = 10;
    pub const ASYNC_CLONE_LOCAL: u64 = 11;

    /// `CreateElementReplica` `SyncType`
    pub const SYNC_TYPE_MIRROR: u64 = 6;
    pub const SYNC_TYPE_SNAPSHOT: u64 = 7;
    pub const SYNC_TYPE_CLONE: u64 = 8;

    /// `CreateReplica` `CopyType` and `CIM_StorageSynchronized.CopyType`
    pub const COPY_TYPE_ASYNC: u64 = 2;
    pub const COPY_TYPE_SYNC: u64 = 3;
    pub const COPY_TYPE_UNSYNC_ASSOC: u64 = 4;
    pub const COPY_TYPE_UNSYNC_UNASSOC: u64 = 5;

    /// `CopyState` requested through `WaitForCopyState`
    pub const COPY_STATE_SYNCHRONIZED: u64 = 4;

    /// `CIM_StorageSynchronized.SyncState`
    pub const SYNC_STATE_SYNCHRONIZED: u64 = 6;

    /// `ModifyReplicaSynchronization` `Operation`: detach
    pub const OPERATION_DETACH: u64 = 8;
}

// ============================================================================
// Disks
// ============================================================================

pub mod disk {
    /// `CIM_DiskDrive.DiskType`
    pub const TYPE_UNKNOWN: u64 = 0;
    pub const TYPE_OTHER: u64 = 1;
    pub const TYPE_HDD: u64 = 2;
    pub const TYPE_SSD: u64 = 3;
    pub const TYPE_HYBRID: u64 = 4;

    /// `CIM_DiskDrive.InterconnectType` (DMTF 2.31)
    pub const INTERCONNECT_OTHER: u64 = 1;
    pub const INTERCONNECT_ATA: u64 = 3;
    pub const INTERCONNECT_SATA: u64 = 4;
    pub const INTERCONNECT_SAS: u64 = 5;
    pub const INTERCONNECT_FC: u64 = 6;
    pub const INTERCONNECT_SOP: u64 = 7;
    pub const INTERCONNECT_SCSI: u64 = 8;
}

// ============================================================================
// Masking and mapping
// ============================================================================

pub mod masking {
    /// `CIM_StorageHardwareID.IDType`
    pub const ID_TYPE_OTHER: u64 = 1;
    pub const ID_TYPE_WWPN: u64 = 2;
    pub const ID_TYPE_WWNN: u64 = 3;
    pub const ID_TYPE_HOSTNAME: u64 = 4;
    pub const ID_TYPE_ISCSI: u64 = 5;
    pub const ID_TYPE_SW_WWN: u64 = 6;
    pub const ID_TYPE_SAS: u64 = 7;

    /// `ExposePaths` `DeviceAccesses`: read/write
    pub const DEVICE_ACCESS_READ_WRITE: u64 = 2;
}

// ============================================================================
// Target ports
// ============================================================================

pub mod port {
    /// `CIM_FCPort.UsageRestriction`
    pub const USAGE_FRONTEND_ONLY: u64 = 2;
    pub const USAGE_UNRESTRICTED: u64 = 4;
    /// `CIM_FCPort.PortDiscriminator`
    pub const DISCRIMINATOR_FCOE: u64 = 10;
    /// `CIM_NetworkPort.LinkTechnology`
    pub const LINK_TECH_ETHERNET: u64 = 2;
    /// `CIM_iSCSIProtocolEndpoint.Role`
    pub const ISCSI_ROLE_TARGET: u64 = 3;
    /// `CIM_SCSIProtocolController.NameFormat`
    pub const SPC_NAME_FORMAT_ISCSI: u64 = 3;
    /// `CIM_IPProtocolEndpoint.IPv6AddressType` values worth reporting
    pub const IPV6_ADDR_TYPE_GUA: u64 = 6;
    pub const IPV6_ADDR_TYPE_6TO4: u64 = 7;
    pub const IPV6_ADDR_TYPE_ULA: u64 = 8;
}
