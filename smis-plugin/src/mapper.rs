//! CIM instance to domain entity mapping.
//!
//! Everything here is pure: callers fetch the instances (with the
//! properties listed next to each mapper) and supply ids recovered through
//! associations.

use cim_core::CimInstance;

use crate::dmtf::{disk, masking, op_status, volume};
use crate::error::Result;
use crate::ids::{derive_id, EntityKind};
use crate::quirks::{self, Quirk};
use crate::types::{
    AccessGroup, Disk, DiskStatus, DiskType, ElementType, Initiator, InitiatorType, Pool,
    PoolStatus, System, SystemStatus, Volume, VolumeStatus, SIZE_NOT_FOUND,
};

pub const SYSTEM_PROPERTIES: &[&str] = &["Name", "ElementName", "OperationalStatus"];

pub const POOL_PROPERTIES: &[&str] = &[
    "InstanceID",
    "ElementName",
    "TotalManagedSpace",
    "RemainingManagedSpace",
    "Usage",
    "OperationalStatus",
    "Primordial",
];

pub const VOLUME_PROPERTIES: &[&str] = &[
    "SystemName",
    "DeviceID",
    "OperationalStatus",
    "ElementName",
    "NameFormat",
    "NameNamespace",
    "BlockSize",
    "NumberOfBlocks",
    "Name",
    "OtherIdentifyingInfo",
    "IdentifyingDescriptions",
    "Usage",
];

pub const DISK_PROPERTIES: &[&str] = &[
    "SystemName",
    "DeviceID",
    "OperationalStatus",
    "Name",
    "Caption",
    "InterconnectType",
    "DiskType",
];

pub const ACCESS_GROUP_PROPERTIES: &[&str] = &[
    "DeviceID",
    "SystemName",
    "ElementName",
    "StorageID",
    quirks::EMC_ADAPTER_ROLE,
];

pub const INITIATOR_PROPERTIES: &[&str] = &["StorageID", "IDType"];

/// Appends `info` to a comma separated status description.
fn append_info(status_info: &mut String, info: &str) {
    if !status_info.is_empty() {
        status_info.push(',');
    }
    status_info.push_str(info);
}

// ============================================================================
// Status tables
// ============================================================================

pub fn system_status_of(codes: &[u64]) -> SystemStatus {
    let mut status = SystemStatus::UNKNOWN;
    for code in codes {
        match *code {
            op_status::OK => status.insert(SystemStatus::OK),
            op_status::DEGRADED => status.insert(SystemStatus::DEGRADED),
            op_status::ERROR | op_status::STRESSED | op_status::NON_RECOVERABLE_ERROR => {
                status.insert(SystemStatus::ERROR)
            }
            op_status::PREDICTIVE_FAILURE => status.insert(SystemStatus::PREDICTIVE_FAILURE),
            _ => {}
        }
    }
    status
}

pub fn volume_status_of(codes: &[u64]) -> VolumeStatus {
    let mut status = VolumeStatus::UNKNOWN;
    for code in codes {
        match *code {
            op_status::OK => status.insert(VolumeStatus::OK),
            op_status::DEGRADED => status.insert(VolumeStatus::DEGRADED),
            op_status::ERROR => status.insert(VolumeStatus::ERR),
            op_status::STARTING => status.insert(VolumeStatus::STARTING),
            op_status::DORMANT => status.insert(VolumeStatus::DORMANT),
            _ => {}
        }
    }
    status
}

pub fn pool_status_of(codes: &[u64]) -> (PoolStatus, String) {
    let mut status = PoolStatus::UNKNOWN;
    let mut info = String::new();
    for code in codes {
        let bit = match *code {
            op_status::OTHER
            | op_status::PREDICTIVE_FAILURE
            | op_status::IN_SERVICE
            | op_status::NO_CONTACT
            | op_status::LOST_COMMUNICATION
            | op_status::SUPPORTING_ENTITY_IN_ERROR
            | op_status::COMPLETED
            | op_status::POWER_MODE => PoolStatus::OTHER,
            op_status::OK => PoolStatus::OK,
            op_status::DEGRADED => PoolStatus::DEGRADED,
            op_status::STRESSED => PoolStatus::STRESSED,
            op_status::ERROR | op_status::NON_RECOVERABLE_ERROR => PoolStatus::ERROR,
            op_status::STARTING => PoolStatus::STARTING,
            op_status::STOPPING => PoolStatus::STOPPING,
            op_status::STOPPED => PoolStatus::STOPPED,
            op_status::DORMANT => PoolStatus::DORMANT,
            _ => PoolStatus::UNKNOWN,
        };
        status.insert(bit);

        let text = match *code {
            op_status::PREDICTIVE_FAILURE => Some("Predictive failure"),
            op_status::IN_SERVICE => Some("In service"),
            op_status::NO_CONTACT => Some("No contact"),
            op_status::LOST_COMMUNICATION => Some("Lost communication"),
            op_status::SUPPORTING_ENTITY_IN_ERROR => Some("Supporting entity in error"),
            op_status::COMPLETED => Some("Completed"),
            op_status::POWER_MODE => Some("Power mode"),
            _ => None,
        };
        if let Some(text) = text {
            append_info(&mut info, text);
        }
    }
    (status, info)
}

pub fn disk_status_of(codes: &[u64]) -> (DiskStatus, String) {
    let mut status = DiskStatus::UNKNOWN;
    let mut info = String::new();
    for code in codes {
        let bit = match *code {
            op_status::OTHER
            | op_status::DEGRADED
            | op_status::STRESSED
            | op_status::IN_SERVICE
            | op_status::NO_CONTACT
            | op_status::LOST_COMMUNICATION
            | op_status::SUPPORTING_ENTITY_IN_ERROR
            | op_status::COMPLETED
            | op_status::POWER_MODE => DiskStatus::OTHER,
            op_status::OK => DiskStatus::OK,
            op_status::PREDICTIVE_FAILURE => DiskStatus::PREDICTIVE_FAILURE,
            op_status::ERROR | op_status::NON_RECOVERABLE_ERROR => DiskStatus::ERROR,
            op_status::STARTING => DiskStatus::STARTING,
            op_status::STOPPING => DiskStatus::STOPPING,
            op_status::STOPPED => DiskStatus::STOPPED,
            op_status::DORMANT => DiskStatus::OFFLINE,
            _ => DiskStatus::UNKNOWN,
        };
        status.insert(bit);

        let text = match *code {
            op_status::DORMANT => Some("Dormant"),
            op_status::IN_SERVICE => Some("In service"),
            op_status::NO_CONTACT => Some("No contact"),
            op_status::LOST_COMMUNICATION => Some("Lost communication"),
            op_status::SUPPORTING_ENTITY_IN_ERROR => Some("Supporting entity in error"),
            op_status::COMPLETED => Some("Completed"),
            op_status::POWER_MODE => Some("Power mode"),
            _ => None,
        };
        if let Some(text) = text {
            append_info(&mut info, text);
        }
    }
    (status, info)
}

// ============================================================================
// Systems and pools
// ============================================================================

pub fn map_system(inst: &CimInstance) -> Result<System> {
    Ok(System {
        id: derive_id(EntityKind::System, inst)?,
        name: inst.str_prop("ElementName").unwrap_or_default().to_string(),
        status: system_status_of(&inst.u64_array("OperationalStatus")),
        status_info: String::new(),
    })
}

/// `element_type` comes from an association walk done by the caller.
pub fn map_pool(inst: &CimInstance, system_id: &str, element_type: ElementType) -> Result<Pool> {
    let (status, status_info) = pool_status_of(&inst.u64_array("OperationalStatus"));
    Ok(Pool {
        id: derive_id(EntityKind::Pool, inst)?,
        name: inst.str_prop("ElementName").unwrap_or_default().to_string(),
        element_type,
        total_space: inst.u64_prop("TotalManagedSpace"),
        free_space: inst.u64_prop("RemainingManagedSpace"),
        status,
        status_info,
        system_id: system_id.to_string(),
    })
}

// ============================================================================
// Volumes
// ============================================================================

/// `Name` holds the VPD 0x83 identifier only for these
/// (NameFormat, NameNamespace) combinations.
const VPD83_NAME_FORMATS: &[(u64, u64)] = &[
    (volume::NAME_FORMAT_NAA, volume::NAME_SPACE_VPD83_TYPE3),
    (volume::NAME_FORMAT_NAA, volume::NAME_SPACE_OTHER),
    (volume::NAME_FORMAT_EUI64, volume::NAME_SPACE_VPD83_TYPE2),
    (volume::NAME_FORMAT_T10VID, volume::NAME_SPACE_VPD83_TYPE1),
];

/// Placeholder some providers put in identifier fields.
const VPD83_PLACEHOLDER: &str = "VPD83Type3";

fn accept_vpd83(value: &str) -> Option<String> {
    if value.is_empty() || value == VPD83_PLACEHOLDER {
        None
    } else {
        Some(value.to_string())
    }
}

fn vpd83_in_name(inst: &CimInstance) -> Option<String> {
    let format = inst.u64_prop("NameFormat")?;
    let namespace = inst.u64_prop("NameNamespace")?;
    if VPD83_NAME_FORMATS.contains(&(format, namespace)) {
        inst.str_prop("Name").and_then(accept_vpd83)
    } else {
        None
    }
}

fn vpd83_in_other_info(inst: &CimInstance) -> Option<String> {
    let infos = inst.string_array("OtherIdentifyingInfo");
    let descriptions = inst.string_array("IdentifyingDescriptions");
    descriptions
        .iter()
        .zip(infos.iter())
        .find(|(desc, _)| volume::VPD83_DESCRIPTIONS.contains(&desc.as_str()))
        .and_then(|(_, info)| accept_vpd83(info))
}

fn vpd83_by_vendor_rule(inst: &CimInstance) -> Option<String> {
    if quirks::has_quirk(inst.classname(), Quirk::Vpd83InName) {
        inst.str_prop("Name").and_then(accept_vpd83)
    } else {
        None
    }
}

/// SCSI VPD 0x83 identifier of a volume, or an empty string.
pub fn vpd83_of(inst: &CimInstance) -> String {
    vpd83_in_name(inst)
        .or_else(|| vpd83_in_other_info(inst))
        .or_else(|| vpd83_by_vendor_rule(inst))
        .unwrap_or_default()
}

/// Volumes the array keeps for itself.
pub fn is_system_reserved_volume(inst: &CimInstance) -> bool {
    inst.u64_prop("Usage") == Some(volume::USAGE_SYSTEM_RESERVED)
}

pub fn map_volume(inst: &CimInstance, pool_id: &str, system_id: Option<&str>) -> Result<Volume> {
    let name = inst
        .str_prop("ElementName")
        .or_else(|| inst.str_prop("DeviceID"))
        .unwrap_or_default();
    let system_id = match system_id {
        Some(id) => id.to_string(),
        None => derive_id(EntityKind::SystemChild, inst)?,
    };
    Ok(Volume {
        id: derive_id(EntityKind::Volume, inst)?,
        name: name.to_string(),
        vpd83: vpd83_of(inst),
        block_size: inst.u64_prop("BlockSize").unwrap_or(SIZE_NOT_FOUND),
        num_of_blocks: inst.u64_prop("NumberOfBlocks").unwrap_or(SIZE_NOT_FOUND),
        status: volume_status_of(&inst.u64_array("OperationalStatus")),
        system_id,
        pool_id: pool_id.to_string(),
    })
}

// ============================================================================
// Disks
// ============================================================================

fn interconnect_disk_type(code: u64) -> DiskType {
    match code {
        disk::INTERCONNECT_OTHER => DiskType::Other,
        disk::INTERCONNECT_ATA => DiskType::Ata,
        disk::INTERCONNECT_SATA => DiskType::Sata,
        disk::INTERCONNECT_SAS => DiskType::Sas,
        disk::INTERCONNECT_FC => DiskType::Fc,
        disk::INTERCONNECT_SOP => DiskType::Sop,
        disk::INTERCONNECT_SCSI => DiskType::Scsi,
        _ => DiskType::Unknown,
    }
}

fn dmtf_disk_type(code: u64) -> DiskType {
    match code {
        disk::TYPE_OTHER => DiskType::Other,
        disk::TYPE_HDD => DiskType::Hdd,
        disk::TYPE_SSD => DiskType::Ssd,
        disk::TYPE_HYBRID => DiskType::Hybrid,
        _ => DiskType::Unknown,
    }
}

/// Disk type from the drive's own properties.
///
/// `InterconnectType` (DMTF 2.31) wins, with the EMC `NL_SAS` caption
/// refining it; `DiskType` is consulted only when that yields nothing.
pub fn disk_type_of(inst: &CimInstance) -> DiskType {
    let mut disk_type = DiskType::Unknown;
    if let Some(code) = inst.u64_prop("InterconnectType") {
        disk_type = interconnect_disk_type(code);
        if inst.str_prop("Caption") == Some(quirks::NL_SAS_CAPTION) {
            disk_type = DiskType::NlSas;
        }
    }
    if disk_type == DiskType::Unknown {
        if let Some(code) = inst.u64_prop("DiskType") {
            disk_type = dmtf_disk_type(code);
        }
    }
    disk_type
}

/// Disk type told by the class of an attached protocol endpoint (LSI).
pub fn disk_type_of_endpoint_class(creation_class: &str) -> DiskType {
    match creation_class {
        quirks::LSI_SATA_ENDPOINT => DiskType::Sata,
        quirks::LSI_SAS_ENDPOINT => DiskType::Sas,
        _ => DiskType::Unknown,
    }
}

/// Disk built from the drive and its primordial extent.
pub fn map_disk(inst: &CimInstance, extent: &CimInstance, disk_type: DiskType) -> Result<Disk> {
    let (status, status_info) = disk_status_of(&inst.u64_array("OperationalStatus"));
    Ok(Disk {
        id: derive_id(EntityKind::Disk, inst)?,
        name: inst.str_prop("Name").unwrap_or_default().to_string(),
        disk_type,
        block_size: extent.u64_prop("BlockSize").unwrap_or(SIZE_NOT_FOUND),
        num_of_blocks: extent.u64_prop("NumberOfBlocks").unwrap_or(SIZE_NOT_FOUND),
        status,
        status_info,
        system_id: derive_id(EntityKind::SystemChild, inst)?,
    })
}

// ============================================================================
// Masking
// ============================================================================

pub fn initiator_type_of_id_type(id_type: Option<u64>) -> InitiatorType {
    match id_type {
        Some(masking::ID_TYPE_OTHER) | Some(masking::ID_TYPE_SW_WWN) => InitiatorType::Other,
        Some(masking::ID_TYPE_WWPN) => InitiatorType::Wwpn,
        Some(masking::ID_TYPE_WWNN) => InitiatorType::Wwnn,
        Some(masking::ID_TYPE_HOSTNAME) => InitiatorType::Hostname,
        Some(masking::ID_TYPE_ISCSI) => InitiatorType::Iscsi,
        Some(masking::ID_TYPE_SAS) => InitiatorType::Sas,
        _ => InitiatorType::Unknown,
    }
}

/// `IDType` to use when creating a hardware id of `init_type`.
pub fn id_type_of_initiator_type(init_type: InitiatorType) -> Option<u64> {
    match init_type {
        InitiatorType::Other => Some(masking::ID_TYPE_OTHER),
        InitiatorType::Wwpn => Some(masking::ID_TYPE_WWPN),
        InitiatorType::Wwnn => Some(masking::ID_TYPE_WWNN),
        InitiatorType::Hostname => Some(masking::ID_TYPE_HOSTNAME),
        InitiatorType::Iscsi => Some(masking::ID_TYPE_ISCSI),
        InitiatorType::Sas => Some(masking::ID_TYPE_SAS),
        InitiatorType::Unknown | InitiatorType::IscsiWwpnMixed => None,
    }
}

pub fn map_initiator(inst: &CimInstance) -> Result<Initiator> {
    Ok(Initiator {
        id: derive_id(EntityKind::Initiator, inst)?,
        init_type: initiator_type_of_id_type(inst.u64_prop("IDType")),
    })
}

/// Initiator type of a whole access group.
pub fn access_group_init_type(types: &[InitiatorType]) -> InitiatorType {
    let mut distinct: Vec<InitiatorType> = Vec::new();
    for t in types {
        if !distinct.contains(t) {
            distinct.push(*t);
        }
    }
    match distinct.as_slice() {
        [] => InitiatorType::Unknown,
        [single] => *single,
        [a, b]
            if (*a == InitiatorType::Iscsi && *b == InitiatorType::Wwpn)
                || (*a == InitiatorType::Wwpn && *b == InitiatorType::Iscsi) =>
        {
            InitiatorType::IscsiWwpnMixed
        }
        _ => InitiatorType::Other,
    }
}

pub fn map_access_group(inst: &CimInstance, initiators: &[Initiator], system_id: &str) -> Result<AccessGroup> {
    let types: Vec<InitiatorType> = initiators.iter().map(|i| i.init_type).collect();
    Ok(AccessGroup {
        id: derive_id(EntityKind::AccessGroup, inst)?,
        name: inst.str_prop("ElementName").unwrap_or_default().to_string(),
        init_ids: initiators.iter().map(|i| i.id.clone()).collect(),
        init_type: access_group_init_type(&types),
        system_id: system_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_core::{CimInstanceName, CimValue};

    fn volume_inst(class: &str) -> CimInstance {
        CimInstance::new(
            CimInstanceName::new(class)
                .with_key("DeviceID", "00A1")
                .with_key("SystemName", "ARRAY"),
        )
        .with("DeviceID", "00A1")
        .with("SystemName", "ARRAY")
        .with("BlockSize", 512u64)
        .with("NumberOfBlocks", 2048u64)
    }

    fn strings(items: &[&str]) -> CimValue {
        CimValue::Array(items.iter().map(|s| CimValue::from(*s)).collect())
    }

    #[test]
    fn test_vpd83_name_has_priority() {
        let inst = volume_inst("CIM_StorageVolume")
            .with("Name", "600601601234")
            .with("NameFormat", 9u16)
            .with("NameNamespace", 2u16)
            .with("OtherIdentifyingInfo", strings(&["6006016099999"]))
            .with("IdentifyingDescriptions", strings(&["NAA;VPD83Type3"]));
        assert_eq!(vpd83_of(&inst), "600601601234");
    }

    #[test]
    fn test_vpd83_other_identifying_info() {
        let inst = volume_inst("CIM_StorageVolume")
            .with("Name", "LUN 1")
            .with("NameFormat", 1u16)
            .with("NameNamespace", 1u16)
            .with("OtherIdentifyingInfo", strings(&["serial-1", "60a98000abcd"]))
            .with("IdentifyingDescriptions", strings(&["SNVM", "NAA;VPD83Type3"]));
        assert_eq!(vpd83_of(&inst), "60a98000abcd");
    }

    #[test]
    fn test_vpd83_vendor_rule_and_placeholder() {
        let xiv = volume_inst("IBMTSDS_SEVolume").with("Name", "0017380000691");
        assert_eq!(vpd83_of(&xiv), "0017380000691");

        let generic = volume_inst("CIM_StorageVolume").with("Name", "0017380000691");
        assert_eq!(vpd83_of(&generic), "");

        let placeholder = volume_inst("CIM_StorageVolume")
            .with("OtherIdentifyingInfo", strings(&["VPD83Type3"]))
            .with("IdentifyingDescriptions", strings(&["NAA;VPD83Type3"]));
        assert_eq!(vpd83_of(&placeholder), "");
    }

    #[test]
    fn test_map_volume_falls_back_to_device_id() {
        let inst = volume_inst("CIM_StorageVolume").with("OperationalStatus", vec![2u16, 3u16]);
        let vol = map_volume(&inst, "POOL-1", None).unwrap();
        assert_eq!(vol.name, "00A1");
        assert_eq!(vol.system_id, "ARRAY");
        assert_eq!(vol.pool_id, "POOL-1");
        assert_eq!(vol.status, VolumeStatus::OK | VolumeStatus::DEGRADED);
        assert_eq!(vol.size_bytes(), 512 * 2048);
    }

    #[test]
    fn test_unreported_sizes_use_sentinel() {
        let inst = CimInstance::new(
            CimInstanceName::new("CIM_StorageVolume")
                .with_key("DeviceID", "00B2")
                .with_key("SystemName", "ARRAY"),
        )
        .with("DeviceID", "00B2")
        .with("SystemName", "ARRAY");
        let vol = map_volume(&inst, "POOL-1", None).unwrap();
        assert_eq!(vol.block_size, SIZE_NOT_FOUND);
        assert_eq!(vol.num_of_blocks, SIZE_NOT_FOUND);

        let drive = CimInstance::new(
            CimInstanceName::new("CIM_DiskDrive")
                .with_key("DeviceID", "D9")
                .with_key("SystemName", "ARRAY"),
        )
        .with("DeviceID", "D9")
        .with("SystemName", "ARRAY");
        let extent = CimInstance::new(CimInstanceName::new("CIM_StorageExtent").with_key("DeviceID", "E9"))
            .with("BlockSize", 512u64);
        let disk = map_disk(&drive, &extent, DiskType::Unknown).unwrap();
        assert_eq!(disk.block_size, 512);
        assert_eq!(disk.num_of_blocks, SIZE_NOT_FOUND);
    }

    #[test]
    fn test_pool_status_table() {
        let (status, info) = pool_status_of(&[2, 5, 12]);
        assert!(status.contains(PoolStatus::OK));
        assert!(status.contains(PoolStatus::OTHER));
        assert_eq!(info, "Predictive failure,No contact");

        let (status, info) = pool_status_of(&[]);
        assert!(status.is_unknown());
        assert!(info.is_empty());
    }

    #[test]
    fn test_disk_status_table() {
        let (status, info) = disk_status_of(&[15]);
        assert_eq!(status, DiskStatus::OFFLINE);
        assert_eq!(info, "Dormant");
        let (status, _) = disk_status_of(&[3, 5]);
        assert_eq!(status, DiskStatus::OTHER | DiskStatus::PREDICTIVE_FAILURE);
    }

    #[test]
    fn test_system_status_table() {
        assert_eq!(system_status_of(&[4]), SystemStatus::ERROR);
        assert_eq!(system_status_of(&[2, 5]), SystemStatus::OK | SystemStatus::PREDICTIVE_FAILURE);
        assert!(system_status_of(&[11]).is_unknown());
    }

    #[test]
    fn test_disk_type_resolution() {
        let base = CimInstance::new(CimInstanceName::new("EMC_DiskDrive"));
        assert_eq!(disk_type_of(&base.clone().with("InterconnectType", 5u16)), DiskType::Sas);
        assert_eq!(
            disk_type_of(&base.clone().with("InterconnectType", 5u16).with("Caption", "NL_SAS")),
            DiskType::NlSas
        );
        assert_eq!(
            disk_type_of(&base.clone().with("InterconnectType", 0u16).with("DiskType", 3u16)),
            DiskType::Ssd
        );
        assert_eq!(disk_type_of(&base), DiskType::Unknown);
        assert_eq!(
            disk_type_of_endpoint_class("LSIESG_TargetSATAProtocolEndpoint"),
            DiskType::Sata
        );
    }

    #[test]
    fn test_access_group_init_type() {
        use InitiatorType::*;
        assert_eq!(access_group_init_type(&[]), Unknown);
        assert_eq!(access_group_init_type(&[Wwpn, Wwpn]), Wwpn);
        assert_eq!(access_group_init_type(&[Iscsi, Wwpn, Iscsi]), IscsiWwpnMixed);
        assert_eq!(access_group_init_type(&[Iscsi, Sas]), Other);
        assert_eq!(access_group_init_type(&[Iscsi, Wwpn, Sas]), Other);
    }

    #[test]
    fn test_initiator_type_mapping() {
        assert_eq!(initiator_type_of_id_type(Some(6)), InitiatorType::Other);
        assert_eq!(initiator_type_of_id_type(None), InitiatorType::Unknown);
        assert_eq!(id_type_of_initiator_type(InitiatorType::Iscsi), Some(5));
        assert_eq!(id_type_of_initiator_type(InitiatorType::IscsiWwpnMixed), None);
    }
}
