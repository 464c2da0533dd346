//! Vendor normalization rules.
//!
//! SMI-S providers deviate from the standard in small, well known ways.
//! Each deviation is a [`Quirk`] attached to the CIM class that exhibits it,
//! so the mapping and traversal code can ask "does this class need special
//! handling" instead of comparing class names inline.

use cim_core::CimInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    /// VPD page 0x83 identifier stored in `Name` without a matching NameFormat
    Vpd83InName,
    /// Pool never reported to callers
    HiddenPool,
    /// Pool can hold volumes although no capabilities are associated
    VolumeElementWithoutCapabilities,
    /// Pool can hold pools although no capabilities are associated
    PoolElementWithoutCapabilities,
    /// Pool is thick although no capabilities are associated
    ThickWithoutCapabilities,
    /// Pool is built from disks directly; skip the parent-pool lookup
    DiskPool,
    /// Composite extents linked through `CIM_ConcreteComponent`
    LegacyExtentComposition,
    /// Extent walk is prohibitively expensive; skip member discovery
    SkipExtentWalk,
    /// Disk type found through the attached protocol endpoint class
    DiskTypeFromProtocolEndpoint,
    /// SCSI protocol controller used for mapping only, never an iSCSI node
    NotIscsiNode,
    /// Thick pool goals must not carry `ElementName`; goals with in-pools
    /// are rejected
    ThickGoalWithoutName,
    /// iSCSI target ports are reported once per binding; drop duplicates
    DuplicateIscsiPorts,
}

const RULES: &[(&str, &[Quirk])] = &[
    ("IBMTSDS_SEVolume", &[Quirk::Vpd83InName]),
    ("IBMTSDS_ArrayPool", &[Quirk::HiddenPool]),
    ("IBMTSDS_ArraySitePool", &[Quirk::HiddenPool]),
    ("IBMTSDS_VirtualPool", &[Quirk::VolumeElementWithoutCapabilities]),
    ("IBMTSDS_ExtentPool", &[Quirk::VolumeElementWithoutCapabilities]),
    (
        "IBMTSDS_RankPool",
        &[Quirk::PoolElementWithoutCapabilities, Quirk::DiskPool],
    ),
    (
        "LSIESG_StoragePool",
        &[
            Quirk::VolumeElementWithoutCapabilities,
            Quirk::ThickWithoutCapabilities,
            Quirk::DiskPool,
            Quirk::LegacyExtentComposition,
        ],
    ),
    ("LSIESG_DiskDrive", &[Quirk::DiskTypeFromProtocolEndpoint]),
    ("Clar_UnifiedStoragePool", &[Quirk::DiskPool]),
    ("ONTAP_ConcretePool", &[Quirk::DiskPool]),
    ("Symm_DeviceStoragePool", &[Quirk::SkipExtentWalk]),
    ("Clar_MappingSCSIProtocolController", &[Quirk::NotIscsiNode]),
    ("Clar_StorageSystem", &[Quirk::ThickGoalWithoutName]),
    ("ONTAP_StorageSystem", &[Quirk::DuplicateIscsiPorts]),
];

/// Registered profile names some providers use instead of the SNIA ones.
const PROFILE_ALIASES: &[(&str, &str)] = &[("FC Target Port", "FC Target Ports")];

/// EMC property tagging the role of a SCSI protocol controller
pub const EMC_ADAPTER_ROLE: &str = "EMCAdapterRole";
const EMC_MASKING_ROLE: &str = "MASK_VIEW";

/// EMC disks report nearline SAS only through the caption
pub const NL_SAS_CAPTION: &str = "NL_SAS";

/// LSI protocol endpoint classes telling the disk interconnect
pub const LSI_SATA_ENDPOINT: &str = "LSIESG_TargetSATAProtocolEndpoint";
pub const LSI_SAS_ENDPOINT: &str = "LSIESG_TargetSASProtocolEndpoint";

pub fn quirks_of(classname: &str) -> &'static [Quirk] {
    RULES
        .iter()
        .find(|(class, _)| *class == classname)
        .map(|(_, quirks)| *quirks)
        .unwrap_or(&[])
}

pub fn has_quirk(classname: &str, quirk: Quirk) -> bool {
    quirks_of(classname).contains(&quirk)
}

/// SNIA name for a registered profile name, resolving vendor aliases.
pub fn canonical_profile_name(name: &str) -> &str {
    PROFILE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

/// Whether a SCSI protocol controller is a masking view.
///
/// Controllers without `EMCAdapterRole` always are; EMC marks mapping-only
/// controllers with a role list lacking `MASK_VIEW`.
pub fn is_masking_controller(spc: &CimInstance) -> bool {
    match spc.str_prop(EMC_ADAPTER_ROLE) {
        Some(roles) => roles.split(' ').any(|r| r == EMC_MASKING_ROLE),
        None => true,
    }
}
