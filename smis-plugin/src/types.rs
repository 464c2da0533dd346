//! Domain entities reported to callers.
//!
//! Every entity is a snapshot taken during one call; nothing here is cached
//! or kept in sync with the array.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmisError};

// ============================================================================
// Status bit-sets
// ============================================================================

macro_rules! status_flags {
    ($(#[$meta:meta])* $name:ident { $($flag:ident = $bit:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// No status bit known
            pub const UNKNOWN: $name = $name(0);
            $(pub const $flag: $name = $name(1 << $bit);)+

            pub fn bits(&self) -> u32 {
                self.0
            }

            pub fn contains(&self, other: $name) -> bool {
                other.0 != 0 && self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn is_unknown(&self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

status_flags!(
    /// Health of a storage system
    SystemStatus { OK = 1, DEGRADED = 2, ERROR = 3, PREDICTIVE_FAILURE = 4 }
);

status_flags!(
    /// Health of a storage pool
    PoolStatus {
        OTHER = 0,
        OK = 1,
        DEGRADED = 2,
        STRESSED = 3,
        ERROR = 4,
        STARTING = 5,
        STOPPING = 6,
        STOPPED = 7,
        DORMANT = 8,
        RECONSTRUCTING = 9,
        VERIFYING = 10,
        INITIALIZING = 11,
        GROWING = 12,
    }
);

status_flags!(
    /// Health of a volume
    VolumeStatus { OK = 1, DEGRADED = 2, ERR = 3, STARTING = 4, DORMANT = 5 }
);

status_flags!(
    /// Health of a physical disk
    DiskStatus {
        OTHER = 0,
        OK = 1,
        PREDICTIVE_FAILURE = 2,
        ERROR = 3,
        OFFLINE = 4,
        STARTING = 5,
        STOPPING = 6,
        STOPPED = 7,
        INITIALIZING = 8,
        MAINTENANCE_MODE = 9,
    }
);

status_flags!(
    /// What a pool can hold
    ElementType { VOLUME = 0, POOL = 1, DELTA = 2 }
);

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RaidType {
    Unknown,
    Jbod,
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
    Raid50,
    Raid60,
    Raid51,
    Raid61,
    /// Extents of one pool disagree on their layout
    Mixed,
    Other,
}

impl RaidType {
    /// `CIM_StorageSetting.ElementName` values providers use for this layout.
    pub fn setting_names(&self) -> &'static [&'static str] {
        match self {
            RaidType::Jbod => &["JBOD"],
            RaidType::Raid0 => &["RAID0"],
            RaidType::Raid1 => &["RAID1"],
            RaidType::Raid5 => &["RAID5"],
            RaidType::Raid6 => &["RAID6", "RAID5DP"],
            RaidType::Raid10 => &["RAID10", "RAID1+0"],
            RaidType::Raid50 => &["RAID50", "RAID5+0"],
            RaidType::Raid60 => &["RAID60", "RAID6+0", "RAID5DP+0"],
            RaidType::Raid51 => &["RAID51", "RAID5+1"],
            RaidType::Raid61 => &["RAID61", "RAID6+1", "RAID5DP+1"],
            RaidType::Unknown | RaidType::Mixed | RaidType::Other => &[],
        }
    }
}

impl Display for RaidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RaidType::Unknown => "UNKNOWN",
            RaidType::Jbod => "JBOD",
            RaidType::Raid0 => "RAID0",
            RaidType::Raid1 => "RAID1",
            RaidType::Raid5 => "RAID5",
            RaidType::Raid6 => "RAID6",
            RaidType::Raid10 => "RAID10",
            RaidType::Raid50 => "RAID50",
            RaidType::Raid60 => "RAID60",
            RaidType::Raid51 => "RAID51",
            RaidType::Raid61 => "RAID61",
            RaidType::Mixed => "MIXED",
            RaidType::Other => "OTHER",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberType {
    Unknown,
    Disk,
    Pool,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThinpType {
    Unknown,
    Thin,
    Thick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiskType {
    Unknown,
    Other,
    Ata,
    Sata,
    Sas,
    Fc,
    Sop,
    Scsi,
    NlSas,
    Hdd,
    Ssd,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitiatorType {
    Unknown,
    Other,
    Wwpn,
    Wwnn,
    Hostname,
    Iscsi,
    Sas,
    /// Access group holding both iSCSI and WWPN initiators
    IscsiWwpnMixed,
}

impl Display for InitiatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InitiatorType::Unknown => "UNKNOWN",
            InitiatorType::Other => "OTHER",
            InitiatorType::Wwpn => "WWPN",
            InitiatorType::Wwnn => "WWNN",
            InitiatorType::Hostname => "HOSTNAME",
            InitiatorType::Iscsi => "ISCSI",
            InitiatorType::Sas => "SAS",
            InitiatorType::IscsiWwpnMixed => "ISCSI_WWPN_MIXED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortType {
    Fc,
    Fcoe,
    Iscsi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationType {
    /// Point-in-time copy sharing blocks with its source
    Clone,
    /// Full, independent copy
    Copy,
    Snapshot,
    MirrorSync,
    MirrorAsync,
}

impl FromStr for ReplicationType {
    type Err = SmisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "CLONE" => Ok(ReplicationType::Clone),
            "COPY" => Ok(ReplicationType::Copy),
            "SNAPSHOT" => Ok(ReplicationType::Snapshot),
            "MIRROR_SYNC" => Ok(ReplicationType::MirrorSync),
            "MIRROR_ASYNC" => Ok(ReplicationType::MirrorAsync),
            _ => Err(SmisError::InvalidArgument(format!(
                "unknown replication type '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provisioning {
    #[default]
    Default,
    Thin,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Complete,
    Error,
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: String,
    pub status: SystemStatus,
    pub status_info: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub element_type: ElementType,
    /// `None` when the provider does not report it
    pub total_space: Option<u64>,
    pub free_space: Option<u64>,
    pub status: PoolStatus,
    pub status_info: String,
    pub system_id: String,
}

/// Extended pool attributes, computed on request since they need a walk
/// through the extent graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDetails {
    pub raid_type: RaidType,
    pub member_type: MemberType,
    pub member_ids: Vec<String>,
    pub thinp_type: ThinpType,
}

impl Default for PoolDetails {
    fn default() -> Self {
        Self {
            raid_type: RaidType::Unknown,
            member_type: MemberType::Unknown,
            member_ids: Vec::new(),
            thinp_type: ThinpType::Unknown,
        }
    }
}

/// Block size or block count of a volume or disk whose provider does not
/// report it.
pub const SIZE_NOT_FOUND: u64 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    /// SCSI VPD page 0x83 identifier, empty when the provider has none
    pub vpd83: String,
    /// [`SIZE_NOT_FOUND`] when unreported, as is `num_of_blocks`
    pub block_size: u64,
    pub num_of_blocks: u64,
    pub status: VolumeStatus,
    pub system_id: String,
    pub pool_id: String,
}

impl Volume {
    pub fn size_bytes(&self) -> u64 {
        self.block_size.saturating_mul(self.num_of_blocks)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    pub id: String,
    pub name: String,
    pub disk_type: DiskType,
    pub block_size: u64,
    pub num_of_blocks: u64,
    pub status: DiskStatus,
    pub status_info: String,
    pub system_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessGroup {
    pub id: String,
    pub name: String,
    pub init_ids: Vec<String>,
    pub init_type: InitiatorType,
    pub system_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initiator {
    pub id: String,
    pub init_type: InitiatorType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPort {
    pub id: String,
    pub port_type: PortType,
    /// WWPN or iSCSI node name
    pub service_address: String,
    /// WWPN or `ip:port`
    pub network_address: String,
    /// WWPN or NIC MAC address
    pub physical_address: String,
    pub physical_name: String,
    pub system_id: String,
}

/// Parameters of a pool creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolCreateRequest {
    pub system_id: String,
    pub name: Option<String>,
    pub size_bytes: u64,
    pub raid_type: RaidType,
    pub member_type: MemberType,
    /// Only meaningful for disk members
    pub disk_type: Option<DiskType>,
}

// ============================================================================
// Search filtering
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKey {
    Id,
    SystemId,
    PoolId,
}

impl Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchKey::Id => write!(f, "id"),
            SearchKey::SystemId => write!(f, "system_id"),
            SearchKey::PoolId => write!(f, "pool_id"),
        }
    }
}

impl FromStr for SearchKey {
    type Err = SmisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(SearchKey::Id),
            "system_id" => Ok(SearchKey::SystemId),
            "pool_id" => Ok(SearchKey::PoolId),
            _ => Err(SmisError::InvalidArgument(format!("unknown search key '{}'", s))),
        }
    }
}

/// `key == value` filter for list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Search {
    pub key: SearchKey,
    pub value: String,
}

impl Search {
    pub fn new(key: SearchKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// Entities that list operations can filter.
pub trait Searchable {
    const KEYS: &'static [SearchKey];

    fn search_value(&self, key: SearchKey) -> Option<&str>;
}

/// Keep the items matching `search`; `None` keeps everything.
pub fn filter<T: Searchable>(items: Vec<T>, search: Option<&Search>) -> Result<Vec<T>> {
    let Some(search) = search else {
        return Ok(items);
    };
    if !T::KEYS.contains(&search.key) {
        return Err(SmisError::InvalidArgument(format!(
            "search key '{}' is not supported here",
            search.key
        )));
    }
    Ok(items
        .into_iter()
        .filter(|item| item.search_value(search.key) == Some(search.value.as_str()))
        .collect())
}

impl Searchable for System {
    const KEYS: &'static [SearchKey] = &[SearchKey::Id];

    fn search_value(&self, key: SearchKey) -> Option<&str> {
        match key {
            SearchKey::Id => Some(&self.id),
            _ => None,
        }
    }
}

impl Searchable for Pool {
    const KEYS: &'static [SearchKey] = &[SearchKey::Id, SearchKey::SystemId];

    fn search_value(&self, key: SearchKey) -> Option<&str> {
        match key {
            SearchKey::Id => Some(&self.id),
            SearchKey::SystemId => Some(&self.system_id),
            SearchKey::PoolId => None,
        }
    }
}

impl Searchable for Volume {
    const KEYS: &'static [SearchKey] = &[SearchKey::Id, SearchKey::SystemId, SearchKey::PoolId];

    fn search_value(&self, key: SearchKey) -> Option<&str> {
        match key {
            SearchKey::Id => Some(&self.id),
            SearchKey::SystemId => Some(&self.system_id),
            SearchKey::PoolId => Some(&self.pool_id),
        }
    }
}

impl Searchable for Disk {
    const KEYS: &'static [SearchKey] = &[SearchKey::Id, SearchKey::SystemId];

    fn search_value(&self, key: SearchKey) -> Option<&str> {
        match key {
            SearchKey::Id => Some(&self.id),
            SearchKey::SystemId => Some(&self.system_id),
            SearchKey::PoolId => None,
        }
    }
}

impl Searchable for AccessGroup {
    const KEYS: &'static [SearchKey] = &[SearchKey::Id, SearchKey::SystemId];

    fn search_value(&self, key: SearchKey) -> Option<&str> {
        match key {
            SearchKey::Id => Some(&self.id),
            SearchKey::SystemId => Some(&self.system_id),
            SearchKey::PoolId => None,
        }
    }
}

impl Searchable for Initiator {
    const KEYS: &'static [SearchKey] = &[SearchKey::Id];

    fn search_value(&self, key: SearchKey) -> Option<&str> {
        match key {
            SearchKey::Id => Some(&self.id),
            _ => None,
        }
    }
}

impl Searchable for TargetPort {
    const KEYS: &'static [SearchKey] = &[SearchKey::Id, SearchKey::SystemId];

    fn search_value(&self, key: SearchKey) -> Option<&str> {
        match key {
            SearchKey::Id => Some(&self.id),
            SearchKey::SystemId => Some(&self.system_id),
            SearchKey::PoolId => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(id: &str, pool: &str) -> Volume {
        Volume {
            id: id.into(),
            name: id.into(),
            vpd83: String::new(),
            block_size: 512,
            num_of_blocks: 2048,
            status: VolumeStatus::OK,
            system_id: "SYS".into(),
            pool_id: pool.into(),
        }
    }

    #[test]
    fn test_status_flags() {
        let mut status = SystemStatus::UNKNOWN;
        assert!(status.is_unknown());
        status.insert(SystemStatus::OK);
        status.insert(SystemStatus::DEGRADED);
        assert!(status.contains(SystemStatus::OK));
        assert!(!status.contains(SystemStatus::ERROR));
        assert!(!status.contains(SystemStatus::UNKNOWN));
        assert_eq!(status, SystemStatus::OK | SystemStatus::DEGRADED);
    }

    #[test]
    fn test_filter_by_pool() {
        let vols = vec![volume("V1", "P1"), volume("V2", "P2"), volume("V3", "P1")];
        let found = filter(vols, Some(&Search::new(SearchKey::PoolId, "P1"))).unwrap();
        let ids: Vec<&str> = found.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["V1", "V3"]);
        assert_eq!(found[0].size_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_filter_rejects_unsupported_key() {
        let systems = vec![System {
            id: "SYS".into(),
            name: "array".into(),
            status: SystemStatus::OK,
            status_info: String::new(),
        }];
        let err = filter(systems, Some(&Search::new(SearchKey::PoolId, "P1"))).unwrap_err();
        assert!(matches!(err, SmisError::InvalidArgument(_)));
    }

    #[test]
    fn test_raid_setting_aliases() {
        assert_eq!(RaidType::Raid6.setting_names(), &["RAID6", "RAID5DP"]);
        assert!(RaidType::Mixed.setting_names().is_empty());
        assert_eq!(RaidType::Raid10.to_string(), "RAID10");
    }

    #[test]
    fn test_parse_search_key_and_replication_type() {
        assert_eq!("pool_id".parse::<SearchKey>().unwrap(), SearchKey::PoolId);
        assert!("owner".parse::<SearchKey>().is_err());
        assert_eq!("clone".parse::<ReplicationType>().unwrap(), ReplicationType::Clone);
    }
}
