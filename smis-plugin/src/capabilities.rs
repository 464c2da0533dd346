//! Per-system capability set.

use std::fmt::{self, Display};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    BlockSupport,
    Volumes,
    VolumeCreate,
    VolumeDelete,
    VolumeResize,
    VolumeReplicate,
    VolumeReplicateClone,
    VolumeReplicateCopy,
    AccessGroups,
    VolumeMask,
    VolumeUnmask,
    AccessGroupInitiatorAdd,
    AccessGroupInitiatorDelete,
    AccessGroupsGrantedToVolume,
    VolumesAccessibleByAccessGroup,
    TargetPorts,
    Disks,
    PoolCreate,
    PoolDelete,
}

impl Capability {
    pub const ALL: [Capability; 19] = [
        Capability::BlockSupport,
        Capability::Volumes,
        Capability::VolumeCreate,
        Capability::VolumeDelete,
        Capability::VolumeResize,
        Capability::VolumeReplicate,
        Capability::VolumeReplicateClone,
        Capability::VolumeReplicateCopy,
        Capability::AccessGroups,
        Capability::VolumeMask,
        Capability::VolumeUnmask,
        Capability::AccessGroupInitiatorAdd,
        Capability::AccessGroupInitiatorDelete,
        Capability::AccessGroupsGrantedToVolume,
        Capability::VolumesAccessibleByAccessGroup,
        Capability::TargetPorts,
        Capability::Disks,
        Capability::PoolCreate,
        Capability::PoolDelete,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::BlockSupport => "BLOCK_SUPPORT",
            Capability::Volumes => "VOLUMES",
            Capability::VolumeCreate => "VOLUME_CREATE",
            Capability::VolumeDelete => "VOLUME_DELETE",
            Capability::VolumeResize => "VOLUME_RESIZE",
            Capability::VolumeReplicate => "VOLUME_REPLICATE",
            Capability::VolumeReplicateClone => "VOLUME_REPLICATE_CLONE",
            Capability::VolumeReplicateCopy => "VOLUME_REPLICATE_COPY",
            Capability::AccessGroups => "ACCESS_GROUPS",
            Capability::VolumeMask => "VOLUME_MASK",
            Capability::VolumeUnmask => "VOLUME_UNMASK",
            Capability::AccessGroupInitiatorAdd => "ACCESS_GROUP_INITIATOR_ADD",
            Capability::AccessGroupInitiatorDelete => "ACCESS_GROUP_INITIATOR_DELETE",
            Capability::AccessGroupsGrantedToVolume => "ACCESS_GROUPS_GRANTED_TO_VOLUME",
            Capability::VolumesAccessibleByAccessGroup => "VOLUMES_ACCESSIBLE_BY_ACCESS_GROUP",
            Capability::TargetPorts => "TARGET_PORTS",
            Capability::Disks => "DISKS",
            Capability::PoolCreate => "POOL_CREATE",
            Capability::PoolDelete => "POOL_DELETE",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed-size set of [`Capability`] values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, cap: Capability) {
        self.0 |= cap.bit();
    }

    pub fn set_all(&mut self, caps: &[Capability]) {
        for cap in caps {
            self.set(*cap);
        }
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.has(*c))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_query() {
        let mut caps = CapabilitySet::new();
        assert!(caps.is_empty());
        caps.set(Capability::BlockSupport);
        caps.set_all(&[Capability::VolumeMask, Capability::VolumeUnmask]);
        assert!(caps.has(Capability::VolumeMask));
        assert!(!caps.has(Capability::Disks));
        assert_eq!(
            caps.iter().collect::<Vec<_>>(),
            vec![Capability::BlockSupport, Capability::VolumeMask, Capability::VolumeUnmask]
        );
    }

    #[test]
    fn test_serializes_as_names() {
        let mut caps = CapabilitySet::new();
        caps.set(Capability::PoolCreate);
        caps.set(Capability::Volumes);
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, r#"["VOLUMES","POOL_CREATE"]"#);
    }
}
