//! SNIA profile registration discovery.

use std::fmt::{self, Display};
use std::sync::LazyLock;

use cim_core::{CimInstance, CimInstanceName, CimStatus, WbemClient};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::dmtf::{INTEROP_NAMESPACES, SNIA_ORGANIZATION};
use crate::error::Result;
use crate::quirks;

const PROFILE_PROPERTIES: &[&str] = &[
    "RegisteredName",
    "RegisteredVersion",
    "RegisteredOrganization",
];

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?$").expect("Invalid regex pattern"));

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Profile {
    Array,
    BlockServices,
    DiskDriveLite,
    MultipleComputerSystem,
    MaskingMapping,
    FcTargetPorts,
    IscsiTargetPorts,
}

impl Profile {
    const ALL: [Profile; 7] = [
        Profile::Array,
        Profile::BlockServices,
        Profile::DiskDriveLite,
        Profile::MultipleComputerSystem,
        Profile::MaskingMapping,
        Profile::FcTargetPorts,
        Profile::IscsiTargetPorts,
    ];

    pub fn registered_name(&self) -> &'static str {
        match self {
            Profile::Array => "Array",
            Profile::BlockServices => "Block Services",
            Profile::DiskDriveLite => "Disk Drive Lite",
            Profile::MultipleComputerSystem => "Multiple Computer System",
            Profile::MaskingMapping => "Masking and Mapping",
            Profile::FcTargetPorts => "FC Target Ports",
            Profile::IscsiTargetPorts => "iSCSI Target Ports",
        }
    }

    pub fn from_registered_name(name: &str) -> Option<Self> {
        let name = quirks::canonical_profile_name(name);
        Self::ALL.into_iter().find(|p| p.registered_name() == name)
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.registered_name())
    }
}

// ============================================================================
// SpecVersion
// ============================================================================

/// SMI-S specification version encoded as `major * 10^6 + minor * 10^3 + rev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SpecVersion(pub u32);

impl SpecVersion {
    pub const SMIS_1_4: SpecVersion = SpecVersion(1_004_000);
    pub const SMIS_1_5: SpecVersion = SpecVersion(1_005_000);
    pub const SMIS_1_6: SpecVersion = SpecVersion(1_006_000);

    /// Parse `a.b` or `a.b.c`.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(s.trim())?;
        let part = |i: usize| -> Option<u32> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(0),
            }
        };
        let (major, minor, rev) = (part(1)?, part(2)?, part(3)?);
        if minor > 999 || rev > 999 {
            return None;
        }
        major
            .checked_mul(1_000_000)
            .map(|v| SpecVersion(v + minor * 1_000 + rev))
    }
}

impl Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.0 / 1_000_000,
            (self.0 / 1_000) % 1_000,
            self.0 % 1_000
        )
    }
}

// ============================================================================
// Registered profiles
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredProfile {
    pub profile: Option<Profile>,
    pub version: Option<SpecVersion>,
    pub organization: Option<u64>,
    pub path: CimInstanceName,
}

impl RegisteredProfile {
    pub fn from_instance(instance: &CimInstance) -> Self {
        Self {
            profile: instance
                .str_prop("RegisteredName")
                .and_then(Profile::from_registered_name),
            version: instance
                .str_prop("RegisteredVersion")
                .and_then(SpecVersion::parse),
            organization: instance.u64_prop("RegisteredOrganization"),
            path: instance.path.clone(),
        }
    }
}

/// Every profile a provider registered, as found once per session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisteredProfiles {
    profiles: Vec<RegisteredProfile>,
}

impl RegisteredProfiles {
    pub fn from_instances(instances: &[CimInstance]) -> Self {
        Self {
            profiles: instances.iter().map(RegisteredProfile::from_instance).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Best registered version of `profile` at or above `min`.
    ///
    /// With `strict`, only a registration of exactly `min` counts.
    pub fn supported(&self, profile: Profile, min: SpecVersion, strict: bool) -> Option<SpecVersion> {
        let versions = self
            .profiles
            .iter()
            .filter(|rp| rp.profile == Some(profile))
            .filter_map(|rp| rp.version);

        if strict {
            versions.into_iter().find(|v| *v == min)
        } else {
            versions.filter(|v| *v >= min).max()
        }
    }

    /// The SNIA `Array` registration the root systems conform to.
    pub fn root_profile(&self) -> Option<&RegisteredProfile> {
        self.profiles.iter().find(|rp| {
            rp.profile == Some(Profile::Array) && rp.organization == Some(SNIA_ORGANIZATION)
        })
    }
}

/// Namespaces probed for profile registration, in order.
pub fn interop_namespaces(extra: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = INTEROP_NAMESPACES.iter().map(|s| s.to_string()).collect();
    if let Some(ns) = extra {
        if !out.iter().any(|n| n == ns) {
            out.push(ns.to_string());
        }
    }
    out
}

/// Enumerate `CIM_RegisteredProfile` in the interop namespaces.
///
/// The first namespace with any registration wins. Namespaces or classes
/// the provider does not implement count as empty.
pub async fn discover<C: WbemClient>(client: &C, extra_namespace: Option<&str>) -> Result<RegisteredProfiles> {
    for namespace in interop_namespaces(extra_namespace) {
        let found = match client
            .enumerate_instances("CIM_RegisteredProfile", Some(&namespace), Some(PROFILE_PROPERTIES))
            .await
        {
            Ok(found) => found,
            Err(e)
                if e.is_status(&[
                    CimStatus::NotSupported,
                    CimStatus::InvalidNamespace,
                    CimStatus::InvalidClass,
                ]) =>
            {
                debug!(namespace = %namespace, error = %e, "No profile registration here");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        if !found.is_empty() {
            info!(namespace = %namespace, count = found.len(), "Found registered profiles");
            return Ok(RegisteredProfiles::from_instances(&found));
        }
    }
    Ok(RegisteredProfiles::default())
}
