//! Session-wide negotiation results.

use tokio::sync::OnceCell;

use crate::error::{Result, SmisError};
use crate::profile::{Profile, RegisteredProfiles, SpecVersion};

/// Outcome of registration, consulted by every operation.
///
/// Everything except the vendor namespaces is fixed at registration. The
/// vendor namespaces are discovered from the root systems on first use and
/// never change afterwards.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// No usable profile registration; discovery relies on class probing
    pub fallback_mode: bool,
    pub profiles: RegisteredProfiles,
    /// System ids from the URI `systems=` parameter
    pub system_filter: Option<Vec<String>>,
    vendor_namespaces: OnceCell<Vec<String>>,
}

impl SessionContext {
    pub fn new(fallback_mode: bool, profiles: RegisteredProfiles, system_filter: Option<Vec<String>>) -> Self {
        Self {
            fallback_mode,
            profiles,
            system_filter,
            vendor_namespaces: OnceCell::new(),
        }
    }

    /// Pin the vendor namespaces up front (URI `namespace=` in fallback mode).
    pub fn with_vendor_namespaces(self, namespaces: Vec<String>) -> Self {
        Self {
            vendor_namespaces: OnceCell::new_with(Some(namespaces)),
            ..self
        }
    }

    pub fn vendor_namespaces(&self) -> Option<&[String]> {
        self.vendor_namespaces.get().map(Vec::as_slice)
    }

    pub(crate) fn vendor_namespace_cell(&self) -> &OnceCell<Vec<String>> {
        &self.vendor_namespaces
    }

    /// Best registered version of `profile` at or above `min`.
    pub fn profile_version(&self, profile: Profile, min: SpecVersion, strict: bool) -> Option<SpecVersion> {
        self.profiles.supported(profile, min, strict)
    }

    pub fn is_supported(&self, profile: Profile, min: SpecVersion) -> bool {
        self.profile_version(profile, min, false).is_some()
    }

    /// Fail with NO_SUPPORT unless `profile` >= `min` is registered.
    /// Fallback sessions have no registration to consult and always pass.
    pub fn require(&self, profile: Profile, min: SpecVersion) -> Result<()> {
        if self.fallback_mode || self.is_supported(profile, min) {
            return Ok(());
        }
        Err(SmisError::NoSupport(format!(
            "SMI-S {} '{}' profile is not supported by the provider",
            min, profile
        )))
    }

    /// Whether the URI system filter lets `system_id` through.
    pub fn system_wanted(&self, system_id: &str) -> bool {
        match &self.system_filter {
            Some(ids) => ids.iter().any(|id| id == system_id),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_core::{CimInstance, CimInstanceName};

    fn profiles(entries: &[(&str, &str)]) -> RegisteredProfiles {
        let instances: Vec<CimInstance> = entries
            .iter()
            .map(|(name, version)| {
                CimInstance::new(CimInstanceName::new("CIM_RegisteredProfile").with_key("InstanceID", *name))
                    .with("RegisteredName", *name)
                    .with("RegisteredVersion", *version)
                    .with("RegisteredOrganization", 11u16)
            })
            .collect();
        RegisteredProfiles::from_instances(&instances)
    }

    #[test]
    fn test_require_profile() {
        let ctx = SessionContext::new(false, profiles(&[("Array", "1.5"), ("Masking and Mapping", "1.4")]), None);
        assert!(ctx.require(Profile::MaskingMapping, SpecVersion::SMIS_1_4).is_ok());
        let err = ctx.require(Profile::DiskDriveLite, SpecVersion::SMIS_1_4).unwrap_err();
        assert!(matches!(err, SmisError::NoSupport(ref m) if m.contains("Disk Drive Lite")));
    }

    #[test]
    fn test_fallback_mode_skips_profile_checks() {
        let ctx = SessionContext::new(true, RegisteredProfiles::default(), None);
        assert!(ctx.require(Profile::DiskDriveLite, SpecVersion::SMIS_1_4).is_ok());
        assert!(!ctx.is_supported(Profile::DiskDriveLite, SpecVersion::SMIS_1_4));
    }

    #[test]
    fn test_system_filter() {
        let ctx = SessionContext::new(true, RegisteredProfiles::default(), Some(vec!["A".into()]));
        assert!(ctx.system_wanted("A"));
        assert!(!ctx.system_wanted("B"));
        assert!(SessionContext::default().system_wanted("B"));
    }

    #[test]
    fn test_pinned_namespaces() {
        let ctx = SessionContext::new(true, RegisteredProfiles::default(), None)
            .with_vendor_namespaces(vec!["root/emc".into()]);
        assert_eq!(ctx.vendor_namespaces(), Some(&["root/emc".to_string()][..]));
    }
}
