//! Stable identifiers for domain entities.
//!
//! Each entity kind is identified by a fixed, ordered list of CIM
//! properties. A single property is used verbatim (except for jobs); several
//! properties are concatenated in order and hashed.

use cim_core::{CimInstance, WbemClient};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, SmisError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    System,
    Pool,
    Volume,
    Disk,
    Job,
    AccessGroup,
    Initiator,
    /// Owning system of a pool, volume, disk or access group
    SystemChild,
}

impl EntityKind {
    pub fn id_properties(&self) -> &'static [&'static str] {
        match self {
            EntityKind::System => &["Name"],
            EntityKind::Pool => &["InstanceID"],
            EntityKind::Volume => &["SystemName", "DeviceID"],
            EntityKind::Disk => &["SystemName", "DeviceID"],
            EntityKind::Job => &["InstanceID"],
            EntityKind::AccessGroup => &["DeviceID"],
            EntityKind::Initiator => &["StorageID"],
            EntityKind::SystemChild => &["SystemName"],
        }
    }

    /// Base CIM class enumerated to find an entity of this kind by id.
    pub fn cim_class(&self) -> Option<&'static str> {
        match self {
            EntityKind::System => Some("CIM_ComputerSystem"),
            EntityKind::Pool => Some("CIM_StoragePool"),
            EntityKind::Volume => Some("CIM_StorageVolume"),
            EntityKind::Disk => Some("CIM_DiskDrive"),
            EntityKind::Job => Some("CIM_ConcreteJob"),
            EntityKind::AccessGroup => Some("CIM_SCSIProtocolController"),
            EntityKind::Initiator => Some("CIM_StorageHardwareID"),
            EntityKind::SystemChild => None,
        }
    }

    /// Error raised when no entity of this kind carries `id`.
    pub fn not_found(&self, id: &str) -> SmisError {
        let id = id.to_string();
        match self {
            EntityKind::System => SmisError::SystemNotFound(id),
            EntityKind::Pool => SmisError::PoolNotFound(id),
            EntityKind::Volume => SmisError::VolumeNotFound(id),
            EntityKind::Disk => SmisError::DiskNotFound(id),
            EntityKind::Job => SmisError::JobNotFound(id),
            EntityKind::AccessGroup => SmisError::AccessGroupNotFound(id),
            EntityKind::Initiator => SmisError::InvalidArgument(format!("initiator '{}' not found", id)),
            EntityKind::SystemChild => SmisError::SystemNotFound(id),
        }
    }
}

/// Hex digest used for composite identifiers.
pub fn hash_id(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Identifying properties `instance` lacks.
pub fn missing_id_properties(kind: EntityKind, instance: &CimInstance) -> Vec<&'static str> {
    kind.id_properties()
        .iter()
        .copied()
        .filter(|p| !instance.has(p))
        .collect()
}

/// Derive the id of `instance`, which must already carry every identifying
/// property.
pub fn derive_id(kind: EntityKind, instance: &CimInstance) -> Result<String> {
    let props = kind.id_properties();
    let mut joined = String::new();
    for prop in props {
        let value = instance.get(prop).ok_or_else(|| {
            SmisError::NoSupport(format!(
                "{} {} does not have property {} to calculate {:?} id",
                instance.classname(),
                instance.path,
                prop,
                kind
            ))
        })?;
        joined.push_str(&value.to_string());
    }

    if props.len() == 1 && kind != EntityKind::Job {
        Ok(joined)
    } else {
        Ok(hash_id(&joined))
    }
}

/// Re-fetch `instance` when it lacks identifying properties of `kind`.
pub async fn ensure_id_properties<C: WbemClient>(
    client: &C,
    kind: EntityKind,
    instance: &mut CimInstance,
) -> Result<()> {
    let missing = missing_id_properties(kind, instance);
    if missing.is_empty() {
        return Ok(());
    }
    debug!(path = %instance.path, ?missing, "Re-fetching instance for id properties");
    let fresh = client
        .get_instance(&instance.path, Some(kind.id_properties()))
        .await?;
    instance.absorb(fresh);
    Ok(())
}

/// Id of `instance`, re-fetching it once if identifying properties are missing.
pub async fn id_of<C: WbemClient>(client: &C, kind: EntityKind, instance: &CimInstance) -> Result<String> {
    if missing_id_properties(kind, instance).is_empty() {
        return derive_id(kind, instance);
    }
    let mut instance = instance.clone();
    ensure_id_properties(client, kind, &mut instance).await?;
    derive_id(kind, &instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_core::CimInstanceName;

    fn instance(class: &str, props: &[(&str, &str)]) -> CimInstance {
        let mut inst = CimInstance::new(CimInstanceName::new(class));
        for (k, v) in props {
            inst.set(*k, *v);
        }
        inst
    }

    #[test]
    fn test_single_property_is_passed_through() {
        let sys = instance("CIM_ComputerSystem", &[("Name", "ARRAY-01")]);
        assert_eq!(derive_id(EntityKind::System, &sys).unwrap(), "ARRAY-01");

        let pool = instance("CIM_StoragePool", &[("InstanceID", "POOL+0001")]);
        assert_eq!(derive_id(EntityKind::Pool, &pool).unwrap(), "POOL+0001");
    }

    #[test]
    fn test_job_ids_are_always_hashed() {
        let job = instance("CIM_ConcreteJob", &[("InstanceID", "JOB-7")]);
        let id = derive_id(EntityKind::Job, &job).unwrap();
        assert_ne!(id, "JOB-7");
        assert_eq!(id, hash_id("JOB-7"));
        assert_eq!(id.len(), 32);
    }

    #[test]
    fn test_composite_ids_are_deterministic() {
        let a = instance("EMC_StorageVolume", &[("SystemName", "SYS"), ("DeviceID", "0001")]);
        let b = instance("CIM_StorageVolume", &[("DeviceID", "0001"), ("SystemName", "SYS")]);
        let id_a = derive_id(EntityKind::Volume, &a).unwrap();
        assert_eq!(id_a, derive_id(EntityKind::Volume, &b).unwrap());
        assert_eq!(id_a, hash_id("SYS0001"));

        let c = instance("CIM_StorageVolume", &[("SystemName", "SYS"), ("DeviceID", "0002")]);
        assert_ne!(id_a, derive_id(EntityKind::Volume, &c).unwrap());
    }

    #[test]
    fn test_missing_property_is_no_support() {
        let vol = instance("CIM_StorageVolume", &[("DeviceID", "0001")]);
        assert_eq!(missing_id_properties(EntityKind::Volume, &vol), vec!["SystemName"]);
        let err = derive_id(EntityKind::Volume, &vol).unwrap_err();
        assert!(matches!(err, SmisError::NoSupport(ref m) if m.contains("SystemName")));
    }
}
