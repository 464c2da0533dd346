//! CIM instance names (object paths) and instances.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::value::CimValue;

// ============================================================================
// CimInstanceName
// ============================================================================

/// Object path of a CIM instance: class, optional namespace and key bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CimInstanceName {
    pub classname: String,
    pub namespace: Option<String>,
    pub keybindings: BTreeMap<String, CimValue>,
}

impl CimInstanceName {
    pub fn new(classname: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            namespace: None,
            keybindings: BTreeMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<CimValue>) -> Self {
        self.keybindings.insert(name.into(), value.into());
        self
    }

    pub fn key(&self, name: &str) -> Option<&CimValue> {
        self.keybindings.get(name)
    }

    /// Same object regardless of the namespace the path was reported in.
    pub fn same_object(&self, other: &CimInstanceName) -> bool {
        self.classname == other.classname && self.keybindings == other.keybindings
    }

    /// Copy of this path with the namespace stripped.
    pub fn local(&self) -> CimInstanceName {
        Self {
            classname: self.classname.clone(),
            namespace: None,
            keybindings: self.keybindings.clone(),
        }
    }
}

impl Display for CimInstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{}:", ns)?;
        }
        write!(f, "{}", self.classname)?;
        for (i, (name, value)) in self.keybindings.iter().enumerate() {
            let sep = if i == 0 { '.' } else { ',' };
            write!(f, "{}{}=\"{}\"", sep, name, value)?;
        }
        Ok(())
    }
}

// ============================================================================
// CimInstance
// ============================================================================

/// A CIM instance with its path and the properties the server returned.
///
/// Properties holding `Null` are treated as absent by every accessor, since
/// SMI-S providers use both forms interchangeably for optional data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CimInstance {
    pub path: CimInstanceName,
    pub properties: BTreeMap<String, CimValue>,
}

impl CimInstance {
    pub fn new(path: CimInstanceName) -> Self {
        Self {
            path,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<CimValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<CimValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn classname(&self) -> &str {
        &self.path.classname
    }

    pub fn get(&self, name: &str) -> Option<&CimValue> {
        self.properties.get(name).filter(|v| !v.is_null())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn str_prop(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(CimValue::as_str)
    }

    pub fn u64_prop(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(CimValue::as_u64)
    }

    pub fn bool_prop(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(CimValue::as_bool)
    }

    pub fn ref_prop(&self, name: &str) -> Option<&CimInstanceName> {
        self.get(name).and_then(CimValue::as_reference)
    }

    /// Integer array property; absent or malformed yields an empty list.
    pub fn u64_array(&self, name: &str) -> Vec<u64> {
        self.get(name).map(CimValue::u64_array).unwrap_or_default()
    }

    /// String array property; absent or malformed yields an empty list.
    pub fn string_array(&self, name: &str) -> Vec<String> {
        self.get(name).map(CimValue::string_array).unwrap_or_default()
    }

    /// Merge properties from a fresher copy of the same instance.
    pub fn absorb(&mut self, other: CimInstance) {
        for (name, value) in other.properties {
            self.properties.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_path() -> CimInstanceName {
        CimInstanceName::new("CIM_StorageVolume")
            .with_namespace("root/vendor")
            .with_key("DeviceID", "LUN01")
            .with_key("SystemName", "ARRAY-1")
    }

    #[test]
    fn test_display_path() {
        assert_eq!(
            volume_path().to_string(),
            "root/vendor:CIM_StorageVolume.DeviceID=\"LUN01\",SystemName=\"ARRAY-1\""
        );
    }

    #[test]
    fn test_same_object_ignores_namespace() {
        let a = volume_path();
        let b = a.local();
        assert_ne!(a, b);
        assert!(a.same_object(&b));
    }

    #[test]
    fn test_null_properties_are_absent() {
        let inst = CimInstance::new(volume_path())
            .with("ElementName", CimValue::Null)
            .with("BlockSize", 512u64);
        assert!(!inst.has("ElementName"));
        assert_eq!(inst.u64_prop("BlockSize"), Some(512));
        assert!(inst.u64_array("OperationalStatus").is_empty());
    }

    #[test]
    fn test_absorb_overwrites() {
        let mut inst = CimInstance::new(volume_path()).with("Name", "old");
        inst.absorb(CimInstance::new(volume_path()).with("Name", "new").with("Usage", 2u16));
        assert_eq!(inst.str_prop("Name"), Some("new"));
        assert_eq!(inst.u64_prop("Usage"), Some(2));
    }
}
