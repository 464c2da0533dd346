//! Front-end port mapping for FC, FCoE and iSCSI.
//!
//! The association walks live in the navigator; this module turns the
//! collected instances into [`TargetPort`]s.

use cim_core::CimInstance;

use crate::dmtf::port;
use crate::error::{Result, SmisError};
use crate::ids::hash_id;
use crate::types::{PortType, TargetPort};

pub const FC_PORT_PROPERTIES: &[&str] = &[
    "UsageRestriction",
    "ElementName",
    "SystemName",
    "PermanentAddress",
    "PortDiscriminator",
    "LinkTechnology",
    "DeviceID",
];

pub const IP_ENDPOINT_PROPERTIES: &[&str] = &["IPv4Address", "IPv6Address", "IPv6AddressType"];

pub const ETHERNET_PORT_PROPERTIES: &[&str] = &["PermanentAddress", "ElementName"];

/// Length of a fully written IPv6 address (`xxxx:` x 7 + `xxxx`)
const IPV6_FULL_LEN: usize = 39;

/// Prefix of the IPv4-in-IPv6 filler NetApp reports with IPv6 disabled
const IPV6_ZERO_PREFIX: &str = "0000:0000:0000:0000:0000:0000";

/// Lower-case `hex` and split its first `length` digits into groups of
/// `every`, joined by colons.
pub fn hex_string_format(hex: &str, length: usize, every: usize) -> String {
    let hex = hex.to_lowercase();
    let end = length.min(hex.len());
    hex.as_bytes()[..end]
        .chunks(every.max(1))
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

// ============================================================================
// FC / FCoE
// ============================================================================

/// FCoE when the port says so through its discriminator or runs over
/// Ethernet; FC otherwise.
pub fn fc_port_type(fc_port: &CimInstance) -> PortType {
    if fc_port
        .u64_array("PortDiscriminator")
        .contains(&port::DISCRIMINATOR_FCOE)
    {
        return PortType::Fcoe;
    }
    if fc_port.u64_prop("LinkTechnology") == Some(port::LINK_TECH_ETHERNET) {
        return PortType::Fcoe;
    }
    PortType::Fc
}

/// Ports hosts may log in to.
pub fn is_target_usage(fc_port: &CimInstance) -> bool {
    matches!(
        fc_port.u64_prop("UsageRestriction"),
        Some(port::USAGE_FRONTEND_ONLY | port::USAGE_UNRESTRICTED)
    )
}

/// `system_id` overrides the port's own `SystemName`, for ports hosted by
/// a leaf system of a multi-system array.
pub fn map_fc_port(fc_port: &CimInstance, system_id: Option<&str>) -> Result<TargetPort> {
    let device_id = fc_port.str_prop("DeviceID").ok_or_else(|| {
        SmisError::NoSupport(format!("{} does not have property DeviceID", fc_port.path))
    })?;
    let wwpn = hex_string_format(fc_port.str_prop("PermanentAddress").unwrap_or_default(), 16, 2);
    let system_id = match system_id {
        Some(id) => id.to_string(),
        None => fc_port.str_prop("SystemName").unwrap_or_default().to_string(),
    };
    Ok(TargetPort {
        id: hash_id(device_id),
        port_type: fc_port_type(fc_port),
        service_address: wwpn.clone(),
        network_address: wwpn.clone(),
        physical_address: wwpn,
        physical_name: fc_port.str_prop("ElementName").unwrap_or_default().to_string(),
        system_id,
    })
}

// ============================================================================
// iSCSI
// ============================================================================

/// Printable IPv6 address of an IP endpoint, if it is one worth reporting.
///
/// Only global unicast, 6to4 and unique local addresses are kept. Fully
/// written addresses are normalised to lower case.
pub fn usable_ipv6(ip_endpoint: &CimInstance) -> Option<String> {
    let addr = ip_endpoint.str_prop("IPv6Address").filter(|a| !a.is_empty())?;
    if let Some(addr_type) = ip_endpoint.u64_prop("IPv6AddressType").filter(|t| *t != 0) {
        if !matches!(
            addr_type,
            port::IPV6_ADDR_TYPE_GUA | port::IPV6_ADDR_TYPE_6TO4 | port::IPV6_ADDR_TYPE_ULA
        ) {
            return None;
        }
    }
    if addr.starts_with(IPV6_ZERO_PREFIX) {
        return None;
    }
    if addr.len() == IPV6_FULL_LEN {
        let digits: String = addr.chars().filter(|c| *c != ':').collect();
        if digits.len() == 32 {
            return Some(hex_string_format(&digits, 32, 4));
        }
    }
    Some(addr.to_string())
}

pub fn usable_ipv4(ip_endpoint: &CimInstance) -> Option<String> {
    ip_endpoint
        .str_prop("IPv4Address")
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

/// NIC behind an IP endpoint: formatted MAC and port name, both possibly
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nic {
    pub mac: String,
    pub name: String,
}

impl Nic {
    pub fn from_ethernet_port(eth: &CimInstance) -> Self {
        Self {
            mac: eth
                .str_prop("PermanentAddress")
                .filter(|m| !m.is_empty())
                .map(|m| hex_string_format(m, 12, 2))
                .unwrap_or_default(),
            name: eth.str_prop("ElementName").unwrap_or_default().to_string(),
        }
    }
}

/// One iSCSI target port per (address family, NIC) of an IP endpoint
/// listening on `tcp_port`.
pub fn iscsi_ports(
    node_name: &str,
    tcp_port: u64,
    ip_endpoint: &CimInstance,
    nics: &[Nic],
    system_id: &str,
) -> Vec<TargetPort> {
    let mut addresses = Vec::new();
    if let Some(v4) = usable_ipv4(ip_endpoint) {
        addresses.push(format!("{}:{}", v4, tcp_port));
    }
    if let Some(v6) = usable_ipv6(ip_endpoint) {
        addresses.push(format!("[{}]:{}", v6, tcp_port));
    }

    let default_nic = [Nic::default()];
    let nics = if nics.is_empty() { &default_nic[..] } else { nics };

    let mut out = Vec::new();
    for nic in nics {
        for network_address in &addresses {
            out.push(TargetPort {
                id: hash_id(&format!("{}:{}:{}", nic.mac, network_address, node_name)),
                port_type: PortType::Iscsi,
                service_address: node_name.to_string(),
                network_address: network_address.clone(),
                physical_address: nic.mac.clone(),
                physical_name: nic.name.clone(),
                system_id: system_id.to_string(),
            });
        }
    }
    out
}

/// Drop ports whose id was already seen, keeping the first occurrence.
pub fn dedup_ports(ports: Vec<TargetPort>) -> Vec<TargetPort> {
    let mut seen = std::collections::HashSet::new();
    ports.into_iter().filter(|p| seen.insert(p.id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_core::{CimInstanceName, CimValue};

    fn fc_port(device_id: &str) -> CimInstance {
        CimInstance::new(CimInstanceName::new("CIM_FCPort").with_key("DeviceID", device_id))
            .with("DeviceID", device_id)
            .with("PermanentAddress", "500A0981891B8DC5")
            .with("ElementName", "0a")
            .with("SystemName", "LEAF-1")
            .with("UsageRestriction", 2u16)
    }

    fn ip(v4: Option<&str>, v6: Option<&str>, v6_type: Option<u16>) -> CimInstance {
        let mut inst = CimInstance::new(CimInstanceName::new("CIM_IPProtocolEndpoint").with_key("Name", "ip0"));
        if let Some(a) = v4 {
            inst.set("IPv4Address", a);
        }
        if let Some(a) = v6 {
            inst.set("IPv6Address", a);
        }
        if let Some(t) = v6_type {
            inst.set("IPv6AddressType", t);
        }
        inst
    }

    #[test]
    fn test_hex_string_format() {
        assert_eq!(hex_string_format("500A0981891B8DC5", 16, 2), "50:0a:09:81:89:1b:8d:c5");
        assert_eq!(hex_string_format("001B21AABBCC", 12, 2), "00:1b:21:aa:bb:cc");
    }

    #[test]
    fn test_fc_port_mapping() {
        let port = map_fc_port(&fc_port("FC0"), None).unwrap();
        assert_eq!(port.port_type, PortType::Fc);
        assert_eq!(port.id, hash_id("FC0"));
        assert_eq!(port.service_address, "50:0a:09:81:89:1b:8d:c5");
        assert_eq!(port.system_id, "LEAF-1");

        let reowned = map_fc_port(&fc_port("FC0"), Some("ROOT")).unwrap();
        assert_eq!(reowned.system_id, "ROOT");
    }

    #[test]
    fn test_fcoe_detection() {
        let by_discriminator = fc_port("FC1").with("PortDiscriminator", CimValue::from(vec![3u16, 10u16]));
        assert_eq!(fc_port_type(&by_discriminator), PortType::Fcoe);
        let by_link = fc_port("FC2").with("LinkTechnology", 2u16);
        assert_eq!(fc_port_type(&by_link), PortType::Fcoe);
    }

    #[test]
    fn test_usage_restriction_filter() {
        assert!(is_target_usage(&fc_port("FC0")));
        assert!(!is_target_usage(&fc_port("FC0").with("UsageRestriction", 3u16)));
        assert!(!is_target_usage(&fc_port("FC0").with("UsageRestriction", CimValue::Null)));
    }

    #[test]
    fn test_ipv6_filtering() {
        // Link-local type
        assert_eq!(usable_ipv6(&ip(None, Some("fe80::1"), Some(5))), None);
        assert_eq!(
            usable_ipv6(&ip(None, Some("0000:0000:0000:0000:0000:0000:0a10:29d5"), None)),
            None
        );
        assert_eq!(
            usable_ipv6(&ip(None, Some("2001:0DB8:0000:0000:0000:0000:0000:0001"), Some(6))).as_deref(),
            Some("2001:0db8:0000:0000:0000:0000:0000:0001")
        );
        assert_eq!(usable_ipv6(&ip(None, Some("fd00::5"), Some(8))).as_deref(), Some("fd00::5"));
    }

    #[test]
    fn test_iscsi_ports_per_family_and_nic() {
        let endpoint = ip(Some("10.0.0.5"), Some("fd00::5"), Some(8));
        let nics = vec![Nic {
            mac: "00:1b:21:aa:bb:cc".into(),
            name: "e0a".into(),
        }];
        let ports = iscsi_ports("iqn.1992-08.com.netapp:sn.1", 3260, &endpoint, &nics, "SYS");
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].network_address, "10.0.0.5:3260");
        assert_eq!(ports[1].network_address, "[fd00::5]:3260");
        assert_eq!(
            ports[0].id,
            hash_id("00:1b:21:aa:bb:cc:10.0.0.5:3260:iqn.1992-08.com.netapp:sn.1")
        );

        let no_nic = iscsi_ports("iqn.x", 3260, &ip(Some("10.0.0.6"), None, None), &[], "SYS");
        assert_eq!(no_nic.len(), 1);
        assert_eq!(no_nic[0].physical_address, "");
    }

    #[test]
    fn test_dedup_keeps_order() {
        let endpoint = ip(Some("10.0.0.5"), None, None);
        let mut ports = iscsi_ports("iqn.a", 3260, &endpoint, &[], "SYS");
        ports.extend(iscsi_ports("iqn.b", 3260, &endpoint, &[], "SYS"));
        ports.extend(iscsi_ports("iqn.a", 3260, &endpoint, &[], "SYS"));
        let deduped = dedup_ports(ports);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].service_address, "iqn.a");
        assert_eq!(deduped[1].service_address, "iqn.b");
    }
}
