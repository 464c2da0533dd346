//! FC and iSCSI front-end port discovery.

use cim_core::{AssociationQuery, CimInstance, CimInstanceName, WbemClient};
use tracing::debug;

use super::Navigator;
use crate::dmtf::port;
use crate::error::{Result, SmisError};
use crate::ids::{self, EntityKind};
use crate::quirks::{self, Quirk};
use crate::target_ports::{
    self as tp, Nic, ETHERNET_PORT_PROPERTIES, FC_PORT_PROPERTIES, IP_ENDPOINT_PROPERTIES,
};
use crate::types::TargetPort;

impl<'a, C: WbemClient> Navigator<'a, C> {
    async fn fc_ports_of_system(&self, system: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_SystemDevice")
            .result_class("CIM_FCPort")
            .properties(FC_PORT_PROPERTIES);
        Ok(self.client.associators(system, &query).await?)
    }

    /// Target-capable FC and FCoE ports.
    ///
    /// With `multi_system`, ports are collected per root system and the ones
    /// hosted by leaf systems are reported as belonging to the root.
    pub async fn fc_target_ports(&self, multi_system: bool) -> Result<Vec<TargetPort>> {
        let mut out = Vec::new();
        if !multi_system {
            for fc_port in self.enumerate("CIM_FCPort", FC_PORT_PROPERTIES).await? {
                if tp::is_target_usage(&fc_port) {
                    out.push(tp::map_fc_port(&fc_port, None)?);
                }
            }
            return Ok(out);
        }

        for system in self.root_systems().await? {
            let system_id = ids::id_of(self.client, EntityKind::System, &system).await?;
            for fc_port in self.fc_ports_of_system(&system.path).await? {
                if tp::is_target_usage(&fc_port) {
                    out.push(tp::map_fc_port(&fc_port, None)?);
                }
            }
            for leaf in self.leaf_systems(&system.path).await? {
                for fc_port in self.fc_ports_of_system(&leaf.path).await? {
                    if tp::is_target_usage(&fc_port) {
                        out.push(tp::map_fc_port(&fc_port, Some(&system_id))?);
                    }
                }
            }
        }
        Ok(out)
    }

    async fn portal_groups_of(&self, system: &CimInstanceName) -> Result<Vec<CimInstance>> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_HostedAccessPoint")
            .result_class("CIM_iSCSIProtocolEndpoint")
            .properties(&["Role"]);
        Ok(self.client.associators(system, &query).await?)
    }

    /// iSCSI target ports of every root system.
    pub async fn iscsi_target_ports(&self, multi_system: bool) -> Result<Vec<TargetPort>> {
        let systems = self.root_systems().await?;
        let mut out = Vec::new();
        for system in &systems {
            let system_id = ids::id_of(self.client, EntityKind::System, system).await?;
            let mut groups = self.portal_groups_of(&system.path).await?;
            if multi_system {
                for leaf in self.leaf_systems(&system.path).await? {
                    groups.extend(self.portal_groups_of(&leaf.path).await?);
                }
            }
            for group in groups {
                if group.u64_prop("Role") != Some(port::ISCSI_ROLE_TARGET) {
                    continue;
                }
                out.extend(self.iscsi_ports_of_portal_group(&group.path, &system_id).await?);
            }
        }

        if systems
            .first()
            .is_some_and(|s| quirks::has_quirk(s.classname(), Quirk::DuplicateIscsiPorts))
        {
            debug!("Removing duplicate iSCSI target ports");
            out = tp::dedup_ports(out);
        }
        Ok(out)
    }

    /// iSCSI node name served by a portal group.
    async fn iscsi_node_name(&self, portal_group: &CimInstanceName) -> Result<String> {
        let query = AssociationQuery::new()
            .assoc_class("CIM_SAPAvailableForElement")
            .result_class("CIM_SCSIProtocolController")
            .properties(&["Name", "NameFormat"]);
        let nodes: Vec<CimInstance> = self
            .client
            .associators(portal_group, &query)
            .await?
            .into_iter()
            .filter(|spc| !quirks::has_quirk(spc.classname(), Quirk::NotIscsiNode))
            .filter(|spc| spc.u64_prop("NameFormat") == Some(port::SPC_NAME_FORMAT_ISCSI))
            .collect();
        match nodes.as_slice() {
            [node] => Ok(node.str_prop("Name").unwrap_or_default().to_string()),
            [] => Err(SmisError::InternalBug(format!(
                "No iSCSI node CIM_SCSIProtocolController associated to {}",
                portal_group
            ))),
            _ => Err(SmisError::InternalBug(format!(
                "Got two or more iSCSI node CIM_SCSIProtocolController associated to {}",
                portal_group
            ))),
        }
    }

    /// Ports of one portal group: one per TCP endpoint, IP address family
    /// and NIC.
    async fn iscsi_ports_of_portal_group(
        &self,
        portal_group: &CimInstanceName,
        system_id: &str,
    ) -> Result<Vec<TargetPort>> {
        let tcp_query = AssociationQuery::new()
            .assoc_class("CIM_BindsTo")
            .result_class("CIM_TCPProtocolEndpoint")
            .properties(&["PortNumber"]);
        let tcp_endpoints = self.client.associators(portal_group, &tcp_query).await?;
        if tcp_endpoints.is_empty() {
            return Err(SmisError::InternalBug(format!(
                "No CIM_TCPProtocolEndpoint associated to {}",
                portal_group
            )));
        }
        let node_name = self.iscsi_node_name(portal_group).await?;

        let ip_query = AssociationQuery::new()
            .assoc_class("CIM_BindsTo")
            .result_class("CIM_IPProtocolEndpoint")
            .properties(IP_ENDPOINT_PROPERTIES);
        let eth_query = AssociationQuery::new()
            .assoc_class("CIM_DeviceSAPImplementation")
            .result_class("CIM_EthernetPort")
            .properties(ETHERNET_PORT_PROPERTIES);

        let mut out = Vec::new();
        for tcp in &tcp_endpoints {
            let tcp_port = tcp.u64_prop("PortNumber").unwrap_or_default();
            for ip in self.client.associators(&tcp.path, &ip_query).await? {
                let nics: Vec<Nic> = self
                    .client
                    .associators(&ip.path, &eth_query)
                    .await?
                    .iter()
                    .map(Nic::from_ethernet_port)
                    .collect();
                out.extend(tp::iscsi_ports(&node_name, tcp_port, &ip, &nics, system_id));
            }
        }
        Ok(out)
    }
}
