// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Input model: what the host agent knows about a port and what the policy
//! controller answered for it.

use mac_address::MacAddress;
use std::net::IpAddr;
use tracing::debug;

/// The overlay network type this agent provisions endpoints for.
pub const OVERLAY_NETWORK_TYPE: &str = "opflex";

const OWNER_ROUTER_INTERFACE: &str = "network:router_interface";
const OWNER_DHCP: &str = "network:dhcp";

/// Who owns a port, as far as this agent cares. Router-interface ports are
/// never mapped; DHCP ports additionally serve the metadata address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOwner {
    RouterInterface,
    Dhcp,
    Other,
}

impl DeviceOwner {
    #[must_use]
    pub fn parse(owner: &str) -> DeviceOwner {
        match owner {
            OWNER_ROUTER_INTERFACE => DeviceOwner::RouterInterface,
            OWNER_DHCP => DeviceOwner::Dhcp,
            _ => DeviceOwner::Other,
        }
    }
}

/// A bound port as seen on the virtual switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Opaque port identifier, stable across agent restarts. Keys the
    /// persisted record and every pool allocation.
    pub id: String,
    /// Name of the switch interface backing the port.
    pub interface: String,
    pub mac: MacAddress,
    pub fixed_ips: Vec<IpAddr>,
    pub device_owner: DeviceOwner,
}

/// The policy controller's answer for a port: its group binding plus any
/// NAT data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyBinding {
    pub policy_space: String,
    pub app_profile: String,
    pub endpoint_group: String,
    pub promiscuous: bool,
    pub vm_name: Option<String>,
    /// Floating IPs assigned directly by policy data.
    pub floating_ips: Vec<FloatingIpEntry>,
    /// Segment-based NAT rules, from which floating IPs are allocated here.
    pub nat_rules: Vec<SegmentNatRule>,
}

/// A pre-assigned floating IP carried verbatim into the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIpEntry {
    pub id: String,
    pub fixed_ip: IpAddr,
    pub floating_ip: IpAddr,
    pub nat_policy_space: Option<String>,
    pub nat_group: Option<String>,
}

/// A NAT rule naming an external segment. Policy data may arrive incomplete,
/// so every field is optional and [`SegmentNatRule::validated`] gates use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentNatRule {
    pub segment: Option<String>,
    pub nat_policy_space: Option<String>,
    pub nat_group: Option<String>,
}

impl SegmentNatRule {
    /// The rule's fields when all of them are present and non-empty.
    pub(crate) fn validated(&self) -> Option<(&str, &str, &str)> {
        let segment = self.segment.as_deref().filter(|s| !s.is_empty())?;
        let space = self.nat_policy_space.as_deref().filter(|s| !s.is_empty())?;
        let group = self.nat_group.as_deref().filter(|s| !s.is_empty())?;
        Some((segment, space, group))
    }
}

impl PortInfo {
    /// Whether this port should be mapped at all.
    pub(crate) fn is_mappable(&self) -> bool {
        if self.device_owner == DeviceOwner::RouterInterface {
            debug!("port {} is a router interface, not mapping it", self.id);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_strings_map_to_variants() {
        assert_eq!(
            DeviceOwner::parse("network:router_interface"),
            DeviceOwner::RouterInterface
        );
        assert_eq!(DeviceOwner::parse("network:dhcp"), DeviceOwner::Dhcp);
        assert_eq!(DeviceOwner::parse("compute:nova"), DeviceOwner::Other);
        assert_eq!(DeviceOwner::parse(""), DeviceOwner::Other);
    }

    #[test]
    fn incomplete_rules_do_not_validate() {
        let complete = SegmentNatRule {
            segment: Some("ext1".to_string()),
            nat_policy_space: Some("nat-tenant".to_string()),
            nat_group: Some("nat-epg".to_string()),
        };
        assert_eq!(
            complete.validated(),
            Some(("ext1", "nat-tenant", "nat-epg"))
        );

        assert_eq!(SegmentNatRule::default().validated(), None);
        assert_eq!(
            SegmentNatRule {
                nat_policy_space: None,
                ..complete.clone()
            }
            .validated(),
            None
        );
        assert_eq!(
            SegmentNatRule {
                nat_group: Some(String::new()),
                ..complete
            }
            .validated(),
            None
        );
    }
}
