// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The endpoint record model. Field names follow the on-disk format the
//! virtual switch consumes, so every rename here is load-bearing.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Compose the on-the-wire endpoint-group name from an application profile
/// and a group name.
#[must_use]
pub fn endpoint_group_name(app_profile: &str, group: &str) -> String {
    format!("{app_profile}|{group}")
}

/// One persisted endpoint: a port (or an external segment's next-hop port)
/// with its policy binding, addresses, and NAT mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    #[serde(rename = "policy-space-name")]
    pub policy_space: String,
    #[serde(rename = "endpoint-group-name")]
    pub endpoint_group: String,
    #[serde(rename = "interface-name")]
    pub interface: String,
    pub ip: Vec<IpAddr>,
    pub mac: String,
    pub uuid: String,
    #[serde(rename = "promiscuous-mode")]
    pub promiscuous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<EndpointAttributes>,
    #[serde(
        rename = "ip-address-mapping",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ip_address_mapping: Vec<IpAddressMapping>,
}

/// Free-form display attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAttributes {
    #[serde(rename = "vm-name")]
    pub vm_name: String,
}

/// One NAT association for an endpoint: a private address mapped to a
/// floating address, optionally routed through an external segment's next
/// hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressMapping {
    pub uuid: String,
    #[serde(rename = "mapped-ip")]
    pub mapped_ip: IpAddr,
    #[serde(rename = "floating-ip")]
    pub floating_ip: IpAddr,
    #[serde(
        rename = "policy-space-name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub policy_space: Option<String>,
    #[serde(
        rename = "endpoint-group-name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub endpoint_group: Option<String>,
    #[serde(rename = "next-hop-if", default, skip_serializing_if = "Option::is_none")]
    pub next_hop_if: Option<String>,
    #[serde(
        rename = "next-hop-mac",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_hop_mac: Option<String>,
}
