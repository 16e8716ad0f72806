// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-segment next-hop state and the lenient parsing of its configuration.

use config::ExternalSegmentConfig;
use endpoint::EndpointDescriptor;
use ipnet::{Ipv4Net, Ipv6Net};
use mac_address::MacAddress;
use snat::SnatRanges;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

/// Next-hop configuration and state for one external segment.
///
/// `next_hop_iface`/`next_hop_mac` stay unresolved until the first port
/// needs the segment, and are reset when no port uses it anymore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtSegNextHop {
    pub(crate) name: String,
    pub(crate) v4_start: Option<Ipv4Addr>,
    pub(crate) v4_end: Option<Ipv4Addr>,
    pub(crate) v4_gateway: Option<Ipv4Net>,
    pub(crate) v6_start: Option<Ipv6Addr>,
    pub(crate) v6_end: Option<Ipv6Addr>,
    pub(crate) v6_gateway: Option<Ipv6Net>,
    pub(crate) next_hop_iface: Option<String>,
    pub(crate) next_hop_mac: Option<MacAddress>,
}

impl ExtSegNextHop {
    pub(crate) fn from_config(name: &str, cfg: &ExternalSegmentConfig) -> Self {
        let (v4_start, v4_end) = parse_range(name, cfg.ip_address_range.as_deref());
        let (v6_start, v6_end) = parse_range(name, cfg.ip6_address_range.as_deref());
        Self {
            name: name.to_string(),
            v4_start,
            v4_end,
            v4_gateway: parse_gateway(cfg.ip_gateway.as_deref()),
            v6_start,
            v6_end,
            v6_gateway: parse_gateway(cfg.ip6_gateway.as_deref()),
            next_hop_iface: None,
            next_hop_mac: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A segment is usable once it has a complete pair for either family:
    /// a range start plus a gateway.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (self.v4_start.is_some() && self.v4_gateway.is_some())
            || (self.v6_start.is_some() && self.v6_gateway.is_some())
    }

    #[must_use]
    pub fn next_hop(&self) -> Option<(&str, MacAddress)> {
        match (&self.next_hop_iface, self.next_hop_mac) {
            (Some(iface), Some(mac)) => Some((iface.as_str(), mac)),
            _ => None,
        }
    }

    pub(crate) fn snat_ranges(&self) -> SnatRanges {
        SnatRanges {
            v4_start: self.v4_start,
            v4_end: self.v4_end,
            v4_gateway: self.v4_gateway,
            v6_start: self.v6_start,
            v6_end: self.v6_end,
            v6_gateway: self.v6_gateway,
        }
    }

    /// Every address in the configured ranges; a missing end bounds the
    /// range at its start.
    pub(crate) fn range_addresses(&self) -> Vec<IpAddr> {
        let mut ips = Vec::new();
        if let Some(start) = self.v4_start {
            let end = self.v4_end.unwrap_or(start);
            for bits in start.to_bits()..=end.to_bits() {
                ips.push(IpAddr::V4(Ipv4Addr::from_bits(bits)));
            }
        }
        if let Some(start) = self.v6_start {
            let end = self.v6_end.unwrap_or(start);
            for bits in start.to_bits()..=end.to_bits() {
                ips.push(IpAddr::V6(Ipv6Addr::from_bits(bits)));
            }
        }
        ips
    }

    /// The record describing the segment's next-hop port itself, keyed by
    /// the segment name in the store. Unresolved next-hop fields are written
    /// as defaults so the record can be retried into shape on a later pass.
    pub(crate) fn host_endpoint(
        &self,
        policy_space: &str,
        endpoint_group: &str,
    ) -> EndpointDescriptor {
        EndpointDescriptor {
            policy_space: policy_space.to_string(),
            endpoint_group: endpoint_group.to_string(),
            interface: self.next_hop_iface.clone().unwrap_or_default(),
            ip: self.range_addresses(),
            mac: self
                .next_hop_mac
                .map(|mac| mac.to_string())
                .unwrap_or_default(),
            uuid: Uuid::new_v4().to_string(),
            promiscuous: true,
            attributes: None,
            ip_address_mapping: Vec::new(),
        }
    }
}

impl fmt::Display for ExtSegNextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: ipv4 ({}-{},{}), ipv6 ({}-{},{})",
            self.name,
            opt(&self.v4_start),
            opt(&self.v4_end),
            opt(&self.v4_gateway),
            opt(&self.v6_start),
            opt(&self.v6_end),
            opt(&self.v6_gateway),
        )
    }
}

fn opt<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string)
}

/// Parse a `"start[,end]"` range. An unparsable start drops the whole range,
/// an unparsable end just drops the end.
fn parse_range<A: FromStr>(segment: &str, value: Option<&str>) -> (Option<A>, Option<A>) {
    let Some(value) = value else {
        return (None, None);
    };
    let mut parts = value.splitn(2, ',').map(str::trim);
    let start = match parts.next().filter(|s| !s.is_empty()) {
        Some(text) => match text.parse() {
            Ok(addr) => Some(addr),
            Err(_) => {
                warn!("segment '{segment}': unparsable range start '{text}'");
                return (None, None);
            }
        },
        None => return (None, None),
    };
    let end = parts.next().filter(|s| !s.is_empty()).and_then(|text| {
        match text.parse() {
            Ok(addr) => Some(addr),
            Err(_) => {
                warn!("segment '{segment}': unparsable range end '{text}'");
                None
            }
        }
    });
    (start, end)
}

/// A gateway is only usable when given with its prefix length; the prefix
/// parser enforces the `addr/len` form, so anything else comes back absent.
fn parse_gateway<G: FromStr>(value: Option<&str>) -> Option<G> {
    value.and_then(|text| text.trim().parse().ok())
}
