// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed configuration for the endpoint-mapping agent. The host agent parses
//! its configuration sources into an [`AgentConfig`] and hands it to the
//! mapper; nothing in this crate reads files or flags itself.

#![deny(clippy::all)]
#![deny(rustdoc::all)]

pub mod errors;

pub use errors::{ConfigError, ConfigResult};

use derive_builder::Builder;
use ipnet::{Ipv4Net, Ipv6Net};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Address of the metadata service. Always excluded from the IPv4
/// floating-IP pool and appended to the address list of DHCP-owned ports.
pub const METADATA_ADDR: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// Wildcard entry for [`AgentConfig::managed_networks`].
pub const MANAGED_ALL: &str = "*";

const DEFAULT_ENDPOINT_DIR: &str = "/var/lib/opflex-agent-ovs/endpoints";

/// Configuration consumed by the endpoint-mapping core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Builder)]
#[serde(default)]
#[builder(default)]
pub struct AgentConfig {
    /// Whether host-managed ports may coexist with policy-managed ones.
    /// Consumed by the host agent, carried here so one struct configures both.
    pub hybrid_mode: bool,
    /// Directory holding the persisted endpoint records.
    pub endpoint_dir: PathBuf,
    /// Physical networks this agent provisions ports on. `*` means all.
    pub managed_networks: Vec<String>,
    /// IPv4 pool for intermediate floating IPs used with SNAT.
    pub fip_pool_v4: Vec<Ipv4Net>,
    /// IPv6 pool for intermediate floating IPs used with SNAT.
    pub fip_pool_v6: Vec<Ipv6Net>,
    /// Next-hop configuration per external segment, keyed by segment name.
    pub external_segments: BTreeMap<String, ExternalSegmentConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hybrid_mode: false,
            endpoint_dir: PathBuf::from(DEFAULT_ENDPOINT_DIR),
            managed_networks: vec![MANAGED_ALL.to_string()],
            fip_pool_v4: vec![default_v4_pool()],
            fip_pool_v6: vec![default_v6_pool()],
            external_segments: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> ConfigResult {
        if self.endpoint_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyEndpointDir);
        }
        if self.fip_pool_v4.is_empty() {
            return Err(ConfigError::EmptyFloatingPool("IPv4"));
        }
        if self.fip_pool_v6.is_empty() {
            return Err(ConfigError::EmptyFloatingPool("IPv6"));
        }
        Ok(())
    }

    /// Whether ports on `physical_network` are provisioned by this agent.
    #[must_use]
    pub fn manages_network(&self, physical_network: &str) -> bool {
        self.managed_networks
            .iter()
            .any(|name| name == MANAGED_ALL || name == physical_network)
    }
}

/// Raw per-segment next-hop configuration. Ranges are `"start[,end]"`
/// strings and gateways are CIDR strings; semantic parsing happens when the
/// external-segment registry is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExternalSegmentConfig {
    pub ip_address_range: Option<String>,
    pub ip_gateway: Option<String>,
    pub ip6_address_range: Option<String>,
    pub ip6_gateway: Option<String>,
}

fn default_v4_pool() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(169, 254, 0, 0), 16).unwrap_or_else(|_| unreachable!())
}

fn default_v6_pool() -> Ipv6Net {
    Ipv6Net::new(
        std::net::Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0),
        64,
    )
    .unwrap_or_else(|_| unreachable!())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert!(!config.hybrid_mode);
        assert_eq!(config.endpoint_dir, PathBuf::from(DEFAULT_ENDPOINT_DIR));
        assert_eq!(config.fip_pool_v4, vec!["169.254.0.0/16".parse().unwrap()]);
        assert_eq!(config.fip_pool_v6, vec!["fe80::/64".parse().unwrap()]);
    }

    #[test]
    fn wildcard_manages_every_network() {
        let config = AgentConfig::default();
        assert!(config.manages_network("physnet1"));
        assert!(config.manages_network("anything"));
    }

    #[test]
    fn explicit_network_list_is_exact() {
        let config = AgentConfigBuilder::default()
            .managed_networks(vec!["physnet1".to_string()])
            .build()
            .unwrap();
        assert!(config.manages_network("physnet1"));
        assert!(!config.manages_network("physnet2"));
    }

    #[test]
    fn empty_network_list_manages_nothing() {
        let config = AgentConfigBuilder::default()
            .managed_networks(Vec::new())
            .build()
            .unwrap();
        assert!(!config.manages_network("physnet1"));
    }

    #[test]
    fn empty_pools_are_rejected() {
        let config = AgentConfigBuilder::default()
            .fip_pool_v4(Vec::new())
            .build()
            .unwrap();
        assert_eq!(config.validate(), Err(ConfigError::EmptyFloatingPool("IPv4")));

        let config = AgentConfigBuilder::default()
            .fip_pool_v6(Vec::new())
            .build()
            .unwrap();
        assert_eq!(config.validate(), Err(ConfigError::EmptyFloatingPool("IPv6")));
    }

    #[test]
    fn empty_endpoint_dir_is_rejected() {
        let config = AgentConfigBuilder::default()
            .endpoint_dir(PathBuf::new())
            .build()
            .unwrap();
        assert_eq!(config.validate(), Err(ConfigError::EmptyEndpointDir));
    }

    #[test]
    fn deserializes_with_defaults_filled_in() {
        let config: AgentConfig = serde_json::from_str(
            r#"{
                "endpoint_dir": "/run/agent/endpoints",
                "fip_pool_v4": ["203.0.113.0/24"],
                "external_segments": {
                    "ext1": {
                        "ip_address_range": "192.0.2.10,192.0.2.20",
                        "ip_gateway": "192.0.2.1/24"
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.endpoint_dir, PathBuf::from("/run/agent/endpoints"));
        assert_eq!(config.managed_networks, vec![MANAGED_ALL.to_string()]);
        assert_eq!(config.fip_pool_v4, vec!["203.0.113.0/24".parse().unwrap()]);
        let ext1 = &config.external_segments["ext1"];
        assert_eq!(ext1.ip_address_range.as_deref(), Some("192.0.2.10,192.0.2.20"));
        assert_eq!(ext1.ip_gateway.as_deref(), Some("192.0.2.1/24"));
        assert_eq!(ext1.ip6_address_range, None);
    }
}
