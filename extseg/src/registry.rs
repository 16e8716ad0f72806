// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The registry: all configured external segments, keyed by name.

use crate::nexthop::ExtSegNextHop;
use config::ExternalSegmentConfig;
use endpoint::EndpointFileStore;
use mac_address::MacAddress;
use snat::SnatLifecycle;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default)]
pub struct ExternalSegmentRegistry {
    segments: BTreeMap<String, ExtSegNextHop>,
}

impl ExternalSegmentRegistry {
    /// Build the registry from configuration. Loaded once at startup;
    /// unparsable pieces of a segment's configuration are dropped leniently
    /// and the segment simply stays invalid until fixed.
    #[must_use]
    pub fn from_config(segments: &BTreeMap<String, ExternalSegmentConfig>) -> Self {
        let mut registry = BTreeMap::new();
        for (name, cfg) in segments {
            let nh = ExtSegNextHop::from_config(name, cfg);
            debug!("found external segment: {nh}");
            registry.insert(name.clone(), nh);
        }
        Self { segments: registry }
    }

    #[must_use]
    pub fn get(&self, segment: &str) -> Option<&ExtSegNextHop> {
        self.segments.get(segment)
    }

    /// The segment's next-hop interface and MAC, establishing them on first
    /// use.
    ///
    /// Establishing means asking the SNAT manager to set the segment up and
    /// persisting the host-endpoint record that describes the next-hop port
    /// (keyed by the segment name, bound to the NAT group, promiscuous). A
    /// SNAT failure leaves the next hop unresolved — the record is still
    /// written with default fields so the switch sees the segment — and the
    /// whole sequence is retried on the next call. Returns `None` for
    /// unknown or invalid segments and while unresolved.
    pub fn resolve_next_hop<S: SnatLifecycle>(
        &mut self,
        segment: &str,
        nat_policy_space: &str,
        nat_group: &str,
        snat: &mut S,
        store: &EndpointFileStore,
    ) -> Option<(String, MacAddress)> {
        let nh = self.segments.get_mut(segment)?;
        if !nh.is_valid() {
            debug!("external segment '{segment}' has no usable next-hop configuration");
            return None;
        }
        if nh.next_hop_iface.is_none() {
            match snat.setup(segment, &nh.snat_ranges()) {
                Ok(binding) => {
                    info!(
                        "established SNAT next hop for '{segment}' on {}",
                        binding.interface
                    );
                    nh.next_hop_iface = Some(binding.interface);
                    nh.next_hop_mac = Some(binding.mac);
                }
                Err(err) => error!("failed to set up SNAT for '{segment}': {err}"),
            }
            let record = nh.host_endpoint(nat_policy_space, nat_group);
            if let Err(err) = store.write(segment, &record) {
                error!("failed to write host endpoint record for '{segment}': {err}");
            }
        }
        nh.next_hop()
            .map(|(iface, mac)| (iface.to_string(), mac))
    }

    /// Forget the established next hop. Called when the segment loses its
    /// last user; the next `resolve_next_hop` starts from scratch.
    pub fn clear_next_hop(&mut self, segment: &str) {
        if let Some(nh) = self.segments.get_mut(segment) {
            nh.next_hop_iface = None;
            nh.next_hop_mac = None;
            debug!("cleared next-hop state for external segment '{segment}'");
        }
    }
}
