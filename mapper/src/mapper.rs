// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The orchestrator: one instance owns every piece of mapping state and
//! mutates it only from the host's synchronous event path.

use crate::MapperError;
use crate::port::{DeviceOwner, OVERLAY_NETWORK_TYPE, PolicyBinding, PortInfo};
use config::{AgentConfig, METADATA_ADDR};
use endpoint::{
    EndpointAttributes, EndpointDescriptor, EndpointFileStore, IpAddressMapping,
    endpoint_group_name,
};
use extseg::ExternalSegmentRegistry;
use pool::{AddressPool, IpVersion};
use snat::SnatLifecycle;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maps bound ports to endpoint records and manages the floating-IP and
/// SNAT resources behind them.
///
/// The usage index ties it together: an external segment's SNAT next hop
/// exists exactly while at least one port holds a floating-IP allocation
/// toward that segment. All transitions happen inside [`sync_port`] and
/// [`cleanup_port`].
///
/// [`sync_port`]: PortEndpointMapper::sync_port
/// [`cleanup_port`]: PortEndpointMapper::cleanup_port
#[derive(Debug)]
pub struct PortEndpointMapper<S: SnatLifecycle> {
    config: AgentConfig,
    pool_v4: AddressPool,
    pool_v6: AddressPool,
    registry: ExternalSegmentRegistry,
    /// external segment name -> ports depending on it
    usage: BTreeMap<String, BTreeSet<String>>,
    store: EndpointFileStore,
    snat: S,
}

impl<S: SnatLifecycle> PortEndpointMapper<S> {
    pub fn new(config: AgentConfig, snat: S) -> Result<Self, MapperError> {
        config.validate()?;
        let store = EndpointFileStore::new(&config.endpoint_dir)?;
        let mut pool_v4 = AddressPool::new_v4(&config.fip_pool_v4);
        pool_v4.reserve(IpAddr::V4(METADATA_ADDR));
        let pool_v6 = AddressPool::new_v6(&config.fip_pool_v6);
        let registry = ExternalSegmentRegistry::from_config(&config.external_segments);
        Ok(Self {
            config,
            pool_v4,
            pool_v6,
            registry,
            usage: BTreeMap::new(),
            store,
            snat,
        })
    }

    /// Startup recovery. The in-memory state of this fresh process is the
    /// sole source of truth, so stale records and SNAT leftovers from the
    /// previous run are dropped wholesale. Returns the number of records
    /// purged.
    pub fn recover(&mut self) -> Result<usize, MapperError> {
        let removed = self.store.purge_all()?;
        if let Err(err) = self.snat.cleanup_all() {
            warn!("SNAT cleanup at startup failed: {err}");
        }
        Ok(removed)
    }

    /// Whether ports on this network are provisioned by this agent at all.
    #[must_use]
    pub fn manages_network(&self, network_type: &str, physical_network: &str) -> bool {
        network_type == OVERLAY_NETWORK_TYPE && self.config.manages_network(physical_network)
    }

    /// Reconcile one port against its policy binding and persist the
    /// resulting endpoint record.
    ///
    /// Soft trouble (malformed rules, exhausted pools, SNAT failures) skips
    /// the affected NAT entries and still writes the record; only a store
    /// failure aborts, leaving the port to be retried on its next event.
    #[tracing::instrument(level = "debug", skip_all, fields(port = %port.id))]
    pub fn sync_port(&mut self, port: &PortInfo, binding: &PolicyBinding) -> Result<(), MapperError> {
        if !port.is_mappable() {
            return Ok(());
        }
        let mut ips = port.fixed_ips.clone();
        if port.device_owner == DeviceOwner::Dhcp {
            // DHCP ports also answer for the metadata service
            ips.push(IpAddr::V4(METADATA_ADDR));
        }
        let port_epg = endpoint_group_name(&binding.app_profile, &binding.endpoint_group);
        let mut mappings = Vec::new();
        self.fill_ip_mappings(port, binding, &port_epg, &mut mappings);
        let descriptor = EndpointDescriptor {
            policy_space: binding.policy_space.clone(),
            endpoint_group: port_epg,
            interface: port.interface.clone(),
            ip: ips,
            mac: port.mac.to_string(),
            uuid: port.id.clone(),
            promiscuous: binding.promiscuous,
            attributes: binding
                .vm_name
                .clone()
                .map(|vm_name| EndpointAttributes { vm_name }),
            ip_address_mapping: mappings,
        };
        self.store.write(&port.id, &descriptor)?;
        info!("endpoint record for port {} updated", port.id);
        Ok(())
    }

    /// Drop every association the port holds: its record, its share of any
    /// external segments, and all of its floating-IP allocations.
    pub fn cleanup_port(&mut self, port_id: &str) {
        if let Err(err) = self.store.delete(port_id) {
            warn!("failed to delete endpoint record for port {port_id}: {err}");
        }
        // usage transitions must be computed while the allocations still
        // exist, or the segment's last user could not be identified
        let segments: Vec<String> = self.segments_for_port(port_id).into_iter().collect();
        self.dissociate(port_id, &segments);
        self.pool_v4.release_all(port_id);
        self.pool_v6.release_all(port_id);
        debug!("cleaned up mapping state for port {port_id}");
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &EndpointFileStore {
        &self.store
    }

    #[must_use]
    pub fn address_pool(&self, version: IpVersion) -> &AddressPool {
        match version {
            IpVersion::V4 => &self.pool_v4,
            IpVersion::V6 => &self.pool_v6,
        }
    }

    /// Number of ports currently depending on `segment`.
    #[must_use]
    pub fn segment_users(&self, segment: &str) -> usize {
        self.usage.get(segment).map_or(0, BTreeSet::len)
    }

    #[must_use]
    pub fn snat(&self) -> &S {
        &self.snat
    }

    pub fn snat_mut(&mut self) -> &mut S {
        &mut self.snat
    }

    /// Build the record's ip-address-mapping list and drive the allocation
    /// and usage accounting that goes with it.
    fn fill_ip_mappings(
        &mut self,
        port: &PortInfo,
        binding: &PolicyBinding,
        port_epg: &str,
        mappings: &mut Vec<IpAddressMapping>,
    ) {
        for fip in &binding.floating_ips {
            mappings.push(IpAddressMapping {
                uuid: fip.id.clone(),
                mapped_ip: fip.fixed_ip,
                floating_ip: fip.floating_ip,
                policy_space: Some(
                    fip.nat_policy_space
                        .clone()
                        .unwrap_or_else(|| binding.policy_space.clone()),
                ),
                endpoint_group: Some(match &fip.nat_group {
                    Some(group) => endpoint_group_name(&binding.app_profile, group),
                    None => port_epg.to_string(),
                }),
                next_hop_if: None,
                next_hop_mac: None,
            });
        }

        let previously_used = self.segments_for_port(&port.id);
        let mut in_use_v4: BTreeSet<String> = BTreeSet::new();
        let mut in_use_v6: BTreeSet<String> = BTreeSet::new();

        for rule in &binding.nat_rules {
            let Some((segment, nat_space, nat_group)) = rule.validated() else {
                debug!("port {}: skipping malformed NAT rule {rule:?}", port.id);
                continue;
            };
            if port.fixed_ips.is_empty() {
                debug!(
                    "port {}: no fixed IPs, skipping NAT rule for segment '{segment}'",
                    port.id
                );
                continue;
            }
            let nat_epg = endpoint_group_name(&binding.app_profile, nat_group);
            let Some((next_hop_if, next_hop_mac)) = self.registry.resolve_next_hop(
                segment,
                nat_space,
                &nat_epg,
                &mut self.snat,
                &self.store,
            ) else {
                debug!(
                    "port {}: next hop for segment '{segment}' unresolved, skipping rule",
                    port.id
                );
                continue;
            };
            for &ip in &port.fixed_ips {
                let pool = if ip.is_ipv4() {
                    &mut self.pool_v4
                } else {
                    &mut self.pool_v6
                };
                let floating = match pool.lookup(&port.id, segment) {
                    Some(existing) => existing,
                    None => match pool.allocate(&port.id, segment) {
                        Ok(fresh) => fresh,
                        Err(err) => {
                            warn!(
                                "port {}: {err}, skipping NAT entry for {ip} toward '{segment}'",
                                port.id
                            );
                            continue;
                        }
                    },
                };
                if ip.is_ipv4() {
                    in_use_v4.insert(segment.to_string());
                } else {
                    in_use_v6.insert(segment.to_string());
                }
                mappings.push(IpAddressMapping {
                    uuid: Uuid::new_v4().to_string(),
                    mapped_ip: ip,
                    floating_ip: floating,
                    policy_space: Some(nat_space.to_string()),
                    endpoint_group: Some(nat_epg.clone()),
                    next_hop_if: Some(next_hop_if.clone()),
                    next_hop_mac: Some(next_hop_mac.to_string()),
                });
            }
        }

        let now_used: BTreeSet<String> = in_use_v4.union(&in_use_v6).cloned().collect();
        self.associate(&port.id, &now_used);
        let stale: Vec<String> = previously_used.difference(&now_used).cloned().collect();
        self.dissociate(&port.id, &stale);

        // allocations can also go stale per family while the segment stays
        // in use through the other one
        for segment in self.pool_v4.segments_for(&port.id) {
            if !in_use_v4.contains(&segment) {
                self.pool_v4.release(&port.id, &segment);
            }
        }
        for segment in self.pool_v6.segments_for(&port.id) {
            if !in_use_v6.contains(&segment) {
                self.pool_v6.release(&port.id, &segment);
            }
        }
    }

    /// Segments the port holds a floating-IP allocation toward, across both
    /// address families.
    fn segments_for_port(&self, port_id: &str) -> BTreeSet<String> {
        let mut segments = self.pool_v4.segments_for(port_id);
        segments.extend(self.pool_v6.segments_for(port_id));
        segments
    }

    fn associate(&mut self, port_id: &str, segments: &BTreeSet<String>) {
        for segment in segments {
            self.usage
                .entry(segment.clone())
                .or_default()
                .insert(port_id.to_string());
        }
    }

    /// Remove the port from each segment's usage set; a segment whose set
    /// drains tears down in full: next-hop state, host-endpoint record, and
    /// the SNAT resources behind it. Teardown trouble is logged and
    /// swallowed so port reconciliation never aborts on it.
    fn dissociate(&mut self, port_id: &str, segments: &[String]) {
        for segment in segments {
            let Some(ports) = self.usage.get_mut(segment) else {
                continue;
            };
            ports.remove(port_id);
            if !ports.is_empty() {
                continue;
            }
            self.usage.remove(segment);
            info!("external segment '{segment}' lost its last user, tearing down next hop");
            self.registry.clear_next_hop(segment);
            if let Err(err) = self.store.delete(segment) {
                warn!("failed to delete host endpoint record for '{segment}': {err}");
            }
            if let Err(err) = self.snat.teardown(segment) {
                warn!("failed to tear down SNAT for segment '{segment}': {err}");
            }
        }
    }
}
