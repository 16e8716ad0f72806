// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The allocator itself: free/allocated bookkeeping over the blocks.

use crate::blocks::AddrBlock;
use crate::{IpVersion, PoolError};
use ipnet::{Ipv4Net, Ipv6Net};
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, trace};

/// An address pool for one IP version.
///
/// Free addresses are tracked as offsets into the concatenated blocks: a
/// cursor marks the lowest never-allocated offset, a released set holds
/// offsets returned to the pool, and a reserved set holds offsets excluded
/// from allocation altogether. Allocations are keyed by
/// `(port id, external segment name)`.
#[derive(Debug, Clone)]
pub struct AddressPool {
    version: IpVersion,
    blocks: Vec<AddrBlock>,
    total: u128,
    cursor: u128,
    released: BTreeSet<u128>,
    reserved: BTreeSet<u128>,
    allocations: BTreeMap<String, BTreeMap<String, u128>>,
}

impl AddressPool {
    #[must_use]
    pub fn new_v4(prefixes: &[Ipv4Net]) -> Self {
        Self::from_blocks(
            IpVersion::V4,
            prefixes.iter().map(AddrBlock::from_v4).collect(),
        )
    }

    #[must_use]
    pub fn new_v6(prefixes: &[Ipv6Net]) -> Self {
        Self::from_blocks(
            IpVersion::V6,
            prefixes.iter().map(AddrBlock::from_v6).collect(),
        )
    }

    fn from_blocks(version: IpVersion, mut blocks: Vec<AddrBlock>) -> Self {
        blocks.sort_by_key(AddrBlock::first);
        let total = blocks
            .iter()
            .fold(0u128, |acc, block| acc.saturating_add(block.size()));
        Self {
            version,
            blocks,
            total,
            cursor: 0,
            released: BTreeSet::new(),
            reserved: BTreeSet::new(),
            allocations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn version(&self) -> IpVersion {
        self.version
    }

    /// Exclude a specific address from allocation. Silent no-op when the
    /// address is not part of the pool's address space.
    pub fn reserve(&mut self, addr: IpAddr) {
        let Some(offset) = self.offset_of(&addr) else {
            trace!("{addr} is not in the pool, nothing to reserve");
            return;
        };
        self.released.remove(&offset);
        if self.reserved.insert(offset) {
            debug!("reserved {addr}, excluded from allocation");
        }
    }

    /// Allocate one address for `(port, segment)`.
    ///
    /// Selection is deterministic: the lowest free address wins. Released
    /// addresses always sort below the never-allocated tail, so they are
    /// reused first.
    pub fn allocate(&mut self, port: &str, segment: &str) -> Result<IpAddr, PoolError> {
        // a stale entry under the same key goes back to the free set first,
        // keeping free/allocated a strict partition even on caller misuse
        self.release(port, segment);
        let offset = match self.released.pop_first() {
            Some(offset) => offset,
            None => loop {
                if self.cursor >= self.total {
                    return Err(PoolError::Exhausted(self.version));
                }
                let candidate = self.cursor;
                self.cursor += 1;
                if !self.reserved.contains(&candidate) {
                    break candidate;
                }
            },
        };
        self.allocations
            .entry(port.to_string())
            .or_default()
            .insert(segment.to_string(), offset);
        let addr = self.addr_at(offset);
        debug!("allocated {addr} for ({port}, {segment})");
        Ok(addr)
    }

    /// Address previously allocated for `(port, segment)`, if any.
    #[must_use]
    pub fn lookup(&self, port: &str, segment: &str) -> Option<IpAddr> {
        self.allocations
            .get(port)?
            .get(segment)
            .map(|&offset| self.addr_at(offset))
    }

    /// Return the `(port, segment)` allocation to the free set. No-op when
    /// there is none.
    pub fn release(&mut self, port: &str, segment: &str) {
        let Some(per_port) = self.allocations.get_mut(port) else {
            return;
        };
        if let Some(offset) = per_port.remove(segment) {
            self.released.insert(offset);
            debug!("released address for ({port}, {segment})");
        }
        if per_port.is_empty() {
            self.allocations.remove(port);
        }
    }

    /// Release every allocation held by `port`, across all segments.
    pub fn release_all(&mut self, port: &str) {
        if let Some(per_port) = self.allocations.remove(port) {
            debug!("releasing {} address(es) held by port {port}", per_port.len());
            for offset in per_port.into_values() {
                self.released.insert(offset);
            }
        }
    }

    /// Names of the external segments `port` holds an allocation for.
    #[must_use]
    pub fn segments_for(&self, port: &str) -> BTreeSet<String> {
        self.allocations
            .get(port)
            .map(|per_port| per_port.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `addr` is currently free for allocation.
    #[must_use]
    pub fn is_free(&self, addr: &IpAddr) -> bool {
        match self.offset_of(addr) {
            Some(offset) => {
                !self.reserved.contains(&offset)
                    && (offset >= self.cursor || self.released.contains(&offset))
            }
            None => false,
        }
    }

    /// Number of addresses neither allocated nor reserved.
    #[must_use]
    pub fn free_count(&self) -> u128 {
        let allocated: u128 = self
            .allocations
            .values()
            .map(|per_port| per_port.len() as u128)
            .sum();
        self.total - allocated - self.reserved.len() as u128
    }

    /// Map `addr` to its offset in the concatenated blocks, or `None` when
    /// the address is outside the pool's address space.
    fn offset_of(&self, addr: &IpAddr) -> Option<u128> {
        let bits = match (self.version, addr) {
            (IpVersion::V4, IpAddr::V4(v4)) => u128::from(v4.to_bits()),
            (IpVersion::V6, IpAddr::V6(v6)) => v6.to_bits(),
            _ => return None,
        };
        let mut base = 0u128;
        for block in &self.blocks {
            if block.contains(bits) {
                return Some(base + (bits - block.first()));
            }
            base += block.size();
        }
        None
    }

    /// Materialize the address at `offset`. Callers guarantee
    /// `offset < self.total`.
    fn addr_at(&self, offset: u128) -> IpAddr {
        let mut rest = offset;
        for block in &self.blocks {
            if rest < block.size() {
                let bits = block.first() + rest;
                return match self.version {
                    IpVersion::V4 => {
                        let bits = u32::try_from(bits).unwrap_or_else(|_| unreachable!());
                        IpAddr::V4(Ipv4Addr::from_bits(bits))
                    }
                    IpVersion::V6 => IpAddr::V6(Ipv6Addr::from_bits(bits)),
                };
            }
            rest -= block.size();
        }
        unreachable!("offset {offset} beyond pool size {}", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v4_pool(prefixes: &[&str]) -> AddressPool {
        let nets: Vec<Ipv4Net> = prefixes.iter().map(|p| p.parse().unwrap()).collect();
        AddressPool::new_v4(&nets)
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn allocates_lowest_address_first() {
        let mut pool = v4_pool(&["203.0.113.0/30"]);
        assert_eq!(pool.allocate("a", "ext1").unwrap(), addr("203.0.113.0"));
        assert_eq!(pool.allocate("b", "ext1").unwrap(), addr("203.0.113.1"));
        assert_eq!(pool.allocate("c", "ext1").unwrap(), addr("203.0.113.2"));
        assert_eq!(pool.allocate("d", "ext1").unwrap(), addr("203.0.113.3"));
        assert_eq!(
            pool.allocate("e", "ext1").unwrap_err(),
            PoolError::Exhausted(IpVersion::V4)
        );
    }

    #[test]
    fn allocation_spans_blocks_in_address_order() {
        let mut pool = v4_pool(&["10.0.0.4/31", "10.0.0.0/31"]);
        assert_eq!(pool.allocate("a", "s").unwrap(), addr("10.0.0.0"));
        assert_eq!(pool.allocate("b", "s").unwrap(), addr("10.0.0.1"));
        assert_eq!(pool.allocate("c", "s").unwrap(), addr("10.0.0.4"));
        assert_eq!(pool.allocate("d", "s").unwrap(), addr("10.0.0.5"));
    }

    #[test]
    fn reserved_address_is_never_allocated() {
        let mut pool = v4_pool(&["169.254.169.252/30"]);
        pool.reserve(addr("169.254.169.254"));
        assert_eq!(pool.free_count(), 3);
        assert!(!pool.is_free(&addr("169.254.169.254")));
        assert_eq!(pool.allocate("a", "s").unwrap(), addr("169.254.169.252"));
        assert_eq!(pool.allocate("b", "s").unwrap(), addr("169.254.169.253"));
        assert_eq!(pool.allocate("c", "s").unwrap(), addr("169.254.169.255"));
        assert!(pool.allocate("d", "s").is_err());
    }

    #[test]
    fn reserve_outside_pool_is_silent() {
        let mut pool = v4_pool(&["203.0.113.0/30"]);
        pool.reserve(addr("169.254.169.254"));
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn released_address_is_reused_lowest_first() {
        let mut pool = v4_pool(&["203.0.113.0/30"]);
        pool.allocate("a", "s").unwrap();
        let b = pool.allocate("b", "s").unwrap();
        pool.allocate("c", "s").unwrap();
        pool.release("b", "s");
        assert!(pool.is_free(&b));
        assert_eq!(pool.allocate("d", "s").unwrap(), b);
    }

    #[test]
    fn release_is_a_noop_without_an_allocation() {
        let mut pool = v4_pool(&["203.0.113.0/30"]);
        pool.release("nobody", "nowhere");
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn release_all_restores_free_count() {
        let mut pool = v4_pool(&["203.0.113.0/29"]);
        let before = pool.free_count();
        pool.allocate("a", "ext1").unwrap();
        pool.allocate("a", "ext2").unwrap();
        pool.allocate("b", "ext1").unwrap();
        pool.release_all("a");
        assert_eq!(pool.free_count(), before - 1);
        assert!(pool.segments_for("a").is_empty());
        assert_eq!(pool.segments_for("b").len(), 1);
    }

    #[test]
    fn lookup_is_stable_and_allocation_is_per_segment() {
        let mut pool = v4_pool(&["203.0.113.0/30"]);
        let first = pool.allocate("a", "ext1").unwrap();
        assert_eq!(pool.lookup("a", "ext1"), Some(first));
        let second = pool.allocate("a", "ext2").unwrap();
        assert_ne!(first, second);
        assert_eq!(
            pool.segments_for("a"),
            BTreeSet::from(["ext1".to_string(), "ext2".to_string()])
        );
    }

    #[test]
    fn reallocating_the_same_key_returns_the_same_address() {
        let mut pool = v4_pool(&["203.0.113.0/30"]);
        let first = pool.allocate("a", "ext1").unwrap();
        let again = pool.allocate("a", "ext1").unwrap();
        assert_eq!(first, again);
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn v6_pool_allocates_without_materializing_the_range() {
        let nets: Vec<Ipv6Net> = vec!["fe80::/64".parse().unwrap()];
        let mut pool = AddressPool::new_v6(&nets);
        assert_eq!(pool.allocate("a", "s").unwrap(), addr("fe80::"));
        assert_eq!(pool.allocate("b", "s").unwrap(), addr("fe80::1"));
        assert_eq!(pool.free_count(), (1u128 << 64) - 2);
    }

    #[test]
    fn version_mismatch_is_not_free() {
        let pool = v4_pool(&["203.0.113.0/30"]);
        assert!(!pool.is_free(&addr("fe80::1")));
    }
}
