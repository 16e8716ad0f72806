// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Allocatable address pools for intermediate floating IPs.
//!
//! A pool hands out one address per `(port, external segment)` pair from a set
//! of configured CIDR blocks. Blocks are kept as `(first address, size)` pairs
//! and addresses are materialized from offsets on demand, so a pool over
//! `fe80::/64` costs the same as one over a `/30`.

#![deny(clippy::all)]
#![deny(rustdoc::all)]

use std::fmt;
use std::net::IpAddr;

mod allocator;
mod blocks;

pub use allocator::AddressPool;

/// IP version a pool serves. One [`AddressPool`] instance serves exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    #[must_use]
    pub fn of(addr: &IpAddr) -> IpVersion {
        match addr {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

/// Error type for [`AddressPool`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("no free {0} address left in the pool")]
    Exhausted(IpVersion),
}
