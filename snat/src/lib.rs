// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface to the SNAT next-hop lifecycle manager.
//!
//! The firewall-rule manager that realizes SNAT for an external segment lives
//! outside this core; the mapper only needs to establish and tear down the
//! per-segment next hop. This crate is the seam: a narrow trait the host
//! implements, with the value types that cross it.

#![deny(clippy::all)]
#![deny(rustdoc::all)]

use ipnet::{Ipv4Net, Ipv6Net};
use mac_address::MacAddress;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Address ranges and gateways an external segment SNATs through. A side is
/// absent when the segment carries no configuration for that family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnatRanges {
    pub v4_start: Option<Ipv4Addr>,
    pub v4_end: Option<Ipv4Addr>,
    pub v4_gateway: Option<Ipv4Net>,
    pub v6_start: Option<Ipv6Addr>,
    pub v6_end: Option<Ipv6Addr>,
    pub v6_gateway: Option<Ipv6Net>,
}

/// An established next hop: the interface and MAC that traffic toward the
/// segment is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnatBinding {
    pub interface: String,
    pub mac: MacAddress,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnatSetupError {
    #[error("SNAT setup failed for external segment '{0}': {1}")]
    Failed(String, String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnatTeardownError {
    #[error("SNAT teardown failed for external segment '{0}': {1}")]
    Failed(String, String),
}

/// Lifecycle of per-segment SNAT resources.
///
/// `setup` is idempotent from the caller's point of view: the mapper only
/// invokes it while a segment's next hop is unresolved, and treats a failure
/// as "still unresolved, retry on the next reconciliation pass".
pub trait SnatLifecycle {
    fn setup(
        &mut self,
        segment: &str,
        ranges: &SnatRanges,
    ) -> Result<SnatBinding, SnatSetupError>;

    fn teardown(&mut self, segment: &str) -> Result<(), SnatTeardownError>;

    /// Remove every SNAT resource this manager owns. Called once at startup,
    /// before the agent rebuilds state from incoming port events.
    fn cleanup_all(&mut self) -> Result<(), SnatTeardownError>;
}
