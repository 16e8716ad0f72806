// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! External-segment registry.
//!
//! An external segment is a named routed domain reachable via SNAT. The
//! registry holds each segment's configured address range and gateway, and
//! the next-hop interface/MAC once the SNAT manager has established it.
//! Next-hop state is resolved lazily on first use and cleared when the last
//! port depending on the segment goes away.

#![deny(clippy::all)]
#![deny(rustdoc::all)]

mod nexthop;
mod registry;

pub use nexthop::ExtSegNextHop;
pub use registry::ExternalSegmentRegistry;
