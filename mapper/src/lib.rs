// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Port-to-endpoint mapping.
//!
//! This crate is the orchestrator of the agent: it turns a port's policy
//! binding into a persisted endpoint record, allocates and releases
//! intermediate floating IPs for segment-based SNAT, and keeps the
//! per-segment usage accounting that drives SNAT setup and teardown. The
//! host virtual-switch agent feeds it port lifecycle events one at a time;
//! all shared state lives inside [`PortEndpointMapper`] and is only mutated
//! on that synchronous path.

#![deny(clippy::all)]
#![deny(rustdoc::all)]

mod mapper;
mod port;


pub use mapper::PortEndpointMapper;
pub use port::{
    DeviceOwner, FloatingIpEntry, OVERLAY_NETWORK_TYPE, PolicyBinding, PortInfo, SegmentNatRule,
};

use config::ConfigError;
use endpoint::StoreError;
use thiserror::Error;

/// Hard failures of a single port's reconciliation. Everything softer
/// (malformed rules, exhausted pools, SNAT trouble) is logged and skipped so
/// the port's record still gets written.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("invalid agent configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("endpoint record store failure: {0}")]
    Record(#[from] StoreError),
}
