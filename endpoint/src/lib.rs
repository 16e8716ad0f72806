// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Persisted endpoint records.
//!
//! The policy-enforcing virtual switch picks endpoints up from a directory of
//! JSON records, one file per endpoint key. This crate owns the record model
//! and the directory-backed store the mapper writes through.

#![deny(clippy::all)]
#![deny(rustdoc::all)]

mod descriptor;
mod store;

pub use descriptor::{
    EndpointAttributes, EndpointDescriptor, IpAddressMapping, endpoint_group_name,
};
pub use store::{EndpointFileStore, RECORD_SUFFIX, StoreError};
