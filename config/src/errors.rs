// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reasons the agent configuration may be rejected.

use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("endpoint record directory is not set")]
    EmptyEndpointDir,
    #[error("internal floating-IP pool for {0} is empty")]
    EmptyFloatingPool(&'static str),
}

/// Result-like type for configuration validation.
pub type ConfigResult = Result<(), ConfigError>;
