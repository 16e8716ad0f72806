// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A recording fake for code that drives the SNAT lifecycle.

use crate::{SnatBinding, SnatLifecycle, SnatRanges, SnatSetupError, SnatTeardownError};
use mac_address::MacAddress;
use std::collections::BTreeSet;

/// Records every call and answers with deterministic bindings. Failures can
/// be injected per segment through the `fail_*` sets.
#[derive(Debug, Default)]
pub struct RecordingSnat {
    pub setup_calls: Vec<String>,
    pub teardown_calls: Vec<String>,
    pub cleanup_all_calls: usize,
    pub fail_setup: BTreeSet<String>,
    pub fail_teardown: BTreeSet<String>,
}

impl RecordingSnat {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The binding `setup` answers with for `segment`: a service interface
    /// named after the segment and a locally-administered MAC derived from
    /// its name.
    #[must_use]
    pub fn binding_for(segment: &str) -> SnatBinding {
        let mut mac = [0x02, 0x42, 0, 0, 0, 0];
        for (i, byte) in segment.bytes().enumerate() {
            mac[2 + i % 4] ^= byte;
        }
        SnatBinding {
            interface: format!("of-svc-{segment}"),
            mac: MacAddress::new(mac),
        }
    }
}

impl SnatLifecycle for RecordingSnat {
    fn setup(
        &mut self,
        segment: &str,
        _ranges: &SnatRanges,
    ) -> Result<SnatBinding, SnatSetupError> {
        self.setup_calls.push(segment.to_string());
        if self.fail_setup.contains(segment) {
            return Err(SnatSetupError::Failed(
                segment.to_string(),
                "injected failure".to_string(),
            ));
        }
        Ok(Self::binding_for(segment))
    }

    fn teardown(&mut self, segment: &str) -> Result<(), SnatTeardownError> {
        self.teardown_calls.push(segment.to_string());
        if self.fail_teardown.contains(segment) {
            return Err(SnatTeardownError::Failed(
                segment.to_string(),
                "injected failure".to_string(),
            ));
        }
        Ok(())
    }

    fn cleanup_all(&mut self) -> Result<(), SnatTeardownError> {
        self.cleanup_all_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_are_deterministic_per_segment() {
        assert_eq!(
            RecordingSnat::binding_for("ext1"),
            RecordingSnat::binding_for("ext1")
        );
        assert_ne!(
            RecordingSnat::binding_for("ext1").mac,
            RecordingSnat::binding_for("ext2").mac
        );
        assert_eq!(RecordingSnat::binding_for("ext1").interface, "of-svc-ext1");
    }

    #[test]
    fn injected_setup_failure_is_reported() {
        let mut snat = RecordingSnat::new();
        snat.fail_setup.insert("ext1".to_string());
        assert!(snat.setup("ext1", &SnatRanges::default()).is_err());
        assert!(snat.setup("ext2", &SnatRanges::default()).is_ok());
        assert_eq!(snat.setup_calls, ["ext1", "ext2"]);
    }
}
