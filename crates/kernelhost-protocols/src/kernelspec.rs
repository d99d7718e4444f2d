//! Kernel specification metadata consumed by the provisioner factory.
//!
//! Spec discovery and validation belong to the kernel manager; this module
//! only models the fields the provisioning subsystem reads, most notably
//! the optional `kernel_provisioner` metadata block.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ProvisioningError;

/// Metadata key under which a kernel spec declares its provisioner.
pub const PROVISIONER_METADATA_KEY: &str = "kernel_provisioner";

/// The subset of a kernel specification the provisioning subsystem consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Command template used to start the kernel.
    #[serde(default)]
    pub argv: Vec<String>,
    /// Human-readable kernel name.
    #[serde(default)]
    pub display_name: String,
    /// Extra environment entries declared by the spec.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Free-form metadata; may carry a `kernel_provisioner` block.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The `kernel_provisioner` metadata block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionerSpec {
    /// Registered provisioner name; the factory default applies when absent.
    #[serde(default)]
    pub provisioner_name: Option<String>,
    /// Arbitrary key/value config passed verbatim to the provisioner.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl KernelSpec {
    /// Parse the optional provisioner block out of the spec metadata.
    ///
    /// Returns `Ok(None)` when the spec declares no provisioner.
    pub fn provisioner_spec(&self) -> Result<Option<ProvisionerSpec>, ProvisioningError> {
        let Some(block) = self.metadata.get(PROVISIONER_METADATA_KEY) else {
            return Ok(None);
        };
        let spec = serde_json::from_value(block.clone()).map_err(|e| {
            ProvisioningError::InvalidConfig {
                name: self.display_name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some(spec))
    }
}

#[cfg(test)]
#[path = "kernelspec_tests.rs"]
mod tests;
