//! The kernel provisioner factory.
//!
//! Process-wide registry mapping provisioner names to builders. The
//! entry-point group is scanned exactly once per process lifetime and
//! cached; a later lookup for a name absent from that initial cache falls
//! back to a one-off fresh scan of the table, so backends registered after
//! startup still resolve without invalidating the rest of the cache.

use std::sync::Arc;
use std::sync::Once;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use kernelhost_protocols::error::ProvisioningError;
use kernelhost_protocols::kernelspec::KernelSpec;
use kernelhost_protocols::provisioner::{KernelProvisioner, LaunchContext};

use crate::local::LOCAL_PROVISIONER_NAME;
use crate::registry::{global_entry_points, EntryPointRegistry, ProvisionerBuilder, PROVISIONER_GROUP};

/// Environment variable overriding the default provisioner name.
pub const DEFAULT_PROVISIONER_ENV: &str = "KERNELHOST_DEFAULT_PROVISIONER";

/// Resolves provisioner names to fresh provisioner instances.
///
/// Use [`ProvisionerFactory::global`] for the process-wide instance backed
/// by the global entry-point table; standalone instances over a private
/// table exist for embedding and tests.
pub struct ProvisionerFactory {
    entry_points: Arc<EntryPointRegistry>,
    cache: DashMap<String, Arc<dyn ProvisionerBuilder>>,
    discovery: Once,
    default_name: RwLock<String>,
}

impl ProvisionerFactory {
    /// Create a factory over the given entry-point table.
    ///
    /// The default provisioner name starts as `local-provisioner`, or the
    /// value of [`DEFAULT_PROVISIONER_ENV`] when set.
    pub fn new(entry_points: Arc<EntryPointRegistry>) -> Self {
        let default_name = std::env::var(DEFAULT_PROVISIONER_ENV)
            .map(|name| name.to_lowercase())
            .unwrap_or_else(|_| LOCAL_PROVISIONER_NAME.to_string());
        Self {
            entry_points,
            cache: DashMap::new(),
            discovery: Once::new(),
            default_name: RwLock::new(default_name),
        }
    }

    /// The process-wide factory over the global entry-point table.
    pub fn global() -> &'static ProvisionerFactory {
        static INSTANCE: Lazy<ProvisionerFactory> =
            Lazy::new(|| ProvisionerFactory::new(global_entry_points()));
        &INSTANCE
    }

    /// Name used when a kernel spec declares no provisioner.
    pub fn default_provisioner_name(&self) -> String {
        self.default_name.read().clone()
    }

    /// Change the default provisioner name.
    pub fn set_default_provisioner_name(&self, name: &str) {
        *self.default_name.write() = name.to_lowercase();
    }

    /// One-time discovery pass over the entry-point group. Guarded so
    /// concurrent first use populates the cache exactly once.
    fn ensure_discovered(&self) {
        self.discovery.call_once(|| {
            for entry in self.entry_points.entries(PROVISIONER_GROUP) {
                self.cache.insert(entry.name().to_string(), entry.builder());
            }
            info!(count = self.cache.len(), "Discovered kernel provisioners");
        });
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn ProvisionerBuilder>, ProvisioningError> {
        self.ensure_discovered();
        let key = name.to_lowercase();
        if let Some(builder) = self.cache.get(&key) {
            return Ok(builder.clone());
        }
        // One-off fresh lookup: supports backends registered after the
        // initial discovery pass.
        if let Some(entry) = self.entry_points.find(PROVISIONER_GROUP, &key) {
            let builder = entry.builder();
            self.cache.insert(key, builder.clone());
            debug!(name, "Provisioner registered after initial discovery");
            return Ok(builder);
        }
        Err(ProvisioningError::NoSuchProvisioner(name.to_string()))
    }

    /// Resolve a name and build a fresh provisioner instance bound to one
    /// kernel. Every call yields a new instance.
    pub fn get_provisioner(
        &self,
        name: &str,
        kernel_id: &str,
        config: &serde_json::Map<String, serde_json::Value>,
        context: Arc<dyn LaunchContext>,
    ) -> Result<Box<dyn KernelProvisioner>, ProvisioningError> {
        self.resolve(name)?.build(kernel_id, config, context)
    }

    /// Whether the provisioner a kernel spec names (or the default, when it
    /// names none) is resolvable. Callers are expected to surface a false
    /// result as "this kernel is unusable", not as a registry error.
    pub fn is_provisioner_available(&self, kernel_name: &str, spec: &KernelSpec) -> bool {
        let name = match spec.provisioner_spec() {
            Ok(block) => block
                .and_then(|b| b.provisioner_name)
                .unwrap_or_else(|| self.default_provisioner_name()),
            Err(e) => {
                warn!(kernel = kernel_name, error = %e, "Malformed provisioner metadata");
                return false;
            }
        };
        let available = self.resolve(&name).is_ok();
        if !available {
            warn!(
                kernel = kernel_name,
                provisioner = %name,
                "Kernel is not usable: its provisioner is not available"
            );
        }
        available
    }

    /// Build the provisioner instance for a kernel spec: the spec's
    /// `kernel_provisioner` metadata block names the implementation and
    /// carries its config; both are optional and default to the factory's
    /// default name and an empty config.
    pub fn create_provisioner_instance(
        &self,
        kernel_id: &str,
        spec: &KernelSpec,
        context: Arc<dyn LaunchContext>,
    ) -> Result<Box<dyn KernelProvisioner>, ProvisioningError> {
        let block = spec.provisioner_spec()?.unwrap_or_default();
        let name = block
            .provisioner_name
            .unwrap_or_else(|| self.default_provisioner_name());
        self.get_provisioner(&name, kernel_id, &block.config, context)
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
