//! Entry-point registry for provisioner implementations.
//!
//! Provisioners are discovered under one well-known extension-point group;
//! each entry maps a registered name to a builder. Statically linked
//! backends register themselves here at startup, and the factory scans the
//! group once per process lifetime. Names are case-insensitive: they are
//! normalized to lowercase on insert and lookup.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use kernelhost_protocols::error::ProvisioningError;
use kernelhost_protocols::provisioner::{KernelProvisioner, LaunchContext};

use crate::local;

/// The well-known extension-point group for kernel provisioners.
pub const PROVISIONER_GROUP: &str = "kernelhost.provisioners";

/// Constructor for one provisioner implementation.
///
/// Every call produces a fresh instance: provisioners are stateful and
/// never shared across kernels.
pub trait ProvisionerBuilder: Send + Sync {
    fn build(
        &self,
        kernel_id: &str,
        config: &serde_json::Map<String, serde_json::Value>,
        context: Arc<dyn LaunchContext>,
    ) -> Result<Box<dyn KernelProvisioner>, ProvisioningError>;
}

/// A (name, group, builder) registration.
#[derive(Clone)]
pub struct EntryPoint {
    name: String,
    group: String,
    builder: Arc<dyn ProvisionerBuilder>,
}

impl EntryPoint {
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        builder: Arc<dyn ProvisionerBuilder>,
    ) -> Self {
        Self {
            name: name.into().to_lowercase(),
            group: group.into(),
            builder,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn builder(&self) -> Arc<dyn ProvisionerBuilder> {
        self.builder.clone()
    }
}

impl std::fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("group", &self.group)
            .finish()
    }
}

/// Registry of provisioner entry points, keyed by (group, name).
pub struct EntryPointRegistry {
    entries: DashMap<String, EntryPoint>,
}

impl EntryPointRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn key(group: &str, name: &str) -> String {
        format!("{}:{}", group, name.to_lowercase())
    }

    /// Register an entry point.
    ///
    /// Returns an error if the group already holds an entry for the name.
    pub fn register(&self, entry: EntryPoint) -> Result<(), ProvisioningError> {
        let key = Self::key(entry.group(), entry.name());
        if self.entries.contains_key(&key) {
            return Err(ProvisioningError::AlreadyRegistered(entry.name().to_string()));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Look up one entry point by group and name.
    pub fn find(&self, group: &str, name: &str) -> Option<EntryPoint> {
        self.entries.get(&Self::key(group, name)).map(|e| e.clone())
    }

    /// All entry points registered under a group.
    pub fn entries(&self, group: &str) -> Vec<EntryPoint> {
        self.entries
            .iter()
            .filter(|e| e.group() == group)
            .map(|e| e.clone())
            .collect()
    }

    /// Check whether a name is registered under a group.
    pub fn contains(&self, group: &str, name: &str) -> bool {
        self.entries.contains_key(&Self::key(group, name))
    }
}

impl Default for EntryPointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_ENTRY_POINTS: Lazy<Arc<EntryPointRegistry>> = Lazy::new(|| {
    let registry = EntryPointRegistry::new();
    // Fresh registry: the built-in registration cannot collide.
    let _ = registry.register(local::local_entry_point());
    Arc::new(registry)
});

/// The process-wide entry-point table. The local provisioner is the only
/// built-in entry; third-party backends register here before (or after -
/// late registration is supported) the factory's first discovery pass.
pub fn global_entry_points() -> Arc<EntryPointRegistry> {
    GLOBAL_ENTRY_POINTS.clone()
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
