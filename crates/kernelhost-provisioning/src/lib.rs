//! # Kernelhost Provisioning
//!
//! Provisioner strategies and their factory.
//!
//! A kernel manager resolves "how do I start/stop/restart this kernel" to a
//! named provisioner through [`ProvisionerFactory`]; implementations
//! register in the process-wide entry-point table under
//! [`PROVISIONER_GROUP`]. [`LocalProvisioner`] - one local child process per
//! kernel, launched through `kernelhost-launcher` - is the built-in default.

pub mod factory;
pub mod local;
pub mod registry;

pub use factory::{ProvisionerFactory, DEFAULT_PROVISIONER_ENV};
pub use local::{LocalProvisioner, LOCAL_PROVISIONER_NAME};
pub use registry::{
    global_entry_points, EntryPoint, EntryPointRegistry, ProvisionerBuilder, PROVISIONER_GROUP,
};
