//! # Kernelhost Protocols
//!
//! Core protocol definitions (traits) for the kernelhost provisioning
//! subsystem. Contains only interface definitions and shared data types -
//! no implementations.
//!
//! ## Core Traits
//!
//! - [`KernelProvisioner`] - Lifecycle contract every provisioning strategy implements
//! - [`LaunchContext`] - The owning kernel manager's side of the launch handshake

pub mod connect;
pub mod error;
pub mod kernelspec;
pub mod provisioner;

pub use connect::ConnectionInfo;
pub use error::{LaunchError, ProvisioningError};
pub use kernelspec::{KernelSpec, ProvisionerSpec, PROVISIONER_METADATA_KEY};
pub use provisioner::{
    KernelProvisioner, LaunchContext, LaunchOptions, LaunchPlan, SignalKind, StreamTarget,
    WAIT_POLL_INTERVAL,
};
