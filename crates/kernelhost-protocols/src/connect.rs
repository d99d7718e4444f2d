//! Kernel connection information.
//!
//! The connection-info file format is owned by the kernel manager, not by
//! this subsystem. At this boundary the info is an opaque mapping produced
//! when the manager materializes the connection artifact during
//! `pre_launch` and handed back to it from `launch_kernel`.

/// Opaque kernel connection information (transport, ports, key, ...).
pub type ConnectionInfo = serde_json::Map<String, serde_json::Value>;
