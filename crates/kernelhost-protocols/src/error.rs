//! Error types for the kernelhost provisioning subsystem.

use thiserror::Error;

/// Errors raised while preparing or spawning a kernel process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The kernel command could not be spawned. Never retried automatically.
    #[error("Failed to run command {command:?}: {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    /// An empty argv was supplied.
    #[error("Kernel command is empty")]
    EmptyCommand,

    /// The platform interrupt event could not be created. Fatal: interrupt
    /// delivery on this platform depends entirely on the event object.
    #[error("Failed to create interrupt event: {0}")]
    InterruptSetup(String),

    /// Signal delivery failed after all fallbacks.
    #[error("Failed to deliver signal: {0}")]
    Signal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by provisioners and the provisioner factory.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// No provisioner is registered under the requested name. Consumers that
    /// resolved the name from a kernel specification are expected to report
    /// this as "kernel unusable", not as a registry error.
    #[error("No provisioner found for name: {0}")]
    NoSuchProvisioner(String),

    /// An entry point with the same name already exists in the group.
    #[error("Provisioner already registered: {0}")]
    AlreadyRegistered(String),

    /// The provisioner config block could not be applied.
    #[error("Invalid config for provisioner {name}: {reason}")]
    InvalidConfig { name: String, reason: String },

    /// Launching the kernel process failed.
    #[error("Kernel launch failed: {0}")]
    Launch(#[from] LaunchError),

    /// Connection artifact preparation failed.
    #[error("Connection setup failed: {0}")]
    Connection(String),

    /// Generic provisioning error.
    #[error("{0}")]
    Custom(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_display() {
        let err = LaunchError::Spawn {
            command: vec!["missing-kernel".to_string(), "-f".to_string()],
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("missing-kernel"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_interrupt_setup_error() {
        let err = LaunchError::InterruptSetup("access denied".to_string());
        assert!(err.to_string().contains("interrupt event"));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_no_such_provisioner_error() {
        let err = ProvisioningError::NoSuchProvisioner("missing-provisioner".to_string());
        let msg = err.to_string();
        assert!(msg.contains("No provisioner"));
        assert!(msg.contains("missing-provisioner"));
    }

    #[test]
    fn test_already_registered_error() {
        let err = ProvisioningError::AlreadyRegistered("local-provisioner".to_string());
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_invalid_config_error() {
        let err = ProvisioningError::InvalidConfig {
            name: "custom-provisioner".to_string(),
            reason: "config_var_1: expected integer".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("custom-provisioner"));
        assert!(msg.contains("expected integer"));
    }

    #[test]
    fn test_launch_error_conversion() {
        let launch = LaunchError::EmptyCommand;
        let err: ProvisioningError = launch.into();
        assert!(matches!(err, ProvisioningError::Launch(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LaunchError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }
}
