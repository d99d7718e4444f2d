//! The kernel provisioner lifecycle contract.
//!
//! A provisioner is a strategy object bound 1:1 to one kernel's process and
//! drives it through `unlaunched -> launching -> running -> exited`. The
//! owning kernel manager resolves a provisioner by name through the factory,
//! then calls [`KernelProvisioner::pre_launch`] and
//! [`KernelProvisioner::launch_kernel`] to start the kernel and the
//! remaining operations to poll, signal, restart, and stop it.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::connect::ConnectionInfo;
use crate::error::ProvisioningError;

/// Interval used by cooperative `wait` loops while polling for child exit.
///
/// A bounded-interval retry loop is used instead of a blocking OS wait so a
/// waiting task suspends without tying up a thread, and abandoning the wait
/// is simply dropping the task.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Signal kinds a provisioner can deliver to its kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGINT-equivalent. On platforms without native signal delivery this
    /// is routed through the interrupt event, never as a raw signal.
    Interrupt,
    /// Graceful stop (SIGTERM-equivalent).
    Terminate,
    /// Forceful stop (SIGKILL-equivalent).
    Kill,
    /// A raw POSIX signal number.
    Raw(i32),
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Interrupt => write!(f, "INTERRUPT"),
            SignalKind::Terminate => write!(f, "TERMINATE"),
            SignalKind::Kill => write!(f, "KILL"),
            SignalKind::Raw(n) => write!(f, "SIG({})", n),
        }
    }
}

/// Requested disposition for one of the kernel's standard streams.
///
/// `Unspecified` defers to the launcher's stream-safety rules: stdin is
/// always substituted with a pipe, stdout/stderr are inherited unless the
/// parent has no usable console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamTarget {
    #[default]
    Unspecified,
    Piped,
    Null,
}

/// Options the kernel manager passes to `pre_launch`.
///
/// The full set is saved by the provisioner on first use so a restart can
/// rerun `pre_launch` without the manager resupplying anything.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Extra command-line arguments appended to the kernel command.
    pub extra_arguments: Vec<String>,
    /// Environment for the kernel; the parent environment is copied when
    /// absent. Never mutated in place across launches.
    pub env: Option<HashMap<String, String>>,
    /// Working directory for the kernel process.
    pub cwd: Option<PathBuf>,
    /// When set, the kernel survives its parent's death and no
    /// parent-identifying value is injected into its environment.
    pub independent: bool,
    pub stdin: StreamTarget,
    pub stdout: StreamTarget,
    pub stderr: StreamTarget,
}

/// The assembled launch arguments returned by `pre_launch` and consumed by
/// `launch_kernel`: the concrete argv plus the options it was built from.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub argv: Vec<String>,
    pub options: LaunchOptions,
}

/// The owning kernel manager's side of the launch handshake.
///
/// Provisioners hold this as a back-reference (not an ownership relation) so
/// `pre_launch` can ask the manager to materialize connection artifacts and
/// produce the concrete kernel command.
#[async_trait]
pub trait LaunchContext: Send + Sync {
    /// Materialize the connection artifact (ports file, key, ...) and return
    /// its info.
    async fn prepare_connection(&self) -> Result<ConnectionInfo, ProvisioningError>;

    /// Build the concrete kernel argv with the given extra arguments merged.
    fn kernel_command(&self, extra_arguments: &[String]) -> Vec<String>;

    /// Release the connection artifact. `restart` indicates the kernel is
    /// about to be relaunched and the artifact may be kept.
    async fn cleanup_connection(&self, restart: bool) -> Result<(), ProvisioningError> {
        let _ = restart;
        Ok(())
    }
}

/// Lifecycle contract every provisioning strategy implements.
///
/// All operations are safe to call when no process is held: `poll`, `wait`,
/// `send_signal`, `kill`, and `terminate` return a neutral success value in
/// that case, so callers never have to check [`has_process`] first.
///
/// [`has_process`]: KernelProvisioner::has_process
#[async_trait]
pub trait KernelProvisioner: Send + Sync {
    /// Identifier of the kernel this provisioner is bound to.
    fn kernel_id(&self) -> &str;

    /// True iff a process handle is currently held and not yet reaped.
    fn has_process(&self) -> bool;

    /// Connection info captured during the most recent `pre_launch`.
    fn connection_info(&self) -> ConnectionInfo;

    /// Validate and augment launch options, materialize connection
    /// artifacts, and resolve the concrete argv. Saves the full option set
    /// for restart; safe to call again with the previously saved options.
    async fn pre_launch(
        &mut self,
        options: LaunchOptions,
    ) -> Result<LaunchPlan, ProvisioningError>;

    /// Spawn the kernel process from an assembled plan. Returns the
    /// connection info captured during `pre_launch`.
    async fn launch_kernel(
        &mut self,
        plan: LaunchPlan,
    ) -> Result<ConnectionInfo, ProvisioningError>;

    /// Hook invoked by the manager after a successful launch.
    async fn post_launch(&mut self) -> Result<(), ProvisioningError> {
        Ok(())
    }

    /// Non-blocking liveness check: `None` while the process is running,
    /// the raw OS exit code once it has exited.
    async fn poll(&mut self) -> Result<Option<i32>, ProvisioningError>;

    /// Suspend until the process exits, then release its stdio handles and
    /// clear the held process reference. Returns the raw OS exit code.
    async fn wait(&mut self) -> Result<Option<i32>, ProvisioningError>;

    /// Deliver a signal to the kernel. Implementations should prefer
    /// process-group delivery where a group id is known so child-spawned
    /// subprocesses receive the signal too.
    async fn send_signal(&mut self, signal: SignalKind) -> Result<(), ProvisioningError>;

    /// Forcefully stop the kernel. `restart` is informational: a relaunch
    /// with the saved options will follow.
    async fn kill(&mut self, restart: bool) -> Result<(), ProvisioningError>;

    /// Gracefully stop the kernel. `restart` as for [`kill`].
    ///
    /// [`kill`]: KernelProvisioner::kill
    async fn terminate(&mut self, restart: bool) -> Result<(), ProvisioningError>;

    /// Hook invoked by the manager before it begins a graceful shutdown.
    async fn shutdown_requested(&mut self, restart: bool) -> Result<(), ProvisioningError> {
        let _ = restart;
        Ok(())
    }

    /// Release provisioner-owned resources not already released by `wait`.
    /// Must be safe to call when no process was ever launched.
    async fn cleanup(&mut self, restart: bool) -> Result<(), ProvisioningError>;

    /// How long the manager should wait for this kernel to shut down.
    /// Implementations backed by slow transports may scale the
    /// recommendation; the default returns it unchanged.
    fn shutdown_wait_time(&self, recommended: Duration) -> Duration {
        recommended
    }

    /// Returns a reference to the provisioner as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn KernelProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelProvisioner")
            .field("kernel_id", &self.kernel_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kind_display() {
        assert_eq!(SignalKind::Interrupt.to_string(), "INTERRUPT");
        assert_eq!(SignalKind::Terminate.to_string(), "TERMINATE");
        assert_eq!(SignalKind::Kill.to_string(), "KILL");
        assert_eq!(SignalKind::Raw(10).to_string(), "SIG(10)");
    }

    #[test]
    fn test_stream_target_default() {
        assert_eq!(StreamTarget::default(), StreamTarget::Unspecified);
    }

    #[test]
    fn test_launch_options_default() {
        let options = LaunchOptions::default();
        assert!(options.extra_arguments.is_empty());
        assert!(options.env.is_none());
        assert!(options.cwd.is_none());
        assert!(!options.independent);
    }

    #[test]
    fn test_launch_plan_clone_preserves_options() {
        let plan = LaunchPlan {
            argv: vec!["kernel".to_string()],
            options: LaunchOptions {
                extra_arguments: vec!["--debug".to_string()],
                independent: true,
                ..Default::default()
            },
        };
        let cloned = plan.clone();
        assert_eq!(cloned.argv, plan.argv);
        assert_eq!(cloned.options.extra_arguments, plan.options.extra_arguments);
        assert!(cloned.options.independent);
    }
}
