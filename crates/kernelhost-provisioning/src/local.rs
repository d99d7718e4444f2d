//! The local provisioner: one local child process per kernel.

use std::any::Any;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use kernelhost_launcher::{launch_kernel_async, KernelProcess, LaunchSpec};
use kernelhost_protocols::connect::ConnectionInfo;
use kernelhost_protocols::error::ProvisioningError;
use kernelhost_protocols::provisioner::{
    KernelProvisioner, LaunchContext, LaunchOptions, LaunchPlan, SignalKind, StreamTarget,
    WAIT_POLL_INTERVAL,
};

use crate::registry::{EntryPoint, ProvisionerBuilder, PROVISIONER_GROUP};

/// Registered name of the built-in local provisioner.
pub const LOCAL_PROVISIONER_NAME: &str = "local-provisioner";

/// Default provisioner: manages one local kernel process and its process
/// group through the kernelhost launcher.
///
/// The provisioner holds a back-reference to its owning kernel manager as
/// a [`LaunchContext`]: `pre_launch` asks it to materialize the connection
/// artifact and produce the concrete argv, and saves the full option set so
/// a restart can rerun the sequence without the manager resupplying
/// anything.
pub struct LocalProvisioner {
    kernel_id: String,
    context: Arc<dyn LaunchContext>,
    process: Option<KernelProcess>,
    pid: Option<u32>,
    pgid: Option<i32>,
    connection_info: ConnectionInfo,
    launch_options: Option<LaunchOptions>,
}

impl LocalProvisioner {
    /// Create a provisioner bound to one kernel, not yet launched.
    pub fn new(kernel_id: impl Into<String>, context: Arc<dyn LaunchContext>) -> Self {
        Self {
            kernel_id: kernel_id.into(),
            context,
            process: None,
            pid: None,
            pgid: None,
            connection_info: ConnectionInfo::new(),
            launch_options: None,
        }
    }

    /// Process id of the most recently launched kernel, if any.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Process-group id recorded at launch (POSIX only).
    pub fn pgid(&self) -> Option<i32> {
        self.pgid
    }

    /// The launch options saved by the first `pre_launch`, reused on
    /// restart. Cleared by a final (non-restart) `cleanup`.
    pub fn saved_launch_options(&self) -> Option<&LaunchOptions> {
        self.launch_options.as_ref()
    }

    fn stdio_for(target: StreamTarget) -> Option<Stdio> {
        match target {
            StreamTarget::Unspecified => None,
            StreamTarget::Piped => Some(Stdio::piped()),
            StreamTarget::Null => Some(Stdio::null()),
        }
    }

    fn launch_spec(plan: LaunchPlan) -> LaunchSpec {
        let LaunchPlan { argv, options } = plan;
        let mut spec = LaunchSpec::new(argv).independent(options.independent);
        if let Some(env) = options.env {
            spec = spec.with_env(env);
        }
        if let Some(cwd) = options.cwd {
            spec = spec.with_cwd(cwd);
        }
        if let Some(stdin) = Self::stdio_for(options.stdin) {
            spec = spec.with_stdin(stdin);
        }
        if let Some(stdout) = Self::stdio_for(options.stdout) {
            spec = spec.with_stdout(stdout);
        }
        if let Some(stderr) = Self::stdio_for(options.stderr) {
            spec = spec.with_stderr(stderr);
        }
        spec
    }
}

#[async_trait]
impl KernelProvisioner for LocalProvisioner {
    fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    fn has_process(&self) -> bool {
        self.process.is_some()
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.connection_info.clone()
    }

    async fn pre_launch(
        &mut self,
        options: LaunchOptions,
    ) -> Result<LaunchPlan, ProvisioningError> {
        self.connection_info = self.context.prepare_connection().await?;
        let argv = self.context.kernel_command(&options.extra_arguments);
        // Saved for restart use.
        self.launch_options = Some(options.clone());
        Ok(LaunchPlan { argv, options })
    }

    async fn launch_kernel(
        &mut self,
        plan: LaunchPlan,
    ) -> Result<ConnectionInfo, ProvisioningError> {
        let process = launch_kernel_async(Self::launch_spec(plan)).await?;
        self.pid = Some(process.pid());
        #[cfg(unix)]
        {
            self.pgid = process.pgid();
        }
        debug!(
            kernel_id = %self.kernel_id,
            pid = process.pid(),
            pgid = ?self.pgid,
            "Kernel launched"
        );
        self.process = Some(process);
        Ok(self.connection_info.clone())
    }

    async fn poll(&mut self) -> Result<Option<i32>, ProvisioningError> {
        match self.process.as_mut() {
            Some(process) => Ok(process.poll().map_err(ProvisioningError::Launch)?),
            None => Ok(Some(0)),
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>, ProvisioningError> {
        let Some(process) = self.process.as_mut() else {
            return Ok(Some(0));
        };
        let code = loop {
            match process.poll().map_err(ProvisioningError::Launch)? {
                Some(code) => break code,
                None => tokio::time::sleep(WAIT_POLL_INTERVAL).await,
            }
        };
        // Process is no longer alive: release the stdio handles and clear
        // the reference.
        process.close_streams();
        self.process = None;
        Ok(Some(code))
    }

    async fn send_signal(&mut self, signal: SignalKind) -> Result<(), ProvisioningError> {
        let Some(process) = self.process.as_mut() else {
            return Ok(());
        };

        #[cfg(unix)]
        {
            let signum = match signal {
                SignalKind::Interrupt => libc::SIGINT,
                SignalKind::Terminate => libc::SIGTERM,
                SignalKind::Kill => libc::SIGKILL,
                SignalKind::Raw(n) => n,
            };
            kernelhost_launcher::send_posix_signal(process.pid(), self.pgid, signum)
                .map_err(ProvisioningError::Launch)
        }
        #[cfg(not(unix))]
        {
            // Interrupts never travel as native signals here; the interrupt
            // event is the only delivery channel.
            let result = match signal {
                SignalKind::Interrupt => process.interrupt(),
                SignalKind::Terminate => process.terminate(),
                SignalKind::Kill => process.kill(),
                SignalKind::Raw(n) => Err(
                    kernelhost_protocols::error::LaunchError::Signal(format!(
                        "raw signal {} is not supported on this platform",
                        n
                    )),
                ),
            };
            result.map_err(ProvisioningError::Launch)
        }
    }

    async fn kill(&mut self, restart: bool) -> Result<(), ProvisioningError> {
        let _ = restart;
        if let Some(process) = self.process.as_mut() {
            process.kill().map_err(ProvisioningError::Launch)?;
        }
        Ok(())
    }

    async fn terminate(&mut self, restart: bool) -> Result<(), ProvisioningError> {
        let _ = restart;
        if let Some(process) = self.process.as_mut() {
            process.terminate().map_err(ProvisioningError::Launch)?;
        }
        Ok(())
    }

    async fn cleanup(&mut self, restart: bool) -> Result<(), ProvisioningError> {
        self.context.cleanup_connection(restart).await?;
        if !restart {
            self.launch_options = None;
            self.pid = None;
            self.pgid = None;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct LocalProvisionerBuilder;

impl ProvisionerBuilder for LocalProvisionerBuilder {
    fn build(
        &self,
        kernel_id: &str,
        config: &serde_json::Map<String, serde_json::Value>,
        context: Arc<dyn LaunchContext>,
    ) -> Result<Box<dyn KernelProvisioner>, ProvisioningError> {
        // The local provisioner declares no config surface.
        if !config.is_empty() {
            debug!(kernel_id, "Local provisioner ignores config entries");
        }
        Ok(Box::new(LocalProvisioner::new(kernel_id, context)))
    }
}

pub(crate) fn local_entry_point() -> EntryPoint {
    EntryPoint::new(
        LOCAL_PROVISIONER_NAME,
        PROVISIONER_GROUP,
        Arc::new(LocalProvisionerBuilder),
    )
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
