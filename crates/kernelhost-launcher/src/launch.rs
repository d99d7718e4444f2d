//! Kernel process launching.
//!
//! Prepares stdio, environment, and platform isolation flags for a kernel
//! child process, spawns it, and returns a [`KernelProcess`] handle. Stream
//! safety rules: stdin is always substituted with a pipe when the caller
//! supplies none (inheriting a potentially invalid stdin is never useful to
//! a kernel), and on a console-less Windows parent stdout/stderr default to
//! a discard sink because inheriting invalid console streams can deadlock
//! the child.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use tracing::{debug, error};

use kernelhost_protocols::error::LaunchError;

use crate::interrupt::{InterruptToken, PARENT_PID_ENV};
#[cfg(windows)]
use crate::interrupt::{INTERRUPT_EVENT_ENV, LEGACY_INTERRUPT_EVENT_ENV};

/// Everything needed to launch one kernel process. Consumed by the launch;
/// build a fresh spec per launch.
pub struct LaunchSpec {
    argv: Vec<String>,
    stdin: Option<Stdio>,
    stdout: Option<Stdio>,
    stderr: Option<Stdio>,
    env: Option<HashMap<String, String>>,
    cwd: Option<PathBuf>,
    independent: bool,
}

impl LaunchSpec {
    /// Create a spec for the given kernel command.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
            stdout: None,
            stderr: None,
            env: None,
            cwd: None,
            independent: false,
        }
    }

    /// Supply an explicit stdin for the kernel. When absent, a pipe is
    /// substituted and its parent-side write end is closed after the spawn.
    pub fn with_stdin(mut self, stdin: Stdio) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Supply an explicit stdout for the kernel.
    pub fn with_stdout(mut self, stdout: Stdio) -> Self {
        self.stdout = Some(stdout);
        self
    }

    /// Supply an explicit stderr for the kernel.
    pub fn with_stderr(mut self, stderr: Stdio) -> Self {
        self.stderr = Some(stderr);
        self
    }

    /// Environment for the kernel. The current process environment is
    /// copied when absent; the supplied map is owned by the spec, so the
    /// caller's own mapping is never mutated.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Working directory for the kernel process.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Launch the kernel so it survives this process's death: no
    /// parent-identifying value is injected, and on Windows the child gets
    /// its own process group.
    pub fn independent(mut self, independent: bool) -> Self {
        self.independent = independent;
        self
    }
}

/// A spawned kernel process: the live child handle, its pid, and (Windows)
/// the interrupt token created at launch time.
#[derive(Debug)]
pub struct KernelProcess {
    child: Child,
    pid: u32,
    interrupt: Option<InterruptToken>,
    stdin_substituted: bool,
}

impl KernelProcess {
    fn new(child: Child, interrupt: Option<InterruptToken>, stdin_substituted: bool) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            interrupt,
            stdin_substituted,
        }
    }

    /// OS process id of the kernel.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Process-group id of the kernel, where obtainable.
    #[cfg(unix)]
    pub fn pgid(&self) -> Option<i32> {
        nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(self.pid as i32)))
            .ok()
            .map(|pgid| pgid.as_raw())
    }

    /// Interrupt token created at launch time (Windows only).
    pub fn interrupt_token(&self) -> Option<InterruptToken> {
        self.interrupt
    }

    /// True when no stdin was supplied and a pipe was substituted. The
    /// substituted pipe's parent-side write end is already closed.
    pub fn stdin_substituted(&self) -> bool {
        self.stdin_substituted
    }

    /// Parent-side stdin handle, if one is still open.
    pub fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.child.stdin.as_mut()
    }

    /// Parent-side stdout handle, if captured.
    pub fn stdout(&mut self) -> Option<&mut ChildStdout> {
        self.child.stdout.as_mut()
    }

    /// Parent-side stderr handle, if captured.
    pub fn stderr(&mut self) -> Option<&mut ChildStderr> {
        self.child.stderr.as_mut()
    }

    /// Non-blocking exit check: `None` while running, the raw OS exit code
    /// once exited. On POSIX a signal death surfaces as the negated signal
    /// number.
    pub fn poll(&mut self) -> Result<Option<i32>, LaunchError> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    /// Forcefully kill the kernel process. Killing an already-exited
    /// process is a no-op.
    pub fn kill(&mut self) -> Result<(), LaunchError> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Gracefully stop the kernel: SIGTERM on POSIX. Windows has no
    /// graceful equivalent, so the process is killed.
    pub fn terminate(&mut self) -> Result<(), LaunchError> {
        #[cfg(unix)]
        {
            send_posix_signal(self.pid, None, libc::SIGTERM)
        }
        #[cfg(not(unix))]
        {
            self.kill()
        }
    }

    /// Deliver an interrupt to the kernel process itself: SIGINT on POSIX,
    /// the interrupt event on Windows.
    pub fn interrupt(&mut self) -> Result<(), LaunchError> {
        #[cfg(unix)]
        {
            send_posix_signal(self.pid, None, libc::SIGINT)
        }
        #[cfg(not(unix))]
        {
            match self.interrupt {
                Some(token) => crate::interrupt::signal_interrupt(token),
                None => Err(LaunchError::Signal(
                    "no interrupt event attached to this process".to_string(),
                )),
            }
        }
    }

    /// Close any parent-side stdio handles still held for the child.
    pub fn close_streams(&mut self) {
        drop(self.child.stdin.take());
        drop(self.child.stdout.take());
        drop(self.child.stderr.take());
    }
}

/// Map an exit status to the raw OS exit code. On POSIX, death by signal is
/// reported as the negated signal number, matching the convention the
/// provisioner contract surfaces unchanged.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .or_else(|| status.signal().map(|s| -s))
            .unwrap_or(-1)
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(-1)
    }
}

/// Deliver a POSIX signal, preferring the process group when a group id is
/// known so child-spawned subprocesses receive it too. Group delivery
/// failure falls back silently to per-process delivery; signaling a process
/// that no longer exists is a benign no-op.
#[cfg(unix)]
pub fn send_posix_signal(pid: u32, pgid: Option<i32>, signum: i32) -> Result<(), LaunchError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let signal = Signal::try_from(signum)
        .map_err(|e| LaunchError::Signal(format!("invalid signal {}: {}", signum, e)))?;

    if let Some(pgid) = pgid {
        match killpg(Pid::from_raw(pgid), signal) {
            Ok(()) => return Ok(()),
            Err(errno) => {
                // Lenient fallback; the errno distinguishes "group gone"
                // from other failures in the logs.
                debug!(pgid, %errno, "process-group signal failed, falling back to process delivery");
            }
        }
    }

    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!(pid, "signal target no longer exists");
            Ok(())
        }
        Err(errno) => Err(LaunchError::Signal(format!(
            "kill({}, {}) failed: {}",
            pid, signal, errno
        ))),
    }
}

/// Launch a kernel process, blocking until the spawn completes.
///
/// Returns the live process handle; on Windows the handle also owns the
/// interrupt event created for the child. Spawn failure is logged with the
/// command, the effective `PATH`, and the non-environment spawn parameters
/// (environment values may carry secrets and are never logged), then
/// propagated - no retry.
pub fn launch_kernel(spec: LaunchSpec) -> Result<KernelProcess, LaunchError> {
    let LaunchSpec {
        argv,
        stdin,
        stdout,
        stderr,
        env,
        cwd,
        independent,
    } = spec;

    if argv.is_empty() {
        return Err(LaunchError::EmptyCommand);
    }

    // Allow ~/ in the command or its arguments.
    let argv: Vec<String> = argv
        .iter()
        .map(|arg| shellexpand::tilde(arg).into_owned())
        .collect();

    let mut env = env.unwrap_or_else(|| std::env::vars().collect());

    let stdin_substituted = stdin.is_none();
    let stdin = stdin.unwrap_or_else(Stdio::piped);

    // On a console-less Windows parent, discard unsupplied output streams.
    #[cfg(windows)]
    let discard_output = !crate::interrupt::has_console();
    #[cfg(not(windows))]
    let discard_output = false;

    let stdout_supplied = stdout.is_some();
    let stderr_supplied = stderr.is_some();
    let stdout = stdout.unwrap_or_else(|| {
        if discard_output {
            Stdio::null()
        } else {
            Stdio::inherit()
        }
    });
    let stderr = stderr.unwrap_or_else(|| {
        if discard_output {
            Stdio::null()
        } else {
            Stdio::inherit()
        }
    });

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.stdin(stdin).stdout(stdout).stderr(stderr);
    if let Some(dir) = &cwd {
        cmd.current_dir(dir);
    }

    #[cfg(windows)]
    let interrupt_token = {
        use std::os::windows::process::CommandExt;

        use winapi::um::winbase::{CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW};

        // The interrupt event handle travels to the child by environment
        // variable, under the current name and the legacy alias.
        let token = crate::interrupt::prepare_interrupt()?
            .ok_or_else(|| LaunchError::InterruptSetup("no interrupt event created".to_string()))?;
        env.insert(INTERRUPT_EVENT_ENV.to_string(), token.raw().to_string());
        env.insert(LEGACY_INTERRUPT_EVENT_ENV.to_string(), token.raw().to_string());

        let mut creation_flags = 0u32;
        if independent {
            creation_flags |= CREATE_NEW_PROCESS_GROUP;
        } else {
            // An inheritable handle to this process lets the child detect
            // parent death.
            let parent_handle = crate::interrupt::duplicate_parent_handle()?;
            env.insert(PARENT_PID_ENV.to_string(), parent_handle.to_string());
        }
        if discard_output {
            creation_flags |= CREATE_NO_WINDOW;
        }
        cmd.creation_flags(creation_flags);

        Some(token)
    };

    #[cfg(unix)]
    let interrupt_token: Option<InterruptToken> = {
        use std::os::unix::process::CommandExt;

        if !independent {
            env.insert(PARENT_PID_ENV.to_string(), std::process::id().to_string());
        }

        // A new session isolates the kernel into its own process group so a
        // later interrupt can reach the whole group. setsid rather than a
        // bare setpgid: process-group promotion alone breaks kernels that
        // start interactive subprocesses such as `bash -i`.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
            });
        }

        None
    };

    cmd.env_clear();
    cmd.envs(&env);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            let path = env
                .get("PATH")
                .cloned()
                .unwrap_or_else(|| std::env::var("PATH").unwrap_or_default());
            // Environment values are excluded: they may carry access
            // tokens and the like.
            error!(
                command = ?argv,
                %path,
                cwd = ?cwd,
                independent,
                stdin_substituted,
                stdout_supplied,
                stderr_supplied,
                "Failed to run kernel command"
            );
            return Err(LaunchError::Spawn {
                command: argv,
                source,
            });
        }
    };

    // The substituted stdin pipe only existed to satisfy the spawn; close
    // the parent-side write end right away.
    if stdin_substituted {
        drop(child.stdin.take());
    }

    debug!(pid = child.id(), command = ?argv, "Kernel process launched");

    Ok(KernelProcess::new(child, interrupt_token, stdin_substituted))
}

/// Launch a kernel process without blocking the calling task.
///
/// Identical semantics to [`launch_kernel`]; the spawn runs on the blocking
/// thread pool while the caller suspends.
pub async fn launch_kernel_async(spec: LaunchSpec) -> Result<KernelProcess, LaunchError> {
    tokio::task::spawn_blocking(move || launch_kernel(spec))
        .await
        .map_err(|e| LaunchError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
