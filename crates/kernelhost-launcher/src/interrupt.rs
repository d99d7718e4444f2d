//! Platform interrupt plumbing for kernel processes.
//!
//! On POSIX platforms kernels are interrupted through native signal
//! delivery, so [`prepare_interrupt`] yields no token. On Windows, where
//! SIGINT cannot be delivered across processes, an inheritable named event
//! object is created instead; its handle is injected into the child's
//! environment under [`INTERRUPT_EVENT_ENV`] (plus a legacy alias), and
//! signaling the event is the interrupt. The child is responsible for
//! waiting on the event and translating it into its own interrupt handling.

use kernelhost_protocols::error::LaunchError;

/// Environment variable carrying the interrupt event handle (Windows).
pub const INTERRUPT_EVENT_ENV: &str = "KERNELHOST_INTERRUPT_EVENT";

/// Pre-rename alias for [`INTERRUPT_EVENT_ENV`], still set for kernels that
/// read the old name.
pub const LEGACY_INTERRUPT_EVENT_ENV: &str = "KHOST_INTERRUPT_EVENT";

/// Environment variable identifying the parent so the child can detect
/// parent death: the parent pid on POSIX, a duplicated inheritable process
/// handle value on Windows. Not set for independent kernels.
pub const PARENT_PID_ENV: &str = "KERNELHOST_PARENT_PID";

/// Opaque platform interrupt handle created at launch time.
///
/// Only produced on Windows; the value is the raw event handle. The token
/// lives as long as the process handle that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptToken(u64);

impl InterruptToken {
    /// Raw handle value, as injected into the child environment.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InterruptToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Create the platform interrupt channel for a kernel about to be launched.
///
/// Returns `None` on POSIX: native signals are used instead.
#[cfg(unix)]
pub fn prepare_interrupt() -> Result<Option<InterruptToken>, LaunchError> {
    Ok(None)
}

/// Create the platform interrupt channel for a kernel about to be launched.
///
/// Creates a named, inheritable, auto-reset event object. Failure is fatal:
/// there is no degraded mode for interrupt delivery on Windows.
#[cfg(windows)]
pub fn prepare_interrupt() -> Result<Option<InterruptToken>, LaunchError> {
    use std::ffi::CString;
    use std::mem;
    use std::ptr;

    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::minwinbase::SECURITY_ATTRIBUTES;
    use winapi::um::synchapi::CreateEventA;

    let name = CString::new(format!(
        "kernelhost-interrupt-{}-{}",
        std::process::id(),
        uuid::Uuid::new_v4()
    ))
    .map_err(|e| LaunchError::InterruptSetup(e.to_string()))?;

    let mut attributes = SECURITY_ATTRIBUTES {
        nLength: mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
        lpSecurityDescriptor: ptr::null_mut(),
        bInheritHandle: 1,
    };

    // Auto-reset, initially non-signaled.
    let handle = unsafe { CreateEventA(&mut attributes, 0, 0, name.as_ptr()) };
    if handle.is_null() {
        let code = unsafe { GetLastError() };
        return Err(LaunchError::InterruptSetup(format!(
            "CreateEvent failed with error {}",
            code
        )));
    }

    Ok(Some(InterruptToken(handle as u64)))
}

/// Signal the interrupt event held by a launched kernel.
#[cfg(windows)]
pub fn signal_interrupt(token: InterruptToken) -> Result<(), LaunchError> {
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::synchapi::SetEvent;

    let ok = unsafe { SetEvent(token.raw() as *mut winapi::ctypes::c_void) };
    if ok == 0 {
        let code = unsafe { GetLastError() };
        return Err(LaunchError::Signal(format!(
            "SetEvent on interrupt event {} failed with error {}",
            token, code
        )));
    }
    Ok(())
}

/// Duplicate an inheritable handle to the current process, for injection
/// into a dependent child so it can detect parent death.
#[cfg(windows)]
pub fn duplicate_parent_handle() -> Result<u64, LaunchError> {
    use std::ptr;

    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::handleapi::DuplicateHandle;
    use winapi::um::processthreadsapi::GetCurrentProcess;
    use winapi::um::winnt::DUPLICATE_SAME_ACCESS;

    let mut duplicated = ptr::null_mut();
    let ok = unsafe {
        let current = GetCurrentProcess();
        DuplicateHandle(
            current,
            current,
            current,
            &mut duplicated,
            0,
            1, // Inheritable by new processes.
            DUPLICATE_SAME_ACCESS,
        )
    };
    if ok == 0 {
        let code = unsafe { GetLastError() };
        return Err(LaunchError::InterruptSetup(format!(
            "DuplicateHandle failed with error {}",
            code
        )));
    }
    Ok(duplicated as u64)
}

/// Whether the current process has a usable console. A windowed (no-console)
/// parent must not let the child inherit its standard streams: they are
/// invalid and inheriting them can deadlock the child.
#[cfg(windows)]
pub(crate) fn has_console() -> bool {
    use winapi::um::wincon::GetConsoleWindow;

    !unsafe { GetConsoleWindow() }.is_null()
}
