//! # Kernelhost Launcher
//!
//! Cross-platform launching of kernel processes: safe stdio redirection,
//! environment preparation, session/process-group isolation, and the
//! platform interrupt channel used where POSIX signals are unavailable.
//!
//! The entry points are [`launch_kernel`] (blocking) and
//! [`launch_kernel_async`] (suspends the caller until the child is spawned,
//! otherwise identical). Both return a [`KernelProcess`] handle owning the
//! spawned child and, on Windows, its interrupt event.

pub mod interrupt;
pub mod launch;

pub use interrupt::{
    InterruptToken, INTERRUPT_EVENT_ENV, LEGACY_INTERRUPT_EVENT_ENV, PARENT_PID_ENV,
};
pub use launch::{launch_kernel, launch_kernel_async, KernelProcess, LaunchSpec};

#[cfg(unix)]
pub use launch::send_posix_signal;
