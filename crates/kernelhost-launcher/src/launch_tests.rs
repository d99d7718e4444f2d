use super::*;

use std::time::Duration;

/// Poll the process at a short interval until it exits.
#[cfg(unix)]
fn wait_exit(process: &mut KernelProcess) -> i32 {
    loop {
        if let Some(code) = process.poll().unwrap() {
            return code;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(unix)]
fn sh(script: &str) -> LaunchSpec {
    LaunchSpec::new(["sh", "-c", script])
}

#[test]
fn test_empty_command_rejected() {
    let err = launch_kernel(LaunchSpec::new(Vec::<String>::new())).unwrap_err();
    assert!(matches!(err, LaunchError::EmptyCommand));
}

#[test]
fn test_spawn_failure_propagates() {
    let spec = LaunchSpec::new(["kernelhost-test-missing-binary"]);
    let err = launch_kernel(spec).unwrap_err();
    match err {
        LaunchError::Spawn { command, source } => {
            assert_eq!(command[0], "kernelhost-test-missing-binary");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected spawn error, got {other}"),
    }
}

#[test]
fn test_spawn_failure_reports_expanded_command() {
    // Home-directory shorthand is expanded before the spawn is attempted,
    // so the reported command carries the expanded path.
    let spec = LaunchSpec::new(["~/kernelhost-test-missing-binary"]);
    let err = launch_kernel(spec).unwrap_err();
    match err {
        LaunchError::Spawn { command, .. } => {
            assert!(!command[0].starts_with('~'));
        }
        other => panic!("expected spawn error, got {other}"),
    }
}

#[cfg(unix)]
#[test]
fn test_stdin_substituted_by_pipe_and_closed() {
    let mut process = launch_kernel(sh("sleep 30")).unwrap();
    assert!(process.stdin_substituted());
    // The parent-side write end was closed right after the spawn.
    assert!(process.stdin().is_none());
    process.kill().unwrap();
    wait_exit(&mut process);
}

#[cfg(unix)]
#[test]
fn test_explicit_stdin_is_kept_open() {
    let spec = sh("sleep 30").with_stdin(std::process::Stdio::piped());
    let mut process = launch_kernel(spec).unwrap();
    assert!(!process.stdin_substituted());
    assert!(process.stdin().is_some());
    process.kill().unwrap();
    wait_exit(&mut process);
}

#[cfg(unix)]
#[test]
fn test_exit_code_passthrough_zero() {
    let mut process = launch_kernel(sh("exit 0")).unwrap();
    assert_eq!(wait_exit(&mut process), 0);
}

#[cfg(unix)]
#[test]
fn test_exit_code_passthrough_nonzero() {
    let mut process = launch_kernel(sh("exit 4")).unwrap();
    assert_eq!(wait_exit(&mut process), 4);
}

#[cfg(unix)]
#[test]
fn test_poll_none_while_running() {
    let mut process = launch_kernel(sh("sleep 30")).unwrap();
    assert!(process.poll().unwrap().is_none());
    process.kill().unwrap();
    wait_exit(&mut process);
}

#[cfg(unix)]
#[test]
fn test_kill_surfaces_signal_exit() {
    let mut process = launch_kernel(sh("sleep 30")).unwrap();
    process.kill().unwrap();
    assert_eq!(wait_exit(&mut process), -(libc::SIGKILL));
}

#[cfg(unix)]
#[test]
fn test_terminate_surfaces_signal_exit() {
    let mut process = launch_kernel(sh("sleep 30")).unwrap();
    process.terminate().unwrap();
    assert_eq!(wait_exit(&mut process), -(libc::SIGTERM));
}

#[cfg(unix)]
#[test]
fn test_kill_after_exit_is_noop() {
    let mut process = launch_kernel(sh("exit 0")).unwrap();
    wait_exit(&mut process);
    // The child is already reaped at this point.
    process.kill().unwrap();
}

#[cfg(unix)]
#[test]
fn test_parent_pid_injected_for_dependent_kernel() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("parent_pid");
    let script = format!("printf '%s' \"$KERNELHOST_PARENT_PID\" > {}", out.display());
    let mut process = launch_kernel(sh(&script)).unwrap();
    assert_eq!(wait_exit(&mut process), 0);

    let recorded = std::fs::read_to_string(&out).unwrap();
    assert_eq!(recorded, std::process::id().to_string());
}

#[cfg(unix)]
#[test]
fn test_no_parent_pid_for_independent_kernel() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("parent_pid");
    let script = format!("printf '%s' \"$KERNELHOST_PARENT_PID\" > {}", out.display());
    let mut process = launch_kernel(sh(&script).independent(true)).unwrap();
    assert_eq!(wait_exit(&mut process), 0);

    let recorded = std::fs::read_to_string(&out).unwrap();
    assert!(recorded.is_empty());
}

#[cfg(unix)]
#[test]
fn test_caller_env_is_not_mutated() {
    let caller_env: std::collections::HashMap<String, String> = std::env::vars().collect();
    let mut process = launch_kernel(sh("exit 0").with_env(caller_env.clone())).unwrap();
    wait_exit(&mut process);
    // The parent-identifying value was injected into a copy, not into the
    // caller's mapping.
    assert!(!caller_env.contains_key(PARENT_PID_ENV));
}

#[cfg(unix)]
#[test]
fn test_child_runs_in_its_own_session() {
    let mut process = launch_kernel(sh("sleep 30")).unwrap();
    // setsid makes the child the leader of a fresh process group.
    assert_eq!(process.pgid(), Some(process.pid() as i32));
    assert_ne!(process.pgid(), Some(std::process::id() as i32));
    process.kill().unwrap();
    wait_exit(&mut process);
}

#[cfg(unix)]
#[test]
fn test_cwd_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("cwd");
    let script = format!("pwd > {}", out.display());
    let spec = sh(&script).with_cwd(dir.path());
    let mut process = launch_kernel(spec).unwrap();
    assert_eq!(wait_exit(&mut process), 0);

    let recorded = std::fs::read_to_string(&out).unwrap();
    let recorded = std::path::Path::new(recorded.trim());
    assert_eq!(
        recorded.canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

#[cfg(unix)]
#[test]
fn test_send_posix_signal_to_absent_process_is_noop() {
    // A pid far outside the live range: delivery reports ESRCH, which is
    // treated as benign.
    send_posix_signal(987_654_321, None, libc::SIGTERM).unwrap();
}

#[cfg(unix)]
#[test]
fn test_send_posix_signal_group_fallback() {
    let mut process = launch_kernel(sh("sleep 30")).unwrap();
    // A dead group id forces the lenient fallback to per-process delivery.
    send_posix_signal(process.pid(), Some(987_654_321), libc::SIGKILL).unwrap();
    assert_eq!(wait_exit(&mut process), -(libc::SIGKILL));
}

#[cfg(unix)]
#[tokio::test]
async fn test_async_launch_matches_blocking_semantics() {
    let mut process = launch_kernel_async(sh("exit 7")).await.unwrap();
    let code = loop {
        if let Some(code) = process.poll().unwrap() {
            break code;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(code, 7);
    assert!(process.stdin_substituted());
}

#[cfg(unix)]
#[test]
fn test_close_streams_releases_captured_output() {
    let spec = sh("echo out").with_stdout(std::process::Stdio::piped());
    let mut process = launch_kernel(spec).unwrap();
    wait_exit(&mut process);
    assert!(process.stdout().is_some());
    process.close_streams();
    assert!(process.stdout().is_none());
}
