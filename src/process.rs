// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

//! Fork/exec of a single coprocess, rewired onto a pair of high-numbered
//! pipes, plus the monitoring operations ([`ProcessHost::is_running`],
//! [`ProcessHost::wait`], [`ProcessHost::kill`]) a [`crate::channel::Channel`]
//! needs to keep it alive across many requests.
//!
//! The spawn path leans on `std::process::Command` (fork+exec, with
//! `Stdio::from(OwnedFd)` to hand over already-allocated pipe ends) rather
//! than calling `libc::fork` directly: this isn't a signal handler, so there
//! is no need for the vfork/atfork gymnastics the crash-handling crates in
//! this codebase go through. Reaping is still done by hand with
//! `nix::sys::wait::waitpid`, because `std::process::Child` doesn't expose
//! the idempotent-kill/ECHILD-is-not-an-error semantics this crate needs.

use crate::error::ProcessError;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::ffi::CString;
use std::os::fd::OwnedFd;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::time::Duration;

/// How long to wait after `exec` for the child to come up before checking
/// whether it already died (a quick way to catch "binary not found"-class
/// failures that `posix_spawn`/`fork`+`exec` can't report synchronously).
const POST_SPAWN_SETTLE: Duration = Duration::from_millis(10);

/// A single child process plus enough state to monitor and reap it.
///
/// Two invariants mirror [`crate::channel`]'s `ChannelState`: a `ProcessHost`
/// either has a live `pid` or it doesn't (there is no "zombie but we forgot"
/// state — `kill`/`wait` always reap before returning).
#[derive(Debug)]
pub(crate) struct ProcessHost {
    pid: Option<Pid>,
}

impl ProcessHost {
    /// Spawns `path argv[1..]` with `child_stdin`/`child_stdout` dup'd onto
    /// fd 0/1 of the child; stderr is inherited. The child is put in its own
    /// session and has `SIGPIPE` reset to `SIG_DFL`, and every fd above 2 it
    /// didn't ask for is closed, so neither terminal signals nor leaked fds
    /// from the parent reach it.
    pub(crate) fn spawn(
        path: &str,
        argv: &[CString],
        child_stdin: OwnedFd,
        child_stdout: OwnedFd,
    ) -> Result<Self, ProcessError> {
        let mut command = Command::new(path);
        command
            .args(argv.iter().skip(1).map(|a| a.to_string_lossy().into_owned()))
            .stdin(Stdio::from(child_stdin))
            .stdout(Stdio::from(child_stdout));

        // SAFETY: the closure only calls async-signal-safe libc functions
        // (setsid, signal, close) and touches no Rust heap state.
        unsafe {
            command.pre_exec(|| {
                isolate_child();
                Ok(())
            });
        }

        let child = command.spawn().map_err(|source| ProcessError::Spawn {
            path: path.to_string(),
            source,
        })?;
        let pid = Pid::from_raw(child.id() as i32);
        // We reap by hand from here on; let `child` go out of scope without
        // waiting (std::process::Child's Drop does not wait()).
        std::mem::forget(child);

        let mut host = ProcessHost { pid: Some(pid) };
        std::thread::sleep(POST_SPAWN_SETTLE);
        if !host.is_running() {
            return Err(ProcessError::Spawn {
                path: path.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "child exited immediately after exec",
                ),
            });
        }
        Ok(host)
    }

    pub(crate) fn pid(&self) -> Option<i32> {
        self.pid.map(Pid::as_raw)
    }

    /// Non-blocking reap. `true` iff the child is known to still be alive;
    /// a child we can no longer find (`ECHILD`) is reported as not running,
    /// not as an error — there's nothing further for the caller to do with
    /// that distinction.
    pub(crate) fn is_running(&mut self) -> bool {
        let Some(pid) = self.pid else { return false };
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(_) => {
                self.pid = None;
                false
            }
            Err(nix::Error::ECHILD) => {
                self.pid = None;
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "waitpid(WNOHANG) failed");
                false
            }
        }
    }

    /// Blocking reap. Returns `None` if there was nothing to wait on.
    pub(crate) fn wait(&mut self) -> Option<WaitStatus> {
        let pid = self.pid.take()?;
        match waitpid(pid, None) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(error = %e, "waitpid failed");
                None
            }
        }
    }

    /// Sends `SIGKILL` and blocks until the child is reaped. Idempotent: a
    /// second call on an already-gone child is a no-op that reports `false`.
    pub(crate) fn kill(&mut self) -> bool {
        let Some(pid) = self.pid else { return false };
        match signal::kill(pid, Signal::SIGKILL) {
            Ok(()) => {}
            Err(nix::Error::ESRCH) => {
                // Already gone; still need to reap if we haven't.
            }
            Err(e) => {
                tracing::warn!(error = %e, "kill(SIGKILL) failed");
            }
        }
        self.wait().is_some()
    }
}

impl Drop for ProcessHost {
    fn drop(&mut self) {
        if self.pid.is_some() {
            self.kill();
        }
    }
}

/// Runs in the child right before `exec`: start a new session so terminal
/// signals (SIGINT/SIGHUP/SIGTERM) delivered to the parent's process group
/// don't reach us, put `SIGPIPE` back to its default disposition (Rust's
/// runtime ignores it, which the child shouldn't inherit), and close
/// anything above stderr that isn't our freshly dup'd stdin/stdout.
fn isolate_child() {
    unsafe {
        let _ = libc::setsid();
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
    close_fds_above_stderr();
}

/// Closes every open fd strictly greater than `STDERR_FILENO`, aside from
/// stdin/stdout which `std::process::Command` has already dup'd into place
/// by the time `pre_exec` runs. Best-effort: `/proc/self/fd` is consulted on
/// Linux for an exact list; elsewhere we fall back to a bounded sweep.
fn close_fds_above_stderr() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(entries) = std::fs::read_dir("/proc/self/fd") {
            for entry in entries.flatten() {
                if let Some(fd) = entry.file_name().to_str().and_then(|s| s.parse::<RawFd>().ok())
                {
                    if fd > libc::STDERR_FILENO {
                        unsafe {
                            libc::close(fd);
                        }
                    }
                }
            }
            return;
        }
    }
    let max_fd = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max_fd = if max_fd > 0 { max_fd as RawFd } else { 1024 };
    for fd in (libc::STDERR_FILENO + 1)..max_fd {
        unsafe {
            libc::close(fd);
        }
    }
}

/// Opens two pipes whose four file descriptors are all strictly greater
/// than `STDERR_FILENO`. Tries up to five candidate pairs (closing every
/// losing pair immediately) before giving up, per the distilled spec's
/// §4.2 strategy.
pub(crate) fn create_two_high_fd_pipes(
) -> Result<((OwnedFd, OwnedFd), (OwnedFd, OwnedFd)), ProcessError> {
    const CANDIDATES: usize = 5;
    let mut opened: Vec<(OwnedFd, OwnedFd)> = Vec::with_capacity(CANDIDATES);
    let mut qualifying: Vec<(OwnedFd, OwnedFd)> = Vec::with_capacity(2);

    for _ in 0..CANDIDATES {
        if qualifying.len() >= 2 {
            break;
        }
        match nix::unistd::pipe() {
            Ok((r, w)) => {
                if r.as_raw_fd() > libc::STDERR_FILENO && w.as_raw_fd() > libc::STDERR_FILENO {
                    qualifying.push((r, w));
                } else {
                    opened.push((r, w));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "pipe() failed while allocating high-fd pipes");
                break;
            }
        }
    }
    // `opened` (the rejects) are dropped here, closing their fds.
    drop(opened);

    if qualifying.len() < 2 {
        return Err(ProcessError::NoHighFds);
    }
    let second = qualifying.pop().expect("checked len >= 2 above");
    let first = qualifying.pop().expect("checked len >= 2 above");
    Ok((first, second))
}

/// Turns a `Vec<CString>` argv (as built by a [`crate::channel::ChannelBackend`])
/// back into owned fds the caller already holds. Exists purely so
/// `ProcessHost::spawn`'s argv handling has one place to assert the "at most
/// 16 slots" invariant from the distilled spec; overflow is an internal
/// invariant violation (see `crate::error` module docs and §7 of
/// `SPEC_FULL.md`), not a recoverable error.
pub(crate) fn assert_argv_budget(argv: &[CString]) {
    const MAX_ARGV: usize = 16;
    if argv.len() > MAX_ARGV {
        tracing::error!(len = argv.len(), max = MAX_ARGV, "argv overflow building symbolizer command line");
        std::process::abort();
    }
}

/// `true` iff `path` exists, is a regular file, and has at least one
/// executable bit set.
pub(crate) fn is_executable_file(path: &str) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

// Re-exported for channel.rs, which needs to build a raw fd view over the
// pipe ends it kept on the parent side without taking them through `File`.
pub(crate) fn owned_fd_from_raw(fd: RawFd) -> OwnedFd {
    // SAFETY: callers only pass fds they uniquely own (freshly pipe()'d or
    // returned from into_raw_fd on an OwnedFd they previously owned).
    unsafe { OwnedFd::from_raw_fd(fd) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_fd_pipes_are_all_above_stderr() {
        let ((r1, w1), (r2, w2)) = create_two_high_fd_pipes().expect("pipes");
        for fd in [r1.as_raw_fd(), w1.as_raw_fd(), r2.as_raw_fd(), w2.as_raw_fd()] {
            assert!(fd > libc::STDERR_FILENO, "fd {fd} is not above stderr");
        }
    }

    #[test]
    fn is_executable_file_rejects_missing_path() {
        assert!(!is_executable_file("/definitely/does/not/exist"));
    }

    #[test]
    fn is_executable_file_rejects_non_executable_regular_file() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        assert!(!is_executable_file(file.path().to_str().unwrap()));
    }

    #[test]
    fn spawn_true_then_reap_is_running_false() {
        let ((child_in, parent_out), (parent_in, child_out)) =
            create_two_high_fd_pipes().expect("pipes");
        drop(parent_out);
        drop(parent_in);
        let argv = vec![CString::new("/bin/true").unwrap()];
        let mut host = ProcessHost::spawn("/bin/true", &argv, child_in, child_out).expect("spawn");
        // /bin/true exits almost immediately.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!host.is_running());
    }

    #[test]
    fn kill_is_idempotent() {
        let ((child_in, parent_out), (parent_in, child_out)) =
            create_two_high_fd_pipes().expect("pipes");
        drop(parent_out);
        drop(parent_in);
        let argv = vec![CString::new("/bin/cat").unwrap()];
        let mut host = ProcessHost::spawn("/bin/cat", &argv, child_in, child_out).expect("spawn");
        assert!(host.kill());
        assert!(!host.kill());
    }
}
