// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line-oriented request/response over a child's pipes, with bounded
//! restart-on-failure. This is the one piece both backends share: they
//! differ only in argv and in how they recognize the end of a reply, which
//! is why both are expressed as a [`ChannelBackend`] trait object handed to
//! a single [`Channel`].
//!
//! Grounded on the request/response loop shape and restart bookkeeping in
//! `ddcommon::unix_utils::process` (this codebase's closest analogue to a
//! supervised coprocess), adapted from a one-shot receiver spawn into a
//! long-lived, many-requests channel.

use crate::process::{create_two_high_fd_pipes, is_executable_file, owned_fd_from_raw, ProcessHost};
use std::ffi::CString;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};

/// Bound on restart attempts before a channel gives up for good. Once hit,
/// [`Channel::send`] always returns `None` without forking again.
pub(crate) const MAX_RESTARTS: u32 = 5;

/// One 1 KiB read grows the reply buffer by at least this much headroom.
const READ_CHUNK: usize = 1024;

/// Backend-specific pieces a [`Channel`] needs but doesn't implement itself.
pub(crate) trait ChannelBackend {
    /// Builds the argv for spawning the coprocess (slot 0 is the path
    /// itself, matching `execv` convention). At most 16 entries.
    fn argv(&self, path: &str) -> Vec<CString>;

    /// `true` iff `buf` ends with this backend's end-of-response marker and
    /// there is at least one full reply's worth of bytes to look at.
    fn reached_end_of_output(&self, buf: &[u8]) -> bool;
}

/// Per-child channel state: current process, pipe fds, reply buffer,
/// restart bookkeeping. Mirrors the `ChannelState` invariants: fds and the
/// child are either both present or both absent, and `failed_to_start` is
/// sticky once set.
pub(crate) struct Channel {
    path: String,
    host: Option<ProcessHost>,
    write_fd: Option<OwnedFd>,
    read_fd: Option<OwnedFd>,
    buf: Vec<u8>,
    restart_count: u32,
    failed_to_start: bool,
    reported_invalid_path: bool,
}

impl Channel {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Channel {
            path: path.into(),
            host: None,
            write_fd: None,
            read_fd: None,
            buf: Vec::new(),
            restart_count: 0,
            failed_to_start: false,
            reported_invalid_path: false,
        }
    }

    pub(crate) fn pid(&self) -> Option<i32> {
        self.host.as_ref().and_then(ProcessHost::pid)
    }

    pub(crate) fn is_running(&mut self) -> bool {
        self.host.as_mut().map(ProcessHost::is_running).unwrap_or(false)
    }

    pub(crate) fn kill(&mut self) {
        if let Some(host) = self.host.as_mut() {
            host.kill();
        }
        self.host = None;
        self.write_fd = None;
        self.read_fd = None;
    }

    /// Sends `command` and returns a view of the reply, or `None` if the
    /// channel has latched `failed_to_start` or every restart attempt this
    /// call made was exhausted without a clean exchange.
    pub(crate) fn send(&mut self, backend: &dyn ChannelBackend, command: &[u8]) -> Option<&[u8]> {
        if self.failed_to_start {
            return None;
        }

        loop {
            if self.host.is_none() && !self.start_subprocess(backend) {
                if self.restart_count >= MAX_RESTARTS {
                    self.failed_to_start = true;
                    return None;
                }
                self.restart_count += 1;
                continue;
            }

            match self.exchange(backend, command) {
                Ok(()) => return Some(&self.buf),
                Err(()) => {
                    self.restart();
                    if self.restart_count >= MAX_RESTARTS {
                        self.failed_to_start = true;
                        return None;
                    }
                    self.restart_count += 1;
                }
            }
        }
    }

    /// Writes `command` in full, then reads until `backend` recognizes
    /// end-of-response. A short write, a read error, or a zero-byte read
    /// (the child closed stdout) are all treated as failure.
    fn exchange(&mut self, backend: &dyn ChannelBackend, command: &[u8]) -> Result<(), ()> {
        let write_fd = self.write_fd.as_ref().ok_or(())?;
        let mut writer = std::fs::File::from(dup_owned(write_fd).ok_or(())?);
        writer.write_all(command).map_err(|_| ())?;
        drop(writer);

        let read_fd = self.read_fd.as_ref().ok_or(())?;
        let mut reader = std::fs::File::from(dup_owned(read_fd).ok_or(())?);

        self.buf.clear();
        loop {
            let start = self.buf.len();
            self.buf.resize(start + READ_CHUNK, 0);
            let n = reader.read(&mut self.buf[start..]).map_err(|_| ())?;
            self.buf.truncate(start + n);
            if n == 0 {
                return Err(());
            }
            if backend.reached_end_of_output(&self.buf) {
                self.buf.push(0);
                return Ok(());
            }
        }
    }

    /// Kills any live child, drops the channel fds, and spawns a fresh one.
    fn restart(&mut self) {
        self.kill();
    }

    /// §4.3 start sequence: validate the path, allocate high-numbered
    /// pipes, spawn, settle, and record the pid — or return `false` at the
    /// first failing step, leaving the channel with no child and no fds.
    fn start_subprocess(&mut self, backend: &dyn ChannelBackend) -> bool {
        if !is_executable_file(&self.path) {
            if !self.reported_invalid_path {
                tracing::warn!(path = %self.path, "symbolizer path is not an executable file");
                self.reported_invalid_path = true;
            }
            return false;
        }

        let ((outbound_read, outbound_write), (inbound_read, inbound_write)) =
            match create_two_high_fd_pipes() {
                Ok(pipes) => pipes,
                Err(e) => {
                    tracing::error!(error = %e, "failed to allocate high-numbered pipes");
                    return false;
                }
            };

        let argv = backend.argv(&self.path);
        crate::process::assert_argv_budget(&argv);

        match ProcessHost::spawn(&self.path, &argv, outbound_read, inbound_write) {
            Ok(host) => {
                self.host = Some(host);
                self.write_fd = Some(outbound_write);
                self.read_fd = Some(inbound_read);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path, "failed to spawn symbolizer coprocess");
                false
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Duplicates an `OwnedFd` so it can be consumed by a short-lived `File`
/// without giving up the channel's own ownership of the original fd.
fn dup_owned(fd: &OwnedFd) -> Option<OwnedFd> {
    let raw = fd.as_raw_fd();
    let dup = unsafe { libc::dup(raw) };
    if dup < 0 {
        None
    } else {
        Some(owned_fd_from_raw(dup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    struct EchoLine;
    impl ChannelBackend for EchoLine {
        fn argv(&self, path: &str) -> Vec<CString> {
            vec![CString::new(path).unwrap()]
        }
        fn reached_end_of_output(&self, buf: &[u8]) -> bool {
            buf.ends_with(b"\n\n")
        }
    }

    fn mock_symbolizer(script: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "#!/bin/sh\n{script}").unwrap();
        let mut perms = file.as_file().metadata().unwrap().permissions();
        perms.set_mode(0o755);
        file.as_file().set_permissions(perms).unwrap();
        file
    }

    #[test]
    fn send_against_a_missing_path_exhausts_restarts_and_latches() {
        let mut channel = Channel::new("/definitely/does/not/exist");
        let backend = EchoLine;
        let reply = channel.send(&backend, b"hello\n");
        assert!(reply.is_none());
        assert!(channel.failed_to_start);
        assert!(channel.restart_count >= MAX_RESTARTS);
    }

    #[test]
    fn send_against_a_script_that_echoes_succeeds() {
        let script = mock_symbolizer("cat");
        let mut channel = Channel::new(script.path().to_str().unwrap());
        let backend = EchoLine;
        let reply = channel.send(&backend, b"foo\nbar\n\n").expect("reply");
        assert_eq!(reply, b"foo\nbar\n\n\0");
    }

    #[test]
    fn restart_cap_latches_failed_to_start() {
        // A script that exits immediately without producing any output
        // forces a restart every time start_subprocess succeeds but the
        // exchange reads zero bytes.
        let script = mock_symbolizer("exit 1");
        let mut channel = Channel::new(script.path().to_str().unwrap());
        let backend = EchoLine;
        let reply = channel.send(&backend, b"foo\n\n");
        assert!(reply.is_none());
        assert!(channel.failed_to_start);
        assert!(channel.restart_count >= MAX_RESTARTS);
    }
}
