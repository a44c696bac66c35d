// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The `addr2line`-class backend. Each child process is bound to exactly
//! one module (the module path is an argv argument, not part of the wire
//! protocol), so a pool keyed by module path is required to serve more
//! than one module without re-forking on every request.

use crate::channel::{Channel, ChannelBackend};
use crate::error::SymbolizeError;
use crate::parser::code;
use crate::types::CodeResult;
use std::collections::HashMap;
use std::ffi::CString;

const DEMANGLE: bool = true;
const INLINES: bool = true;

/// `??\n??:0\n`: the fixed terminator a sentinel address forces out of
/// `addr2line`, and the exact bytes stripped from a reply before parsing.
const TERMINATOR: &[u8] = b"??\n??:0\n";

/// A request always submits two addresses; the sentinel is the largest
/// representable pointer value, guaranteeing `addr2line` treats it as
/// out-of-range and echoes the terminator regardless of the real offset.
const SENTINEL: u64 = u64::MAX;

/// §4.5: once the pool would grow past this many live children, every
/// child is killed and the pool emptied before the new module is inserted.
/// The upstream source documents this bound but never enforces it; this
/// crate implements the documented policy.
const POOL_MAX: usize = 16;

struct Addr2LineChannelBackend {
    module: String,
}

impl ChannelBackend for Addr2LineChannelBackend {
    fn argv(&self, path: &str) -> Vec<CString> {
        let mut argv = vec![CString::new(path).unwrap_or_default()];
        if DEMANGLE {
            argv.push(CString::new("-C").unwrap());
        }
        if INLINES {
            argv.push(CString::new("-i").unwrap());
        }
        argv.push(CString::new("-fe").unwrap());
        argv.push(CString::new(self.module.clone()).unwrap_or_default());
        argv
    }

    fn reached_end_of_output(&self, buf: &[u8]) -> bool {
        buf.ends_with(TERMINATOR) && buf.len() > TERMINATOR.len()
    }
}

/// One child process bound to one module.
struct PooledChild {
    channel: Channel,
    backend: Addr2LineChannelBackend,
}

/// Pool of `addr2line` children, keyed by module path.
pub(crate) struct Addr2LinePool {
    path: String,
    children: HashMap<String, PooledChild>,
}

impl Addr2LinePool {
    pub(crate) fn new(path: &str) -> Self {
        Addr2LinePool { path: path.to_string(), children: HashMap::new() }
    }

    pub(crate) fn pid_for(&self, module: &str) -> Option<i32> {
        self.children.get(module).and_then(|c| c.channel.pid())
    }

    pub(crate) fn code_send(&mut self, module: &str, offset: u32) -> Result<CodeResult, SymbolizeError> {
        if !self.children.contains_key(module) {
            self.insert_evicting_if_full(module);
        }
        let child = self.children.get_mut(module).expect("just inserted");

        let command = format!("0x{offset:x}\n0x{SENTINEL:x}\n").into_bytes();
        let reply = child.channel.send(&child.backend, &command).ok_or(SymbolizeError::Failed)?;
        let stripped = strip_nul_and_terminator(reply);
        let frames = code::parse(stripped);
        Ok(CodeResult { module: module.to_string(), offset, arch: crate::types::Arch::Unknown, frames })
    }

    /// DATA lookups are not meaningful against a per-module `addr2line`
    /// child; every call is rejected.
    pub(crate) fn data_send(&mut self, _module: &str, _offset: u32) -> Result<(), SymbolizeError> {
        Err(SymbolizeError::DataUnsupported)
    }

    fn insert_evicting_if_full(&mut self, module: &str) {
        if self.children.len() >= POOL_MAX {
            tracing::warn!(size = self.children.len(), max = POOL_MAX, "addr2line pool full, killing all children");
            self.children.clear();
        }
        let backend = Addr2LineChannelBackend { module: module.to_string() };
        let channel = Channel::new(&self.path);
        self.children.insert(module.to_string(), PooledChild { channel, backend });
    }
}

/// Drops the trailing NUL the channel appends, then the terminator bytes,
/// leaving only the real frame lines for [`code::parse`].
fn strip_nul_and_terminator(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(&[0u8]).unwrap_or(buf);
    buf.strip_suffix(TERMINATOR).unwrap_or(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_output_requires_more_than_a_lone_terminator() {
        let backend = Addr2LineChannelBackend { module: "m".into() };
        assert!(!backend.reached_end_of_output(TERMINATOR));
        let mut buf = b"main\n/a/b.c:42\n".to_vec();
        buf.extend_from_slice(TERMINATOR);
        assert!(backend.reached_end_of_output(&buf));
    }

    #[test]
    fn strip_nul_and_terminator_leaves_only_frame_lines() {
        let mut buf = b"main\n/a/b.c:42\n".to_vec();
        buf.extend_from_slice(TERMINATOR);
        buf.push(0);
        assert_eq!(strip_nul_and_terminator(&buf), b"main\n/a/b.c:42\n");
    }

    #[test]
    fn argv_includes_module_and_respects_budget() {
        let backend = Addr2LineChannelBackend { module: "/bin/ls".into() };
        let argv = backend.argv("/usr/bin/addr2line");
        assert!(argv.iter().any(|a| a.to_str().unwrap() == "/bin/ls"));
        assert!(argv.len() <= 16);
    }

    #[test]
    fn data_send_is_always_rejected() {
        let mut pool = Addr2LinePool::new("/usr/bin/addr2line");
        assert!(matches!(pool.data_send("m", 0), Err(SymbolizeError::DataUnsupported)));
    }
}
