// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The `llvm-symbolizer`-class backend: one long-lived channel handles
//! every module, CODE and DATA alike, distinguished by a request prefix.

use crate::channel::{Channel, ChannelBackend};
use crate::error::SymbolizeError;
use crate::parser::{code, data};
use crate::types::{Arch, CodeResult, DataResult};
use std::ffi::CString;

/// Compile-time fixed flags baked into argv. The distilled spec ties these
/// to build-time configuration toggles rather than runtime options; this
/// crate fixes them to the conservative, most-useful defaults.
const DEMANGLE: bool = true;
const INLINES: bool = true;

/// Scratch buffer budget for a formatted request line. A request that
/// would overflow this fails without being sent, per §4.4.
const MAX_COMMAND_LEN: usize = 16 * 1024;

pub(crate) struct LlvmBackend {
    channel: Channel,
}

impl LlvmBackend {
    pub(crate) fn new(path: &str) -> Self {
        LlvmBackend { channel: Channel::new(path) }
    }

    pub(crate) fn pid(&self) -> Option<i32> {
        self.channel.pid()
    }

    pub(crate) fn code_send(&mut self, module: &str, offset: u32) -> Result<CodeResult, SymbolizeError> {
        let command = format_request("CODE", module, offset, Arch::Unknown);
        let reply = self.send(&command)?;
        let frames = code::parse(reply);
        Ok(CodeResult { module: module.to_string(), offset, arch: Arch::Unknown, frames })
    }

    pub(crate) fn data_send(&mut self, module: &str, offset: u32) -> Result<DataResult, SymbolizeError> {
        let command = format_request("DATA", module, offset, Arch::Unknown);
        let reply = self.send(&command)?;
        let parsed = data::parse(reply).ok_or(SymbolizeError::Failed)?;
        Ok(DataResult {
            module: module.to_string(),
            offset,
            arch: Arch::Unknown,
            name: parsed.name,
            start: parsed.start,
            size: parsed.size,
            file: parsed.file,
            line: parsed.line,
        })
    }

    fn send(&mut self, command: &[u8]) -> Result<&[u8], SymbolizeError> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(SymbolizeError::Failed);
        }
        let backend_view = LlvmChannelBackend;
        self.channel.send(&backend_view, command).ok_or(SymbolizeError::Failed)
    }
}

/// `CODE|DATA "<module>[:<arch>]" 0x<hex-offset>\n`, the arch suffix present
/// only when `arch` (the request's own architecture tag, not the host's) is
/// a known one. Every `code_send`/`data_send` in this crate requests with
/// `Arch::Unknown` — the host architecture travels to the coprocess only via
/// `--default-arch=` in argv, never as a per-request suffix — but the
/// branch is kept general rather than hardcoded to the one path that's
/// reachable today.
fn format_request(prefix: &str, module: &str, offset: u32, arch: Arch) -> Vec<u8> {
    let target = match arch.wire_str() {
        Some(arch_str) => format!("{module}:{arch_str}"),
        None => module.to_string(),
    };
    format!("{prefix} \"{target}\" 0x{offset:x}\n").into_bytes()
}

struct LlvmChannelBackend;

impl ChannelBackend for LlvmChannelBackend {
    fn argv(&self, path: &str) -> Vec<CString> {
        let demangle = if DEMANGLE { "--demangle" } else { "--no-demangle" };
        let inlines = if INLINES { "--inlines" } else { "--no-inlines" };
        let default_arch = Arch::host().wire_str().unwrap_or("unknown");
        vec![
            CString::new(path).unwrap_or_default(),
            CString::new(demangle).unwrap(),
            CString::new(inlines).unwrap(),
            CString::new(format!("--default-arch={default_arch}")).unwrap(),
        ]
    }

    fn reached_end_of_output(&self, buf: &[u8]) -> bool {
        buf.ends_with(b"\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_known_arch_omits_suffix() {
        let command = format_request("CODE", "mymodule", 0x100, Arch::Unknown);
        let text = String::from_utf8(command).unwrap();
        assert!(text.starts_with("CODE \"mymodule"));
        assert!(text.ends_with("0x100\n"));
    }

    #[test]
    fn code_send_and_data_send_always_request_unknown_arch() {
        // Every request this backend issues carries arch=unknown, per
        // `interface.cpp`'s `module_arch = kModuleArchUnknown`; a known host
        // architecture only ever reaches the coprocess via --default-arch.
        let command = format_request("CODE", "mymodule", 0x100, Arch::X86_64);
        let text = String::from_utf8(command).unwrap();
        assert!(text.contains("mymodule:x86_64"), "arch suffix should honor the passed-in arch, not the host's");

        let command = format_request("DATA", "mymodule", 0x100, Arch::Unknown);
        let text = String::from_utf8(command).unwrap();
        assert!(!text.contains(':'), "unknown arch must omit the suffix entirely: {text:?}");
    }

    #[test]
    fn argv_starts_with_path_and_carries_default_arch_flag() {
        let backend = LlvmChannelBackend;
        let argv = backend.argv("/usr/bin/llvm-symbolizer");
        assert_eq!(argv[0].to_str().unwrap(), "/usr/bin/llvm-symbolizer");
        assert!(argv.iter().any(|a| a.to_str().unwrap().starts_with("--default-arch=")));
        assert!(argv.len() <= 16);
    }

    #[test]
    fn end_of_output_requires_trailing_blank_line() {
        let backend = LlvmChannelBackend;
        assert!(!backend.reached_end_of_output(b"foo\nfile.c:1\n"));
        assert!(backend.reached_end_of_output(b"foo\nfile.c:1\n\n"));
    }
}
