// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The state machine callers drive: `init` picks a backend, `code_send`/
//! `data_send` fill a result slot, `code_read`/`data_read` lend a view into
//! it, `code_free`/`data_free` drop it, and `fini` tears everything down.
//!
//! The distilled design calls for process-wide singletons reached through
//! a C ABI; this crate keeps the state machine (§9 of the expanded design:
//! "keep them, but express them as heap-owned slots guarded by the façade")
//! but stops short of the global statics and `extern "C"` entry points,
//! which belong to a downstream FFI crate this one doesn't provide. Every
//! operation below takes `&mut self` instead, so the borrow checker
//! enforces the single-threaded, strictly-serialized access the design
//! documents as a caller obligation.

use crate::backend::Backend;
use crate::error::{InitError, ReadError, SymbolizeError};
use crate::process::is_executable_file;
use crate::types::{CodeResult, DataResult, Frame};

/// A ready-to-use symbolizer bound to one coprocess backend.
///
/// There is no `Default`/bare `new`: the only way to get one is
/// [`Symbolizer::init`], which mirrors the distilled design's
/// `UNINITIALIZED -> READY` transition by making "not yet initialized"
/// unrepresentable rather than a runtime state to check.
pub struct Symbolizer {
    backend: Backend,
    code_slot: Option<CodeResult>,
    data_slot: Option<DataResult>,
}

impl Symbolizer {
    /// Picks a backend by the basename of `path` and brings it up lazily
    /// (the first `code_send`/`data_send` is what actually forks the
    /// coprocess). An empty path is `PathCorrupted`; a path that doesn't
    /// name an executable regular file is `PathNotExecutable`; anything
    /// whose basename isn't recognized is `UnsupportedTool`.
    pub fn init(path: &str) -> Result<Self, InitError> {
        if path.is_empty() {
            return Err(InitError::PathCorrupted);
        }
        if !is_executable_file(path) {
            return Err(InitError::PathNotExecutable(path.to_string()));
        }
        let backend = Backend::select(path)?;
        Ok(Symbolizer { backend, code_slot: None, data_slot: None })
    }

    /// Symbolizes one code offset, replacing the code slot with the new
    /// result and returning the number of frames it holds. The previous
    /// slot's strings are dropped in the process — callers who need them
    /// must have already consumed them via `code_read`.
    pub fn code_send(&mut self, module: &str, offset: u32) -> Result<usize, SymbolizeError> {
        let result = self.backend.code_send(module, offset)?;
        let count = result.frames.len();
        self.code_slot = Some(result);
        Ok(count)
    }

    /// Borrows frame `idx` from the current code slot. `NoResult` if
    /// nothing has been sent (or the slot was freed); `OutOfBounds` if
    /// `idx` is past the frame count from the last `code_send`.
    pub fn code_read(&self, idx: usize) -> Result<&Frame, ReadError> {
        let result = self.code_slot.as_ref().ok_or(ReadError::NoResult)?;
        result.frames.get(idx).ok_or(ReadError::OutOfBounds { index: idx, len: result.frames.len() })
    }

    /// Drops the code slot's owned strings. Calling this twice in a row is
    /// safe and observationally identical to calling it once.
    pub fn code_free(&mut self) {
        self.code_slot = None;
    }

    /// Symbolizes one data offset. The addr2line backend never supports
    /// this and always returns `DataUnsupported`.
    pub fn data_send(&mut self, module: &str, offset: u32) -> Result<(), SymbolizeError> {
        let result = self.backend.data_send(module, offset)?;
        self.data_slot = Some(result);
        Ok(())
    }

    /// Borrows the current data slot. `NoResult` if nothing has been sent
    /// or the slot was freed.
    pub fn data_read(&self) -> Result<&DataResult, ReadError> {
        self.data_slot.as_ref().ok_or(ReadError::NoResult)
    }

    /// Drops the data slot's owned strings. Safe to call repeatedly.
    pub fn data_free(&mut self) {
        self.data_slot = None;
    }

    /// The coprocess pid backing the current backend, for diagnostics.
    /// `None` before the first request (the channel forks lazily) or
    /// while the channel is between restarts.
    pub fn coprocess_pid(&self) -> Option<i32> {
        match &self.backend {
            Backend::Llvm(b) => b.pid(),
            Backend::Addr2Line(_) => None,
        }
    }
}

impl Drop for Symbolizer {
    /// Equivalent to the distilled design's `fini`: any live child is
    /// killed when the backend (and, transitively, its channel(s)) drops.
    /// There is nothing else to do here explicitly — `Channel::drop` and
    /// `ProcessHost::drop` already guarantee the kill-and-reap.
    fn drop(&mut self) {
        tracing::debug!("tearing down symbolizer");
    }
}
