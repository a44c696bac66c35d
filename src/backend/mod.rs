// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backend selection and the tagged-variant dispatch the façade drives.
//!
//! A trait object would work just as well here, but the set of backends is
//! closed and each variant's pool/channel shape differs enough (one shared
//! channel for LLVM, a whole keyed pool for addr2line) that a plain enum
//! with a `match` in each façade operation reads more directly than an
//! object-safe trait with one method per operation.

pub(crate) mod addr2line;
pub(crate) mod llvm;

use crate::error::{InitError, SymbolizeError};
use crate::types::{CodeResult, DataResult};
use addr2line::Addr2LinePool;
use llvm::LlvmBackend;

pub(crate) enum Backend {
    Llvm(LlvmBackend),
    Addr2Line(Addr2LinePool),
}

impl Backend {
    /// Chooses a backend by pattern-matching the basename of `path`:
    /// a `llvm-symbolizer`-prefixed name selects LLVM, an exact
    /// `addr2line` match selects the pool variant, anything else is
    /// unsupported.
    pub(crate) fn select(path: &str) -> Result<Self, InitError> {
        let basename = path.rsplit('/').next().unwrap_or(path);
        if basename.starts_with("llvm-symbolizer") {
            Ok(Backend::Llvm(LlvmBackend::new(path)))
        } else if basename == "addr2line" {
            Ok(Backend::Addr2Line(Addr2LinePool::new(path)))
        } else {
            Err(InitError::UnsupportedTool(path.to_string()))
        }
    }

    pub(crate) fn code_send(&mut self, module: &str, offset: u32) -> Result<CodeResult, SymbolizeError> {
        match self {
            Backend::Llvm(b) => b.code_send(module, offset),
            Backend::Addr2Line(p) => p.code_send(module, offset),
        }
    }

    pub(crate) fn data_send(&mut self, module: &str, offset: u32) -> Result<DataResult, SymbolizeError> {
        match self {
            Backend::Llvm(b) => b.data_send(module, offset),
            Backend::Addr2Line(p) => Err(p.data_send(module, offset).unwrap_err()),
        }
    }
}
