// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types returned across the crate's public boundaries.
//!
//! Internal plumbing below the façade (the channel's restart loop, the
//! pipe/fork setup in `process.rs`) collapses failures to `Result<_, ()>`
//! and logs the cause via `tracing` at the point it's discarded, since
//! none of it is something a caller branches on; only the `thiserror`
//! enums below cross the façade boundary, where a caller is expected to
//! match on the outcome.

use thiserror::Error;

/// Failure to bring up a [`crate::Symbolizer`].
#[derive(Debug, Error)]
pub enum InitError {
    #[error("symbolizer path must not be empty")]
    PathCorrupted,
    #[error("symbolizer path {0:?} is not an executable file")]
    PathNotExecutable(String),
    #[error("unrecognized symbolizer tool at {0:?}: expected an llvm-symbolizer or addr2line binary")]
    UnsupportedTool(String),
}

/// Failure of `code_send`/`data_send`.
#[derive(Debug, Error)]
pub enum SymbolizeError {
    #[error("the symbolizer coprocess failed to respond")]
    Failed,
    #[error("this backend does not support DATA lookups")]
    DataUnsupported,
}

/// Failure of `code_read`/`data_read`.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no successful lookup is pending on this slot")]
    NoResult,
    #[error("frame index {index} out of bounds (have {len})")]
    OutOfBounds { index: usize, len: usize },
}

/// Failures below the façade: spawning and piping a coprocess.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("fork/exec of {path:?} failed: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not allocate two pipes with both endpoints above stderr")]
    NoHighFds,
}
