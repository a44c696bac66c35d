// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resolves byte offsets inside an unstripped executable or shared object
//! to source locations — function names, file/line/column for code
//! offsets; variable names, start address, size, and source location for
//! data offsets — by driving an `llvm-symbolizer`-class or `addr2line`
//! coprocess over pipes.
//!
//! The library is split the way the coprocess itself is: [`process`] owns
//! fork/exec and child monitoring, [`channel`] drives the request/response
//! loop and restart policy on top of it, [`parser`] turns a reply buffer
//! into typed records, and [`backend`] supplies the per-tool argv/framing/
//! command-format differences. [`facade::Symbolizer`] is the only public
//! entry point gluing all four together.
//!
//! This crate targets Unix hosts only: the coprocess model (fork, pipes,
//! signals, sessions) has no Windows analogue in scope.

#![cfg(unix)]

mod backend;
mod channel;
mod error;
mod facade;
mod process;
mod types;

pub use error::{InitError, ProcessError, ReadError, SymbolizeError};
pub use facade::Symbolizer;
pub use types::{Arch, CodeResult, DataResult, Frame};
