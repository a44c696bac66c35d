// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The data model shared by both backends: [`Frame`], [`CodeResult`],
//! [`DataResult`] and the [`Arch`] enum that may be folded into a request.

/// One element of an inlined-expansion sequence for a code offset.
///
/// `function`/`file` are `None` when the backend reported the `??`
/// sentinel; `line`/`column` are `0` when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// The result of a `code_send`: every frame the backend reported for one
/// module offset, most specific (innermost inlined) frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeResult {
    pub module: String,
    pub offset: u32,
    pub arch: Arch,
    pub frames: Vec<Frame>,
}

/// The result of a `data_send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataResult {
    pub module: String,
    pub offset: u32,
    pub arch: Arch,
    pub name: Option<String>,
    pub start: u64,
    pub size: u64,
    /// Empty when the backend omitted the third line of the reply.
    pub file: String,
    pub line: u32,
}

/// A closed set of architectures `llvm-symbolizer` understands via
/// `--default-arch`/the `module:arch` request suffix.
///
/// `Unknown` is a sentinel: it controls the command-format branch in
/// [`crate::backend::llvm::LlvmBackend`] and is never transmitted as the
/// literal string `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Arch {
    #[default]
    Unknown,
    I386,
    X86_64,
    X86_64h,
    Armv6,
    Armv7,
    Armv7s,
    Armv7k,
    Arm64,
    LoongArch64,
    Riscv64,
    Hexagon,
}

impl Arch {
    /// The wire string `llvm-symbolizer` expects, or `None` for `Unknown`
    /// (in which case the architecture suffix is omitted entirely).
    pub fn wire_str(self) -> Option<&'static str> {
        Some(match self {
            Arch::Unknown => return None,
            Arch::I386 => "i386",
            Arch::X86_64 => "x86_64",
            Arch::X86_64h => "x86_64h",
            Arch::Armv6 => "armv6",
            Arch::Armv7 => "armv7",
            Arch::Armv7s => "armv7s",
            Arch::Armv7k => "armv7k",
            Arch::Arm64 => "arm64",
            Arch::LoongArch64 => "loongarch64",
            Arch::Riscv64 => "riscv64",
            Arch::Hexagon => "hexagon",
        })
    }

    /// The architecture of the host this crate was built for, used to
    /// populate `--default-arch` for `llvm-symbolizer`. Anything not in
    /// the closed enum above maps to `Unknown`, which is the safe default:
    /// the tool just won't get an arch hint.
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86" => Arch::I386,
            "x86_64" => Arch::X86_64,
            "arm" => Arch::Armv7,
            "aarch64" => Arch::Arm64,
            "loongarch64" => Arch::LoongArch64,
            "riscv64" => Arch::Riscv64,
            "hexagon" => Arch::Hexagon,
            _ => Arch::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_has_no_wire_string() {
        assert_eq!(Arch::Unknown.wire_str(), None);
    }

    #[test]
    fn known_arch_round_trips_a_string() {
        assert_eq!(Arch::X86_64.wire_str(), Some("x86_64"));
        assert_eq!(Arch::Arm64.wire_str(), Some("arm64"));
    }

    #[test]
    fn default_frame_is_all_unknown() {
        let f = Frame::default();
        assert_eq!(f.function, None);
        assert_eq!(f.file, None);
        assert_eq!(f.line, 0);
        assert_eq!(f.column, 0);
    }
}
