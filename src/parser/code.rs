// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parses the `<function>\n<file>:<line>[:<column>]\n` grammar shared by
//! both backends into an ordered [`Frame`] list.
//!
//! The LLVM backend leaves its terminating blank line in the buffer (an
//! empty function string there ends the loop); the addr2line backend's
//! framing strips `??\n??:0\n` before the buffer ever reaches this parser,
//! so here it just looks like running out of input.

use crate::types::Frame;

/// Parses as many `<function>\n<file>:<line>[:<column>]\n` pairs as `buf`
/// holds, stopping at the first empty function line or when input runs
/// out. Truncated or unparseable input yields whatever frames were
/// recovered so far rather than an error — partial data is preferred over
/// discarding a whole reply.
pub(crate) fn parse(buf: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut pos = 0usize;

    loop {
        let Some(func_end) = find_newline(buf, pos) else {
            break;
        };
        let func_bytes = &buf[pos..func_end];
        pos = func_end + 1;
        if func_bytes.is_empty() {
            break;
        }

        let Some(line_end) = find_newline(buf, pos) else {
            break;
        };
        let token = String::from_utf8_lossy(&buf[pos..line_end]).into_owned();
        pos = line_end + 1;

        let (mut file, line, column) = parse_location(&token);
        if line == 0 && file.ends_with(":?") {
            file.truncate(file.len() - 2);
        }

        frames.push(Frame {
            function: normalize(func_bytes),
            file: normalize(file.as_bytes()),
            line,
            column,
        });
    }

    frames
}

fn find_newline(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..].iter().position(|&b| b == b'\n').map(|i| from + i)
}

/// `??` (the backends' not-available sentinel) normalizes to `None`;
/// anything else becomes an owned string.
fn normalize(bytes: &[u8]) -> Option<String> {
    if bytes == b"??" {
        None
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Splits `token` into `(file, line, column)` by scanning right-to-left for
/// up to two `:<digits>` suffixes. One suffix is the line; a second,
/// further-left suffix demotes the first into the column and becomes the
/// line itself. A suffix that doesn't match ends the scan and the
/// remainder (whatever wasn't consumed) is the file name.
fn parse_location(token: &str) -> (String, u32, u32) {
    let mut remainder = token;
    let mut line = 0u32;
    let mut column = 0u32;

    if let Some((rest, value)) = strip_trailing_colon_digits(remainder) {
        line = value;
        remainder = rest;
        if let Some((rest2, value2)) = strip_trailing_colon_digits(remainder) {
            column = line;
            line = value2;
            remainder = rest2;
        }
    }

    (remainder.to_string(), line, column)
}

/// If `s` ends with `:` followed by one or more ASCII digits, returns the
/// part before that colon and the parsed value.
fn strip_trailing_colon_digits(s: &str) -> Option<(&str, u32)> {
    let colon = s.rfind(':')?;
    let digits = &s[colon + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = digits.parse().ok()?;
    Some((&s[..colon], value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_unknown_frame_normalizes_to_null_fields() {
        let frames = parse(b"??\n??:0\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].function, None);
        assert_eq!(frames[0].file, None);
        assert_eq!(frames[0].line, 0);
        assert_eq!(frames[0].column, 0);
    }

    #[test]
    fn simple_frame_has_line_and_no_column() {
        let frames = parse(b"main\nfile.c:42\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].function.as_deref(), Some("main"));
        assert_eq!(frames[0].file.as_deref(), Some("file.c"));
        assert_eq!(frames[0].line, 42);
        assert_eq!(frames[0].column, 0);
    }

    #[test]
    fn frame_with_column() {
        let frames = parse(b"main\nfile.c:42:7\n");
        assert_eq!(frames[0].line, 42);
        assert_eq!(frames[0].column, 7);
    }

    #[test]
    fn addr2line_unknown_line_trims_question_mark_colon() {
        let frames = parse(b"main\nfile.c:?\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].function.as_deref(), Some("main"));
        assert_eq!(frames[0].file.as_deref(), Some("file.c"));
        assert_eq!(frames[0].line, 0);
        assert_eq!(frames[0].column, 0);
    }

    #[test]
    fn llvm_blank_line_terminates_without_a_trailing_phantom_frame() {
        let frames = parse(b"foo\n/a/b.c:10:3\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].function.as_deref(), Some("foo"));
    }

    #[test]
    fn two_inlined_frames() {
        let frames = parse(b"inner\n/a/b.c:10:3\nouter\n/a/b.c:20\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].column, 3);
        assert_eq!(frames[1].column, 0);
    }

    #[test]
    fn addr2line_style_buffer_with_terminator_already_stripped() {
        let frames = parse(b"main\n/a/b.c:42\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].file.as_deref(), Some("/a/b.c"));
        assert_eq!(frames[0].line, 42);
    }
}
