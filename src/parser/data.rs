// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parses the fixed two- or three-line DATA grammar:
//! `<name>\n<start> <size>\n[<file>:<line>\n]`.

/// The fields a DATA reply carries beyond the module/offset/arch the
/// caller already supplied.
pub(crate) struct ParsedData {
    pub name: Option<String>,
    pub start: u64,
    pub size: u64,
    pub file: String,
    pub line: u32,
}

/// Parses `buf` as a DATA reply. Returns `None` only if the first two
/// lines (name, start/size) can't be found at all; a missing third line is
/// valid and yields an empty `file`/zero `line`, not an error.
pub(crate) fn parse(buf: &[u8]) -> Option<ParsedData> {
    let mut pos = 0usize;

    let name_end = find_newline(buf, pos)?;
    let name = normalize(&buf[pos..name_end]);
    pos = name_end + 1;

    let dims_end = find_newline(buf, pos)?;
    let dims = &buf[pos..dims_end];
    pos = dims_end + 1;
    let space = dims.iter().position(|&b| b == b' ')?;
    let start = parse_uint(std::str::from_utf8(&dims[..space]).ok()?);
    let size = parse_uint(std::str::from_utf8(&dims[space + 1..]).ok()?);

    let (file, line) = match find_newline(buf, pos) {
        Some(file_end) => {
            let line3 = &buf[pos..file_end];
            match line3.iter().position(|&b| b == b':') {
                Some(colon) => {
                    let file = normalize(&line3[..colon]).unwrap_or_default();
                    let line = parse_uint(std::str::from_utf8(&line3[colon + 1..]).ok()?) as u32;
                    (file, line)
                }
                None => (normalize(line3).unwrap_or_default(), 0),
            }
        }
        None => (String::new(), 0),
    };

    Some(ParsedData { name, start, size, file, line })
}

fn find_newline(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..].iter().position(|&b| b == b'\n').map(|i| from + i)
}

fn normalize(bytes: &[u8]) -> Option<String> {
    if bytes == b"??" {
        None
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Accepts an optional `0x`/`0X` prefix for hex, decimal otherwise.
/// Unparseable input yields `0` rather than failing the whole reply.
fn parse_uint(s: &str) -> u64 {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).unwrap_or(0)
    } else {
        s.parse().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_line_reply_has_empty_file_and_zero_line() {
        let parsed = parse(b"g_var\n0x4000 16\n").expect("parses");
        assert_eq!(parsed.name.as_deref(), Some("g_var"));
        assert_eq!(parsed.start, 0x4000);
        assert_eq!(parsed.size, 16);
        assert_eq!(parsed.file, "");
        assert_eq!(parsed.line, 0);
    }

    #[test]
    fn three_line_reply_parses_file_and_line() {
        let parsed = parse(b"g_var\n4096 32\nsrc/foo.c:7\n").expect("parses");
        assert_eq!(parsed.start, 4096);
        assert_eq!(parsed.size, 32);
        assert_eq!(parsed.file, "src/foo.c");
        assert_eq!(parsed.line, 7);
    }

    #[test]
    fn unknown_name_normalizes_to_none() {
        let parsed = parse(b"??\n0 0\n").expect("parses");
        assert_eq!(parsed.name, None);
    }
}
