//! Comment section: `KEY=VALUE` lines terminated by a NUL byte.

use std::collections::BTreeMap;

use crate::chromatogram::ChromatogramBuilder;
use crate::error::{Result, TraceError};

pub(super) fn decode_comments(payload: &[u8], mut builder: ChromatogramBuilder) -> ChromatogramBuilder {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    let text = String::from_utf8_lossy(&payload[..end]);
    for line in text.split('\n').map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() {
            continue;
        }
        builder = match line.split_once('=') {
            Some((key, value)) => builder.comment(key, value),
            None               => builder.comment(line, ""),
        };
    }
    builder
}

pub(super) fn encode_comments(comments: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (key, value) in comments {
        // Readers strip a trailing CR from each line, so CR cannot survive a round trip.
        if key.is_empty() || key.contains(&['=', '\n', '\r', '\0'][..]) || value.contains(&['\n', '\r', '\0'][..]) {
            return Err(TraceError::InvalidTrace(format!("comment {key:?} cannot be stored as an SCF line")));
        }
        out.extend_from_slice(key.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
        out.push(b'\n');
    }
    out.push(0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_round_trip() {
        let mut comments = BTreeMap::new();
        comments.insert("NAME".to_string(), "sample 1".to_string());
        comments.insert("MACH".to_string(), "ABI=3730".to_string());
        let data = encode_comments(&comments).unwrap();
        assert_eq!(data, b"MACH=ABI=3730\nNAME=sample 1\n\0");
        let trace = decode_comments(&data, ChromatogramBuilder::new()).build().unwrap();
        assert_eq!(trace.comments(), &comments);
    }

    #[test]
    fn tolerates_missing_terminator_and_bare_lines() {
        let trace = decode_comments(b"DYEP=BigDye\r\nFLAG", ChromatogramBuilder::new()).build().unwrap();
        assert_eq!(trace.comments()["DYEP"], "BigDye");
        assert_eq!(trace.comments()["FLAG"], "");
    }

    #[test]
    fn multi_line_values_are_rejected() {
        let mut comments = BTreeMap::new();
        comments.insert("NOTE".to_string(), "a\nb".to_string());
        assert!(encode_comments(&comments).is_err());
    }

    #[test]
    fn carriage_returns_are_rejected() {
        for (key, value) in [("NOTE", "x\r"), ("NOTE", "a\rb"), ("NO\rTE", "x")] {
            let mut comments = BTreeMap::new();
            comments.insert(key.to_string(), value.to_string());
            assert!(
                matches!(encode_comments(&comments), Err(TraceError::InvalidTrace(_))),
                "{key:?}={value:?} should be rejected"
            );
        }
    }
}
