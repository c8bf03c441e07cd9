//! Guard-byte run-length encoding.
//!
//! Layout: `[uncompressed length: u32 LE][guard][body]`.  In the body,
//! `guard n v` expands to `n` copies of `v` and `guard 0` is a literal guard
//! byte.  The encoder picks the least frequent byte as the guard.

use byteorder::{ByteOrder, LittleEndian};

use super::TransformError;

const HEADER: usize = 5;
const MIN_RUN: usize = 4;
const MAX_RUN: usize = 255;

pub(super) fn encode(data: &[u8]) -> Result<Vec<u8>, TransformError> {
    let declared = u32::try_from(data.len())
        .map_err(|_| TransformError::InvalidStage(format!("{} bytes exceed the u32 length prefix", data.len())))?;
    let guard = least_frequent(data);

    let mut out = Vec::with_capacity(HEADER + data.len());
    out.extend_from_slice(&declared.to_le_bytes());
    out.push(guard);

    let mut i = 0;
    while i < data.len() {
        let value = data[i];
        let mut run = 1;
        while i + run < data.len() && data[i + run] == value && run < MAX_RUN {
            run += 1;
        }
        if run >= MIN_RUN {
            out.extend_from_slice(&[guard, run as u8, value]);
        } else {
            for _ in 0..run {
                if value == guard {
                    out.extend_from_slice(&[guard, 0]);
                } else {
                    out.push(value);
                }
            }
        }
        i += run;
    }
    Ok(out)
}

pub(super) fn decode(data: &[u8]) -> Result<Vec<u8>, TransformError> {
    if data.len() < HEADER {
        return Err(TransformError::Truncated { expected: HEADER as u64, available: data.len() as u64 });
    }
    let declared = LittleEndian::read_u32(&data[..4]) as usize;
    let guard = data[4];
    let body = &data[HEADER..];

    let mut out = Vec::with_capacity(declared.min(body.len().saturating_mul(MAX_RUN)));
    let mut i = 0;
    while i < body.len() {
        let byte = body[i];
        i += 1;
        if byte != guard {
            out.push(byte);
            continue;
        }
        let count = *body.get(i).ok_or(TransformError::Truncated { expected: 1, available: 0 })? as usize;
        i += 1;
        if count == 0 {
            out.push(guard);
            continue;
        }
        let value = *body.get(i).ok_or(TransformError::Truncated { expected: 1, available: 0 })?;
        i += 1;
        out.resize(out.len() + count, value);
    }

    if out.len() != declared {
        return Err(TransformError::LengthMismatch { declared: declared as u64, actual: out.len() as u64 });
    }
    Ok(out)
}

fn least_frequent(data: &[u8]) -> u8 {
    let mut counts = [0usize; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    // Ties resolve to the lowest byte value so output is reproducible.
    (0..=255u8).min_by_key(|&b| counts[b as usize]).unwrap_or(0)
}
