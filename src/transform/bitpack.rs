//! Narrowing of 16- or 32-bit signed values to single bytes.
//!
//! Each source value in `-127..=127` becomes one signed byte.  Any other
//! value is written as the escape byte `0x80` (-128) followed by the full
//! big-endian source element, so the mapping is lossless.

use super::{ElementWidth, TransformError};

const ESCAPE: u8 = 0x80;

pub(super) fn pack(data: &[u8], source: ElementWidth) -> Result<Vec<u8>, TransformError> {
    source.check_aligned(data)?;
    let n = source.bytes();
    let mut out = Vec::with_capacity(data.len() / n);
    for element in data.chunks_exact(n) {
        let value = sign_extend(source.read(element), source);
        if (-127..=127).contains(&value) {
            out.push(value as i8 as u8);
        } else {
            out.push(ESCAPE);
            out.extend_from_slice(element);
        }
    }
    Ok(out)
}

pub(super) fn unpack(data: &[u8], source: ElementWidth) -> Result<Vec<u8>, TransformError> {
    let n = source.bytes();
    let mut out = Vec::with_capacity(data.len() * n);
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        i += 1;
        if byte == ESCAPE {
            let available = data.len() - i;
            if available < n {
                return Err(TransformError::Truncated { expected: n as u64, available: available as u64 });
            }
            out.extend_from_slice(&data[i..i + n]);
            i += n;
        } else {
            let wide = (byte as i8 as i64).to_be_bytes();
            out.extend_from_slice(&wide[8 - n..]);
        }
    }
    Ok(out)
}

#[inline]
fn sign_extend(value: u64, width: ElementWidth) -> i64 {
    let shift = 64 - 8 * width.bytes() as u32;
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be16(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn small_values_take_one_byte() {
        let packed = pack(&be16(&[0, 1, -1, 127, -127]), ElementWidth::Bits16).unwrap();
        assert_eq!(packed, vec![0x00, 0x01, 0xFF, 0x7F, 0x81]);
    }

    #[test]
    fn boundary_values_are_escaped() {
        let packed = pack(&be16(&[128, -128, 1000]), ElementWidth::Bits16).unwrap();
        assert_eq!(packed, vec![0x80, 0x00, 0x80, 0x80, 0xFF, 0x80, 0x80, 0x03, 0xE8]);
        assert_eq!(unpack(&packed, ElementWidth::Bits16).unwrap(), be16(&[128, -128, 1000]));
    }

    #[test]
    fn thirty_two_bit_escape_carries_four_bytes() {
        let data: Vec<u8> = [5i32, 70000, -3].iter().flat_map(|v| v.to_be_bytes()).collect();
        let packed = pack(&data, ElementWidth::Bits32).unwrap();
        assert_eq!(packed.len(), 1 + 5 + 1);
        assert_eq!(unpack(&packed, ElementWidth::Bits32).unwrap(), data);
    }

    #[test]
    fn truncated_escape_is_reported() {
        assert_eq!(
            unpack(&[0x01, 0x80, 0x03], ElementWidth::Bits16),
            Err(TransformError::Truncated { expected: 2, available: 1 })
        );
    }
}
