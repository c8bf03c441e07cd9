//! zlib compression with an uncompressed-length prefix.
//!
//! Layout: `[uncompressed length: u32 LE][zlib stream]`.

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use super::TransformError;

const LENGTH_PREFIX: usize = 4;

/// zlib cannot expand input by more than roughly 1032:1, which bounds the
/// pre-sized buffer when the declared length is implausible.
const MAX_EXPANSION: usize = 1032;

pub(super) fn compress(data: &[u8], level: u32) -> Result<Vec<u8>, TransformError> {
    let declared = u32::try_from(data.len())
        .map_err(|_| TransformError::InvalidStage(format!("{} bytes exceed the u32 length prefix", data.len())))?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX + data.len() / 2);
    out.extend_from_slice(&declared.to_le_bytes());

    let mut encoder = ZlibEncoder::new(out, Compression::new(level.min(9)));
    encoder.write_all(data).map_err(|e| TransformError::Corrupt(e.to_string()))?;
    encoder.finish().map_err(|e| TransformError::Corrupt(e.to_string()))
}

pub(super) fn decompress(data: &[u8]) -> Result<Vec<u8>, TransformError> {
    if data.len() < LENGTH_PREFIX {
        return Err(TransformError::Truncated {
            expected:  LENGTH_PREFIX as u64,
            available: data.len() as u64,
        });
    }
    let declared = LittleEndian::read_u32(&data[..LENGTH_PREFIX]) as usize;
    let input = &data[LENGTH_PREFIX..];

    let mut out = Vec::with_capacity(declared.min(input.len().saturating_mul(MAX_EXPANSION)));
    let mut inflater = Decompress::new(true);
    loop {
        if out.len() == out.capacity() {
            out.reserve(declared.saturating_sub(out.len()).max(256));
        }
        let before_in  = inflater.total_in();
        let before_out = out.len();
        let consumed   = before_in as usize;

        let status = inflater
            .decompress_vec(&input[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| TransformError::Corrupt(e.to_string()))?;
        if status == Status::StreamEnd {
            break;
        }
        if inflater.total_in() == before_in && out.len() == before_out {
            // Output space was available, so the inflater is starved of input.
            return Err(TransformError::Truncated {
                expected:  declared.saturating_sub(out.len()) as u64,
                available: 0,
            });
        }
    }

    let trailing = input.len() - inflater.total_in() as usize;
    if trailing != 0 {
        return Err(TransformError::Corrupt(format!("{trailing} bytes follow the end of the zlib stream")));
    }
    if out.len() != declared {
        return Err(TransformError::LengthMismatch { declared: declared as u64, actual: out.len() as u64 });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_records_uncompressed_length() {
        let data = vec![7u8; 1000];
        let encoded = compress(&data, 6).unwrap();
        assert_eq!(&encoded[..4], &1000u32.to_le_bytes());
        assert!(encoded.len() < 100);
        assert_eq!(decompress(&encoded).unwrap(), data);
    }

    #[test]
    fn empty_input_round_trips() {
        let encoded = compress(&[], 6).unwrap();
        assert_eq!(decompress(&encoded).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn truncated_stream_is_not_corruption() {
        let data: Vec<u8> = (0..4000u32).map(|i| (i * 31 % 251) as u8).collect();
        let encoded = compress(&data, 6).unwrap();
        let cut = &encoded[..encoded.len() / 2];
        assert!(matches!(decompress(cut), Err(TransformError::Truncated { .. })));
    }

    #[test]
    fn garbage_stream_is_corruption() {
        let mut bad = 10u32.to_le_bytes().to_vec();
        bad.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]);
        assert!(matches!(decompress(&bad), Err(TransformError::Corrupt(_))));
    }

    #[test]
    fn wrong_declared_length_is_detected() {
        let mut encoded = compress(b"chromatogram", 6).unwrap();
        encoded[0] = 3;
        assert!(matches!(decompress(&encoded), Err(TransformError::LengthMismatch { declared: 3, actual: 12 })));
    }
}
