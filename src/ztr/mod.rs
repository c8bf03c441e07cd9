//! ZTR container reader and writer.
//!
//! A ZTR file is an 8-byte magic, a two-byte version and a sequence of
//! chunks running to the end of the stream.  Chunk order matters only for
//! `CNF4`, whose layout is relative to the basecalls of an earlier `BASE`.

pub mod chunk;
pub mod data;

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::chromatogram::{Chromatogram, ChromatogramBuilder};
use crate::error::{Result, TraceError};
use crate::options::EncodeOptions;
use crate::stream::OffsetReader;

pub use chunk::{Chunk, ChunkCodec, ChunkType};

pub const MAGIC: &[u8; 8] = &[0xAE, b'Z', b'T', b'R', 0x0D, 0x0A, 0x1A, 0x0A];
pub const VERSION_MAJOR: u8 = 1;
/// Minor version written by the encoder.
pub const VERSION_MINOR: u8 = 2;
const MINOR_ACCEPTED: std::ops::RangeInclusive<u8> = 1..=3;
const HEADER_SIZE: usize = 10;

// ── Reader ───────────────────────────────────────────────────────────────────

pub fn decode(data: &[u8]) -> Result<Chromatogram> {
    decode_from(data)
}

pub fn decode_from<R: Read>(reader: R) -> Result<Chromatogram> {
    let mut reader = OffsetReader::new(reader);
    let header = reader.read_array::<HEADER_SIZE>("ZTR header")?;
    if &header[..8] != MAGIC {
        return Err(TraceError::unsupported("ZTR magic", hex::encode(&header[..8])));
    }
    let (major, minor) = (header[8], header[9]);
    if major != VERSION_MAJOR || !MINOR_ACCEPTED.contains(&minor) {
        return Err(TraceError::unsupported("ZTR version", format!("{major}.{minor}")));
    }
    debug!(major, minor, "parsed ZTR header");

    let mut builder = ChromatogramBuilder::new();
    let mut offset = reader.offset();
    while let Some(chunk) = Chunk::read(&mut reader)? {
        let context = format!("ZTR {} chunk at offset {offset}", chunk.chunk_type.name());
        let codec = ChunkCodec::lookup(chunk.chunk_type, chunk.data.len());
        builder = codec.decode(&chunk, &context, builder)?;
        offset = reader.offset();
    }
    builder.build()
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub fn encode(trace: &Chromatogram, opts: &EncodeOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_to(trace, opts, &mut out)?;
    Ok(out)
}

pub fn encode_to<W: Write>(trace: &Chromatogram, opts: &EncodeOptions, mut writer: W) -> Result<()> {
    opts.validate()?;
    if trace.private_data().is_some() {
        warn!("ZTR has no private data chunk; dropping private data");
    }
    let chunks = chunk::encode_chunks(trace, &opts.ztr_pipelines())?;
    debug!(chunks = chunks.len(), "writing ZTR");

    writer.write_all(MAGIC)?;
    writer.write_all(&[VERSION_MAJOR, VERSION_MINOR])?;
    for chunk in &chunks {
        chunk.write(&mut writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromatogram::{ChannelId, ClipRange};
    use crate::options::ZtrPipelines;

    fn trace() -> Chromatogram {
        Chromatogram::builder()
            .basecalls("ACGTN")
            .peaks(vec![5, 12, 20, 31, 39])
            .qualities(vec![10, 20, 30, 40, 8])
            .samples(ChannelId::A, (0..45).map(|i| (i * 97 % 1500) as u16).collect())
            .samples(ChannelId::C, (0..45).map(|i| 2000 - i as u16).collect())
            .samples(ChannelId::G, vec![0; 45])
            .samples(ChannelId::T, (0..45).map(|i| if i % 9 == 0 { 60000 } else { 3 }).collect())
            .comment("NAME", "ztr-test")
            .comment("MACH", "3730")
            .clip(ClipRange { left: 1, right: 4 })
            .build()
            .unwrap()
    }

    #[test]
    fn default_pipelines_round_trip() {
        let bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(&bytes[8..10], &[1, 2]);
        assert_eq!(decode(&bytes).unwrap(), trace());
    }

    #[test]
    fn raw_pipelines_round_trip() {
        let opts = EncodeOptions { ztr: ZtrPipelines::raw(), ..Default::default() };
        let raw = encode(&trace(), &opts).unwrap();
        let packed = encode(&trace(), &EncodeOptions::default()).unwrap();
        assert!(packed.len() < raw.len());
        assert_eq!(decode(&raw).unwrap(), trace());
    }

    #[test]
    fn chunks_follow_write_order() {
        let bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        let mut reader = OffsetReader::new(&bytes[HEADER_SIZE..]);
        let mut tags = Vec::new();
        while let Some(chunk) = Chunk::read(&mut reader).unwrap() {
            tags.push(chunk.chunk_type);
        }
        assert_eq!(
            tags,
            vec![ChunkType::Smp4, ChunkType::Base, ChunkType::Bpos, ChunkType::Cnf4, ChunkType::Text, ChunkType::Clip]
        );
    }

    #[test]
    fn future_versions_are_unsupported() {
        let mut bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        bytes[9] = 9;
        assert!(decode(&bytes).unwrap_err().is_unsupported());
    }

    #[test]
    fn truncated_chunk_is_reported() {
        let bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 3]).unwrap_err().is_truncated());
    }

    #[test]
    fn private_data_is_dropped() {
        let with_private = trace().into_builder().private_data(vec![1, 2]).build().unwrap();
        let decoded = decode(&encode(&with_private, &EncodeOptions::default()).unwrap()).unwrap();
        assert_eq!(decoded.private_data(), None);
        assert_eq!(decoded, trace());
    }
}
