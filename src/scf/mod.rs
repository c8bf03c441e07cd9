//! SCF container reader and writer.
//!
//! An SCF file is a 128-byte header followed by up to four sections located
//! by absolute offset.  The reader visits sections in file order and every
//! section codec must consume exactly its declared length; the writer
//! lays sections out back to back as samples, bases, comments, private data.
//!
//! ```rust
//! use tracecodec::{scf, Chromatogram, ChannelId, EncodeOptions};
//!
//! let trace = Chromatogram::builder()
//!     .basecalls("ACGT")
//!     .peaks(vec![2, 5, 8, 11])
//!     .qualities(vec![30, 31, 32, 33])
//!     .samples(ChannelId::A, vec![0; 12])
//!     .samples(ChannelId::C, vec![1; 12])
//!     .samples(ChannelId::G, vec![2; 12])
//!     .samples(ChannelId::T, vec![3; 12])
//!     .build()?;
//! let bytes = scf::encode(&trace, &EncodeOptions::default())?;
//! assert_eq!(scf::decode(&bytes)?, trace);
//! # Ok::<(), tracecodec::TraceError>(())
//! ```

mod bases;
pub mod header;
mod samples;
pub mod section;
mod text;

use std::io::{Read, Write};

use tracing::debug;

use crate::chromatogram::{Chromatogram, ChromatogramBuilder, ClipRange};
use crate::error::{Result, TraceError};
use crate::options::EncodeOptions;
use crate::stream::OffsetReader;

pub use header::{ScfHeader, ScfVersion, HEADER_SIZE, MAGIC};
pub use section::{EncodedSection, SectionCodec, SectionKind};

// ── Reader ───────────────────────────────────────────────────────────────────

pub fn decode(data: &[u8]) -> Result<Chromatogram> {
    decode_from(data)
}

pub fn decode_from<R: Read>(reader: R) -> Result<Chromatogram> {
    let mut reader = OffsetReader::new(reader);
    let block = reader.read_block(HEADER_SIZE, "SCF header")?;
    let header = ScfHeader::read(&block[..])?;
    let version = header.format_version()?;
    debug!(
        version = %String::from_utf8_lossy(&header.version),
        samples = header.samples,
        bases = header.bases,
        "parsed SCF header"
    );

    let mut sections: Vec<(SectionKind, u64, u64)> = SectionKind::WRITE_ORDER
        .iter()
        .map(|&kind| {
            let (offset, len) = header.section(kind);
            (kind, offset, len)
        })
        .collect();
    // Absent sections first: their offsets are meaningless.
    sections.sort_by_key(|&(_, offset, len)| (len != 0, offset));

    let mut builder = ChromatogramBuilder::new();
    for (kind, offset, len) in sections {
        let codec = SectionCodec::lookup(kind, version, len);
        let payload = if len == 0 {
            Vec::new()
        } else {
            let context = format!("SCF {} section", kind.name());
            reader.skip_to(offset, &context)?;
            reader.read_block(len, &context)?
        };
        // Each codec fails with a framing error unless it consumes the whole payload.
        let (_, b) = codec.decode(&payload, offset, &header, builder)?;
        builder = b;
    }

    if header.bases_left_clip != 0 || header.bases_right_clip != 0 {
        builder = builder.clip(ClipRange { left: header.bases_left_clip, right: header.bases_right_clip });
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
    let version = ScfVersion::from_number(opts.scf_version)
        .ok_or_else(|| TraceError::unsupported("SCF version", opts.scf_version.to_string()))?;

    let mut header = ScfHeader::new(version);
    header.sample_size = match opts.scf_sample_size {
        Some(size) => size as u32,
        None if trace.sample_count() > 0 && trace.channels().max_sample() <= 0xFF => 1,
        None => 2,
    };
    if let Some(clip) = trace.clip() {
        header.bases_left_clip = clip.left;
        header.bases_right_clip = clip.right;
    }

    let mut offset = HEADER_SIZE;
    let mut sections = Vec::with_capacity(SectionKind::WRITE_ORDER.len());
    for kind in SectionKind::WRITE_ORDER {
        let codec = SectionCodec::for_trace(kind, version, trace);
        let section = codec.encode(trace, &mut header)?;
        let declared = header.section(kind).1;
        if declared != section.data.len() as u64 {
            return Err(TraceError::framing(
                format!("SCF {} section", kind.name()),
                format!("header declares {declared} bytes, codec produced {}", section.data.len()),
            ));
        }
        let start = u32::try_from(offset)
            .map_err(|_| TraceError::InvalidTrace("trace too large for SCF offsets".into()))?;
        header.set_offset(kind, start);
        offset += declared;
        sections.push(section);
    }

    debug!(bytes = offset, sample_size = header.sample_size, "writing SCF");
    header.write(&mut writer)?;
    for section in &sections {
        writer.write_all(&section.data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromatogram::ChannelId;

    fn trace() -> Chromatogram {
        Chromatogram::builder()
            .basecalls("GATTACA")
            .peaks(vec![4, 10, 16, 22, 28, 34, 40])
            .qualities(vec![20, 25, 30, 35, 40, 45, 50])
            .samples(ChannelId::A, (0..44).map(|i| i * 3).collect())
            .samples(ChannelId::C, (0..44).map(|i| 200 - i).collect())
            .samples(ChannelId::G, vec![17; 44])
            .samples(ChannelId::T, (0..44).map(|i| i % 5).collect())
            .comment("NAME", "gattaca")
            .private_data(vec![1, 2, 3])
            .clip(ClipRange { left: 2, right: 6 })
            .build()
            .unwrap()
    }

    #[test]
    fn v3_round_trip_with_one_byte_samples() {
        let bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        let header = ScfHeader::read(&bytes[..HEADER_SIZE as usize]).unwrap();
        assert_eq!(header.sample_size, 1);
        assert_eq!(header.samples_offset, 128);
        assert_eq!(header.bases_offset, 128 + 44 * 4);
        assert_eq!(decode(&bytes).unwrap(), trace());
    }

    #[test]
    fn v2_and_v3_decode_identically() {
        let v2 = encode(&trace(), &EncodeOptions { scf_version: 2, ..Default::default() }).unwrap();
        let v3 = encode(&trace(), &EncodeOptions::default()).unwrap();
        assert_ne!(v2, v3);
        assert_eq!(decode(&v2).unwrap(), decode(&v3).unwrap());
    }

    #[test]
    fn empty_trace_has_zero_length_sections() {
        let empty = Chromatogram::builder().build().unwrap();
        let bytes = encode(&empty, &EncodeOptions::default()).unwrap();
        assert_eq!(bytes.len() as u64, HEADER_SIZE);
        let header = ScfHeader::read(&bytes[..]).unwrap();
        for kind in SectionKind::WRITE_ORDER {
            assert_eq!(header.section(kind), (HEADER_SIZE, 0));
        }
        assert_eq!(decode(&bytes).unwrap(), empty);
    }

    #[test]
    fn declared_length_past_the_end_is_truncation() {
        let mut bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(decode(&bytes).unwrap_err().is_truncated());
    }

    #[test]
    fn overlapping_sections_are_framing_errors() {
        let mut bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        let mut header = ScfHeader::read(&bytes[..HEADER_SIZE as usize]).unwrap();
        header.bases_offset -= 4;
        let mut patched = Vec::new();
        header.write(&mut patched).unwrap();
        bytes[..HEADER_SIZE as usize].copy_from_slice(&patched);
        assert!(matches!(decode(&bytes), Err(TraceError::Framing { .. })));
    }

    #[test]
    fn zero_clip_reads_back_as_no_clip() {
        let unclipped = Chromatogram::builder()
            .basecalls("AC")
            .peaks(vec![1, 2])
            .qualities(vec![9, 9])
            .clip(ClipRange { left: 0, right: 0 })
            .build()
            .unwrap();
        assert_eq!(unclipped.clip(), None);
        let bytes = encode(&unclipped, &EncodeOptions::default()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), unclipped);

        let right_only = Chromatogram::builder()
            .basecalls("AC")
            .peaks(vec![1, 2])
            .qualities(vec![9, 9])
            .clip(ClipRange { left: 0, right: 2 })
            .build()
            .unwrap();
        let bytes = encode(&right_only, &EncodeOptions::default()).unwrap();
        assert_eq!(decode(&bytes).unwrap().clip(), Some(ClipRange { left: 0, right: 2 }));
    }

    #[test]
    fn forced_sample_size_that_does_not_fit_is_rejected() {
        let wide = Chromatogram::builder()
            .samples(ChannelId::A, vec![1000])
            .samples(ChannelId::C, vec![0])
            .samples(ChannelId::G, vec![0])
            .samples(ChannelId::T, vec![0])
            .build()
            .unwrap();
        let opts = EncodeOptions { scf_sample_size: Some(1), ..Default::default() };
        assert!(matches!(encode(&wide, &opts), Err(TraceError::InvalidTrace(_))));
        let auto = encode(&wide, &EncodeOptions::default()).unwrap();
        assert_eq!(ScfHeader::read(&auto[..HEADER_SIZE as usize]).unwrap().sample_size, 2);
    }
}
