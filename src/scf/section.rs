//! Section codec registry.
//!
//! Each SCF section kind maps to exactly one codec, chosen by kind, layout
//! version and whether the section is present at all.  Absent sections
//! resolve to [`SectionCodec::Null`], which reads nothing and leaves the
//! offset where it was, so the reader loop never special-cases them.

use tracing::debug;

use crate::chromatogram::{Chromatogram, ChromatogramBuilder};
use crate::error::{Result, TraceError};
use super::header::{ScfHeader, ScfVersion};
use super::{bases, samples, text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Samples,
    Bases,
    Comments,
    PrivateData,
}

impl SectionKind {
    /// Order in which sections are laid out on write.
    pub const WRITE_ORDER: [SectionKind; 4] = [
        SectionKind::Samples,
        SectionKind::Bases,
        SectionKind::Comments,
        SectionKind::PrivateData,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Samples     => "samples",
            SectionKind::Bases       => "bases",
            SectionKind::Comments    => "comments",
            SectionKind::PrivateData => "private data",
        }
    }
}

/// Bytes produced for one section, before the writer assigns its offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSection {
    pub kind: SectionKind,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionCodec {
    Null(SectionKind),
    SamplesV2,
    SamplesV3,
    BasesV2,
    BasesV3,
    Comments,
    PrivateData,
}

impl SectionCodec {
    /// Codec for a section as declared by a file header.
    pub fn lookup(kind: SectionKind, version: ScfVersion, declared_len: u64) -> Self {
        if declared_len == 0 {
            return SectionCodec::Null(kind);
        }
        Self::for_kind(kind, version)
    }

    /// Codec used to write `kind` for `trace`; absent fields get `Null`.
    pub fn for_trace(kind: SectionKind, version: ScfVersion, trace: &Chromatogram) -> Self {
        let present = match kind {
            SectionKind::Samples     => trace.sample_count() > 0,
            SectionKind::Bases       => trace.base_count() > 0,
            SectionKind::Comments    => !trace.comments().is_empty(),
            SectionKind::PrivateData => trace.private_data().is_some(),
        };
        if !present {
            return SectionCodec::Null(kind);
        }
        Self::for_kind(kind, version)
    }

    fn for_kind(kind: SectionKind, version: ScfVersion) -> Self {
        match (kind, version) {
            (SectionKind::Samples, ScfVersion::V2) => SectionCodec::SamplesV2,
            (SectionKind::Samples, ScfVersion::V3) => SectionCodec::SamplesV3,
            (SectionKind::Bases, ScfVersion::V2)   => SectionCodec::BasesV2,
            (SectionKind::Bases, ScfVersion::V3)   => SectionCodec::BasesV3,
            (SectionKind::Comments, _)             => SectionCodec::Comments,
            (SectionKind::PrivateData, _)          => SectionCodec::PrivateData,
        }
    }

    pub fn kind(&self) -> SectionKind {
        match self {
            SectionCodec::Null(kind)                        => *kind,
            SectionCodec::SamplesV2 | SectionCodec::SamplesV3 => SectionKind::Samples,
            SectionCodec::BasesV2 | SectionCodec::BasesV3     => SectionKind::Bases,
            SectionCodec::Comments                          => SectionKind::Comments,
            SectionCodec::PrivateData                       => SectionKind::PrivateData,
        }
    }

    /// Decode one section whose declared bytes start at `offset`.
    ///
    /// Returns the offset just past the section together with the updated
    /// builder.  A `Null` codec returns `offset` unchanged.  Sample and base
    /// codecs reject payloads they do not consume exactly.
    pub fn decode(
        &self,
        payload: &[u8],
        offset:  u64,
        header:  &ScfHeader,
        builder: ChromatogramBuilder,
    ) -> Result<(u64, ChromatogramBuilder)> {
        let context = format!("SCF {} section at offset {offset}", self.kind().name());
        debug!(section = self.kind().name(), offset, len = payload.len(), "decoding SCF section");
        let builder = match self {
            SectionCodec::Null(_) => {
                if !payload.is_empty() {
                    return Err(TraceError::framing(context, "absent section carries data"));
                }
                return Ok((offset, builder));
            }
            SectionCodec::SamplesV2   => samples::decode_v2(payload, header, &context, builder)?,
            SectionCodec::SamplesV3   => samples::decode_v3(payload, header, &context, builder)?,
            SectionCodec::BasesV2     => bases::decode_v2(payload, header, &context, builder)?,
            SectionCodec::BasesV3     => bases::decode_v3(payload, header, &context, builder)?,
            SectionCodec::Comments    => text::decode_comments(payload, builder),
            SectionCodec::PrivateData => builder.private_data(payload.to_vec()),
        };
        Ok((offset + payload.len() as u64, builder))
    }

    /// Encode this codec's section of `trace`, recording counts and sizes in
    /// `header`.  Offsets are assigned by the writer.
    pub fn encode(&self, trace: &Chromatogram, header: &mut ScfHeader) -> Result<EncodedSection> {
        let data = match self {
            SectionCodec::Null(kind) => {
                match kind {
                    SectionKind::Samples     => header.samples = 0,
                    SectionKind::Bases       => header.bases = 0,
                    SectionKind::Comments    => header.comments_size = 0,
                    SectionKind::PrivateData => header.private_size = 0,
                }
                Vec::new()
            }
            SectionCodec::SamplesV2 => samples::encode_v2(trace, header)?,
            SectionCodec::SamplesV3 => samples::encode_v3(trace, header)?,
            SectionCodec::BasesV2   => bases::encode_v2(trace, header)?,
            SectionCodec::BasesV3   => bases::encode_v3(trace, header)?,
            SectionCodec::Comments  => {
                let data = text::encode_comments(trace.comments())?;
                header.comments_size = section_len(&data)?;
                data
            }
            SectionCodec::PrivateData => {
                let data = trace.private_data().unwrap_or_default().to_vec();
                header.private_size = section_len(&data)?;
                data
            }
        };
        Ok(EncodedSection { kind: self.kind(), data })
    }
}

pub(super) fn section_len(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len())
        .map_err(|_| TraceError::InvalidTrace(format!("section of {} bytes exceeds SCF limits", data.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_sections_resolve_to_null() {
        for kind in SectionKind::WRITE_ORDER {
            assert_eq!(SectionCodec::lookup(kind, ScfVersion::V3, 0), SectionCodec::Null(kind));
        }
        assert_eq!(SectionCodec::lookup(SectionKind::Samples, ScfVersion::V2, 8), SectionCodec::SamplesV2);
        assert_eq!(SectionCodec::lookup(SectionKind::Bases, ScfVersion::V3, 12), SectionCodec::BasesV3);
    }

    #[test]
    fn null_codec_keeps_offset_and_writes_nothing() {
        let header = ScfHeader::new(ScfVersion::V3);
        let codec = SectionCodec::Null(SectionKind::Comments);
        let (next, builder) = codec.decode(&[], 512, &header, ChromatogramBuilder::new()).unwrap();
        assert_eq!(next, 512);
        assert!(builder.build().unwrap().comments().is_empty());

        let trace = Chromatogram::builder().build().unwrap();
        let mut header = ScfHeader::new(ScfVersion::V3);
        let section = codec.encode(&trace, &mut header).unwrap();
        assert!(section.data.is_empty());
        assert_eq!(header.comments_size, 0);
    }

    #[test]
    fn unconsumed_section_bytes_are_framing_errors() {
        let mut header = ScfHeader::new(ScfVersion::V2);
        header.bases = 1;
        let mut row = vec![0, 0, 0, 7, 30, 0, 0, 0, b'A', 0, 0, 0];
        let (next, builder) = SectionCodec::BasesV2.decode(&row, 256, &header, ChromatogramBuilder::new()).unwrap();
        assert_eq!(next, 256 + 12);
        assert_eq!(builder.build().unwrap().basecalls(), "A");

        row.push(0);
        let err = SectionCodec::BasesV2.decode(&row, 256, &header, ChromatogramBuilder::new()).unwrap_err();
        assert!(matches!(err, TraceError::Framing { .. }));

        row.truncate(11);
        let err = SectionCodec::BasesV2.decode(&row, 256, &header, ChromatogramBuilder::new()).unwrap_err();
        assert!(matches!(err, TraceError::Framing { .. }));
    }

    #[test]
    fn absent_trace_fields_get_null_codecs() {
        let trace = Chromatogram::builder().basecalls("AC").build().unwrap();
        assert_eq!(
            SectionCodec::for_trace(SectionKind::Samples, ScfVersion::V3, &trace),
            SectionCodec::Null(SectionKind::Samples)
        );
        assert_eq!(SectionCodec::for_trace(SectionKind::Bases, ScfVersion::V3, &trace), SectionCodec::BasesV3);
    }
}
