//! ZTR chunks and the per-chunk codec registry.
//!
//! # Chunk layout (big-endian)
//! ```text
//! type[4]  meta_len: u32  metadata[meta_len]  data_len: u32  data[data_len]
//! ```
//! `data` is a self-describing block (see [`super::data`]).  The tables below
//! describe the raw layout that remains after every format layer is peeled.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use tracing::{debug, warn};

use crate::chromatogram::{Chromatogram, ChromatogramBuilder, ChannelId, ClipRange};
use crate::error::{Result, TraceError};
use crate::options::ZtrPipelines;
use crate::stream::{OffsetReader, SectionCursor};
use crate::transform::Pipeline;
use super::data;

// ── Chunk type ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// All four channels of 16-bit samples.
    Smp4,
    /// One channel of 16-bit samples; metadata names the channel.
    Samp,
    Base,
    Bpos,
    Cnf4,
    Cnf1,
    Text,
    Clip,
    Comm,
    Unknown([u8; 4]),
}

impl ChunkType {
    pub fn from_tag(tag: [u8; 4]) -> Self {
        match &tag {
            b"SMP4" => ChunkType::Smp4,
            b"SAMP" => ChunkType::Samp,
            b"BASE" => ChunkType::Base,
            b"BPOS" => ChunkType::Bpos,
            b"CNF4" => ChunkType::Cnf4,
            b"CNF1" => ChunkType::Cnf1,
            b"TEXT" => ChunkType::Text,
            b"CLIP" => ChunkType::Clip,
            b"COMM" => ChunkType::Comm,
            _       => ChunkType::Unknown(tag),
        }
    }

    pub fn tag(self) -> [u8; 4] {
        match self {
            ChunkType::Smp4 => *b"SMP4",
            ChunkType::Samp => *b"SAMP",
            ChunkType::Base => *b"BASE",
            ChunkType::Bpos => *b"BPOS",
            ChunkType::Cnf4 => *b"CNF4",
            ChunkType::Cnf1 => *b"CNF1",
            ChunkType::Text => *b"TEXT",
            ChunkType::Clip => *b"CLIP",
            ChunkType::Comm => *b"COMM",
            ChunkType::Unknown(tag) => tag,
        }
    }

    pub fn name(self) -> String {
        String::from_utf8_lossy(&self.tag()).into_owned()
    }
}

// ── Chunk ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_type: ChunkType,
    pub metadata:   Vec<u8>,
    pub data:       Vec<u8>,
}

impl Chunk {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.chunk_type.tag())?;
        writer.write_u32::<BigEndian>(self.metadata.len() as u32)?;
        writer.write_all(&self.metadata)?;
        writer.write_u32::<BigEndian>(self.data.len() as u32)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Read the next chunk, or `None` at a clean end of stream.
    pub(crate) fn read<R: Read>(reader: &mut OffsetReader<R>) -> Result<Option<Self>> {
        let start = reader.offset();
        let Some(tag) = reader.read_tag("ZTR chunk header")? else {
            return Ok(None);
        };
        let chunk_type = ChunkType::from_tag(tag);
        let context = format!("ZTR {} chunk at offset {start}", chunk_type.name());
        let meta_len = BigEndian::read_u32(&reader.read_array::<4>(&context)?);
        let metadata = reader.read_block(meta_len as u64, &context)?;
        let data_len = BigEndian::read_u32(&reader.read_array::<4>(&context)?);
        let data = reader.read_block(data_len as u64, &context)?;
        debug!(chunk = %chunk_type.name(), offset = start, meta_len, data_len, "read ZTR chunk");
        Ok(Some(Self { chunk_type, metadata, data }))
    }
}

// ── Codec registry ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkCodec {
    /// Zero-length data: nothing to decode.
    Null,
    Samples4,
    Samples1,
    Bases,
    Positions,
    Confidence4,
    Confidence1,
    Text,
    Clip,
    Comment,
    /// Legal but unknown chunk type; skipped.
    Unsupported([u8; 4]),
}

impl ChunkCodec {
    pub fn lookup(chunk_type: ChunkType, data_len: usize) -> Self {
        if data_len == 0 {
            return ChunkCodec::Null;
        }
        match chunk_type {
            ChunkType::Smp4 => ChunkCodec::Samples4,
            ChunkType::Samp => ChunkCodec::Samples1,
            ChunkType::Base => ChunkCodec::Bases,
            ChunkType::Bpos => ChunkCodec::Positions,
            ChunkType::Cnf4 => ChunkCodec::Confidence4,
            ChunkType::Cnf1 => ChunkCodec::Confidence1,
            ChunkType::Text => ChunkCodec::Text,
            ChunkType::Clip => ChunkCodec::Clip,
            ChunkType::Comm => ChunkCodec::Comment,
            ChunkType::Unknown(tag) => ChunkCodec::Unsupported(tag),
        }
    }

    /// Decode one chunk into `builder`.
    pub fn decode(&self, chunk: &Chunk, context: &str, builder: ChromatogramBuilder) -> Result<ChromatogramBuilder> {
        let raw = match self {
            ChunkCodec::Null => return Ok(builder),
            ChunkCodec::Unsupported(tag) => {
                warn!(chunk = %String::from_utf8_lossy(tag), "skipping unknown ZTR chunk");
                return Ok(builder);
            }
            _ => data::unwrap(&chunk.data, context)?,
        };
        let mut cursor = SectionCursor::new(&raw, context);
        let builder = match self {
            ChunkCodec::Samples4    => decode_smp4(&mut cursor, builder)?,
            ChunkCodec::Samples1    => decode_samp(&chunk.metadata, &mut cursor, builder)?,
            ChunkCodec::Bases       => {
                let calls: String = cursor.rest().iter().map(|&b| b as char).collect();
                builder.basecalls(calls)
            }
            ChunkCodec::Positions   => decode_bpos(&mut cursor, builder)?,
            ChunkCodec::Confidence4 => decode_cnf4(&mut cursor, context, builder)?,
            ChunkCodec::Confidence1 => builder.qualities(cursor.rest().to_vec()),
            ChunkCodec::Text        => builder.comments(parse_text(cursor.rest())),
            ChunkCodec::Clip        => {
                let left = cursor.u32()?;
                let right = cursor.u32()?;
                builder.clip(ClipRange { left, right })
            }
            ChunkCodec::Comment     => {
                builder.comment("COMM", String::from_utf8_lossy(cursor.rest()).into_owned())
            }
            ChunkCodec::Null | ChunkCodec::Unsupported(_) => builder,
        };
        cursor.finish()?;
        Ok(builder)
    }
}

// ── Raw layouts: decode ──────────────────────────────────────────────────────

fn read_u16s(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(BigEndian::read_u16).collect()
}

fn decode_smp4(cursor: &mut SectionCursor<'_>, mut builder: ChromatogramBuilder) -> Result<ChromatogramBuilder> {
    cursor.take(1)?;
    let total = cursor.remaining();
    if total % 8 != 0 {
        return Err(TraceError::framing("ZTR SMP4 chunk", format!("{total} sample bytes do not split into four 16-bit channels")));
    }
    let per_channel = total / 4;
    for id in ChannelId::ALL {
        builder = builder.samples(id, read_u16s(cursor.take(per_channel)?));
    }
    Ok(builder)
}

fn decode_samp(
    metadata: &[u8],
    cursor:   &mut SectionCursor<'_>,
    builder:  ChromatogramBuilder,
) -> Result<ChromatogramBuilder> {
    cursor.take(1)?;
    let body = cursor.rest();
    if body.len() % 2 != 0 {
        return Err(TraceError::framing("ZTR SAMP chunk", "odd number of sample bytes"));
    }
    // Newer files carry `TYPE\0<channel>\0`; older ones the bare channel name.
    let meta = parse_text(metadata);
    let name: &[u8] = match meta.get("TYPE") {
        Some(value) => value.as_bytes(),
        None        => metadata.split(|&b| b == 0).next().unwrap_or_default(),
    };
    let channel = match name {
        [base] => ChannelId::from_base(*base),
        _      => None,
    };
    match channel {
        Some(id) => Ok(builder.samples(id, read_u16s(body))),
        None => {
            warn!(channel = %String::from_utf8_lossy(name), "skipping ZTR SAMP chunk for unknown channel");
            Ok(builder)
        }
    }
}

fn decode_bpos(cursor: &mut SectionCursor<'_>, builder: ChromatogramBuilder) -> Result<ChromatogramBuilder> {
    cursor.take(3)?;
    let mut peaks = Vec::with_capacity(cursor.remaining() / 4);
    while cursor.remaining() > 0 {
        peaks.push(cursor.u32()?);
    }
    Ok(builder.peaks(peaks))
}

/// CNF4 stores the called base's confidence for every base first, then the
/// other three channels per base in A, C, G, T order.  Calls outside ACGT are
/// stored as if the call were T.
fn decode_cnf4(
    cursor:  &mut SectionCursor<'_>,
    context: &str,
    mut builder: ChromatogramBuilder,
) -> Result<ChromatogramBuilder> {
    let calls = builder
        .current_basecalls()
        .ok_or_else(|| TraceError::framing(context, "confidence chunk precedes the BASE chunk"))?
        .as_bytes()
        .to_vec();
    let n = calls.len();
    let called = cursor.take(n)?;
    let others = cursor.take(3 * n)?;

    let mut confidence: [Vec<u8>; 4] = std::array::from_fn(|_| vec![0; n]);
    for (i, &call) in calls.iter().enumerate() {
        let call_id = ChannelId::from_base(call).unwrap_or(ChannelId::T);
        confidence[call_id.index()][i] = called[i];
        let mut rest = others[3 * i..3 * i + 3].iter();
        for id in ChannelId::ALL.into_iter().filter(|&id| id != call_id) {
            if let Some(&c) = rest.next() {
                confidence[id.index()][i] = c;
            }
        }
    }
    for (id, conf) in ChannelId::ALL.into_iter().zip(confidence) {
        builder = builder.confidence(id, conf);
    }
    Ok(builder)
}

/// `key\0value\0` pairs, optionally closed by an extra NUL.
fn parse_text(body: &[u8]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut fields = body.split(|&b| b == 0);
    while let Some(key) = fields.next() {
        if key.is_empty() {
            break;
        }
        let value = fields.next().unwrap_or_default();
        out.insert(
            String::from_utf8_lossy(key).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        );
    }
    out
}

// ── Raw layouts: encode ──────────────────────────────────────────────────────

fn build(chunk_type: ChunkType, raw: &[u8], pipeline: &Pipeline) -> Result<Chunk> {
    let data = data::wrap(raw, pipeline, &format!("ZTR {} chunk", chunk_type.name()))?;
    Ok(Chunk { chunk_type, metadata: Vec::new(), data })
}

/// Chunks for `trace` in write order.  Absent fields produce no chunk.
pub fn encode_chunks(trace: &Chromatogram, pipelines: &ZtrPipelines) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    if trace.sample_count() > 0 {
        let mut raw = Vec::with_capacity(1 + trace.sample_count() * 8);
        raw.push(0);
        for (_, channel) in trace.channels().iter() {
            for &s in &channel.samples {
                raw.extend_from_slice(&s.to_be_bytes());
            }
        }
        chunks.push(build(ChunkType::Smp4, &raw, &pipelines.samples)?);
    }

    if trace.base_count() > 0 {
        chunks.push(build(ChunkType::Base, trace.basecalls().as_bytes(), &pipelines.bases)?);
    }

    if !trace.peaks().is_empty() {
        let mut raw = vec![0u8; 3];
        for &p in trace.peaks() {
            raw.extend_from_slice(&p.to_be_bytes());
        }
        chunks.push(build(ChunkType::Bpos, &raw, &pipelines.positions)?);
    }

    if !trace.qualities().is_empty() {
        chunks.push(build(ChunkType::Cnf4, &encode_cnf4(trace), &pipelines.confidence)?);
    }

    if !trace.comments().is_empty() {
        let mut raw = Vec::new();
        for (key, value) in trace.comments() {
            if key.is_empty() || key.contains('\0') || value.contains('\0') {
                return Err(TraceError::InvalidTrace(format!("comment {key:?} cannot be stored in a ZTR TEXT chunk")));
            }
            raw.extend_from_slice(key.as_bytes());
            raw.push(0);
            raw.extend_from_slice(value.as_bytes());
            raw.push(0);
        }
        raw.push(0);
        chunks.push(build(ChunkType::Text, &raw, &pipelines.text)?);
    }

    if let Some(clip) = trace.clip() {
        let mut raw = Vec::with_capacity(8);
        raw.extend_from_slice(&clip.left.to_be_bytes());
        raw.extend_from_slice(&clip.right.to_be_bytes());
        chunks.push(build(ChunkType::Clip, &raw, &pipelines.clip)?);
    }

    Ok(chunks)
}

fn encode_cnf4(trace: &Chromatogram) -> Vec<u8> {
    let calls = trace.basecalls().as_bytes();
    let channels = trace.channels();
    let mut raw = Vec::with_capacity(calls.len() * 4);
    let call_ids: Vec<ChannelId> = calls.iter().map(|&b| ChannelId::from_base(b).unwrap_or(ChannelId::T)).collect();
    for (i, id) in call_ids.iter().enumerate() {
        raw.push(channels.get(*id).confidence[i]);
    }
    for (i, &call_id) in call_ids.iter().enumerate() {
        for id in ChannelId::ALL.into_iter().filter(|&id| id != call_id) {
            raw.push(channels.get(id).confidence[i]);
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_map_both_ways() {
        for tag in [b"SMP4", b"BASE", b"BPOS", b"CNF4", b"TEXT", b"CLIP", b"SAMP", b"CNF1", b"COMM"] {
            assert_eq!(ChunkType::from_tag(*tag).tag(), *tag);
        }
        assert_eq!(ChunkType::from_tag(*b"XTRA"), ChunkType::Unknown(*b"XTRA"));
    }

    #[test]
    fn zero_length_data_uses_the_null_codec() {
        assert_eq!(ChunkCodec::lookup(ChunkType::Smp4, 0), ChunkCodec::Null);
        let chunk = Chunk { chunk_type: ChunkType::Smp4, metadata: Vec::new(), data: Vec::new() };
        let builder = ChunkCodec::Null.decode(&chunk, "SMP4", ChromatogramBuilder::new()).unwrap();
        assert_eq!(builder.build().unwrap().sample_count(), 0);
    }

    #[test]
    fn cnf4_puts_the_call_first() {
        let trace = Chromatogram::builder()
            .basecalls("CN")
            .confidence(ChannelId::A, vec![1, 5])
            .confidence(ChannelId::C, vec![30, 6])
            .confidence(ChannelId::G, vec![2, 7])
            .confidence(ChannelId::T, vec![3, 8])
            .build()
            .unwrap();
        let raw = encode_cnf4(&trace);
        assert_eq!(raw, vec![30, 8, 1, 2, 3, 5, 6, 7]);

        let mut cursor = SectionCursor::new(&raw, "CNF4");
        let builder = ChromatogramBuilder::new().basecalls("CN");
        let decoded = decode_cnf4(&mut cursor, "CNF4", builder).unwrap().build().unwrap();
        assert_eq!(decoded.channels(), trace.channels());
    }

    #[test]
    fn cnf4_with_one_confidence_channel() {
        let trace = Chromatogram::builder()
            .basecalls("AA")
            .qualities(vec![10, 3])
            .confidence(ChannelId::A, vec![10, 3])
            .build()
            .unwrap();
        let raw = encode_cnf4(&trace);
        assert_eq!(raw, vec![10, 3, 0, 0, 0, 0, 0, 0]);

        let mut cursor = SectionCursor::new(&raw, "CNF4");
        let builder = ChromatogramBuilder::new().basecalls("AA");
        let decoded = decode_cnf4(&mut cursor, "CNF4", builder).unwrap().build().unwrap();
        assert_eq!(decoded.qualities(), trace.qualities());
        assert_eq!(decoded.channels(), trace.channels());
    }

    #[test]
    fn cnf4_without_bases_is_a_framing_error() {
        let mut cursor = SectionCursor::new(&[1, 2, 3, 4], "CNF4");
        let err = decode_cnf4(&mut cursor, "CNF4", ChromatogramBuilder::new()).unwrap_err();
        assert!(matches!(err, TraceError::Framing { .. }));
    }

    #[test]
    fn text_pairs_allow_empty_values() {
        let parsed = parse_text(b"NAME\0seq1\0NOTE\0\0\0");
        assert_eq!(parsed["NAME"], "seq1");
        assert_eq!(parsed["NOTE"], "");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn samp_chunks_fill_one_channel() {
        let chunk = Chunk {
            chunk_type: ChunkType::Samp,
            metadata:   b"TYPE\0G\0".to_vec(),
            data:       vec![0, 0, 0, 5, 0, 6],
        };
        let builder = ChunkCodec::Samples1.decode(&chunk, "SAMP", ChromatogramBuilder::new()).unwrap();
        let builder = ChannelId::ALL
            .into_iter()
            .filter(|&id| id != ChannelId::G)
            .fold(builder, |b, id| b.samples(id, vec![0, 0]));
        assert_eq!(builder.build().unwrap().channels().g().samples, vec![5, 6]);
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let chunk = Chunk { chunk_type: ChunkType::Unknown(*b"XTRA"), metadata: Vec::new(), data: vec![9, 9] };
        let codec = ChunkCodec::lookup(chunk.chunk_type, chunk.data.len());
        assert!(codec.decode(&chunk, "XTRA", ChromatogramBuilder::new()).is_ok());
    }
}
