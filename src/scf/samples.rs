//! Sample codecs.
//!
//! v2 stores one `sample_size`-byte big-endian value per channel per sample
//! point, interleaved A, C, G, T.  v3 stores each channel contiguously after
//! two first-order delta passes.

use crate::chromatogram::{Chromatogram, ChromatogramBuilder, ChannelId};
use crate::error::{Result, TraceError};
use crate::stream::SectionCursor;
use crate::transform::{DeltaLevel, ElementWidth, TransformStage};
use super::header::ScfHeader;

/// v3 applies the first-order difference this many times.
const V3_DELTA_PASSES: usize = 2;

fn width_of(header: &ScfHeader) -> Result<ElementWidth> {
    match header.sample_size {
        1 => Ok(ElementWidth::Bits8),
        2 => Ok(ElementWidth::Bits16),
        n => Err(TraceError::unsupported("SCF sample size", n.to_string())),
    }
}

fn v3_stage(width: ElementWidth) -> TransformStage {
    TransformStage::delta(width, DeltaLevel::Level1)
}

// ── Decode ───────────────────────────────────────────────────────────────────

pub(super) fn decode_v2(
    payload: &[u8],
    header:  &ScfHeader,
    context: &str,
    mut builder: ChromatogramBuilder,
) -> Result<ChromatogramBuilder> {
    let width = width_of(header)?;
    let n = header.samples as usize;
    let mut channels: [Vec<u16>; 4] = Default::default();
    for ch in channels.iter_mut() {
        ch.reserve_exact(n);
    }

    let mut cursor = SectionCursor::new(payload, context);
    for _ in 0..n {
        for ch in channels.iter_mut() {
            ch.push(width.read(cursor.take(width.bytes())?) as u16);
        }
    }
    cursor.finish()?;

    for (id, samples) in ChannelId::ALL.into_iter().zip(channels) {
        builder = builder.samples(id, samples);
    }
    Ok(builder)
}

pub(super) fn decode_v3(
    payload: &[u8],
    header:  &ScfHeader,
    context: &str,
    mut builder: ChromatogramBuilder,
) -> Result<ChromatogramBuilder> {
    let width = width_of(header)?;
    let n = header.samples as usize;
    let stage = v3_stage(width);

    let mut cursor = SectionCursor::new(payload, context);
    for id in ChannelId::ALL {
        let mut block = cursor.take(n * width.bytes())?.to_vec();
        for _ in 0..V3_DELTA_PASSES {
            block = stage.invert(&block).map_err(|source| TraceError::Transform {
                stage: stage.name(),
                context: context.to_string(),
                source,
            })?;
        }
        let samples = block.chunks_exact(width.bytes()).map(|b| width.read(b) as u16).collect();
        builder = builder.samples(id, samples);
    }
    cursor.finish()?;
    Ok(builder)
}

// ── Encode ───────────────────────────────────────────────────────────────────

/// Check that every sample fits the header's precision and record the count.
fn prepare(trace: &Chromatogram, header: &mut ScfHeader) -> Result<ElementWidth> {
    let width = width_of(header)?;
    let max = trace.channels().max_sample() as u64;
    if max > width.mask() {
        return Err(TraceError::InvalidTrace(format!(
            "sample value {max} does not fit in {} byte(s)",
            width.bytes()
        )));
    }
    header.samples = u32::try_from(trace.sample_count())
        .map_err(|_| TraceError::InvalidTrace("too many samples for SCF".into()))?;
    Ok(width)
}

pub(super) fn encode_v2(trace: &Chromatogram, header: &mut ScfHeader) -> Result<Vec<u8>> {
    let width = prepare(trace, header)?;
    let channels = trace.channels();
    let mut out = Vec::with_capacity(trace.sample_count() * 4 * width.bytes());
    for i in 0..trace.sample_count() {
        for id in ChannelId::ALL {
            width.write(channels.get(id).samples[i] as u64, &mut out);
        }
    }
    Ok(out)
}

pub(super) fn encode_v3(trace: &Chromatogram, header: &mut ScfHeader) -> Result<Vec<u8>> {
    let width = prepare(trace, header)?;
    let stage = v3_stage(width);
    let mut out = Vec::with_capacity(trace.sample_count() * 4 * width.bytes());
    for (_, channel) in trace.channels().iter() {
        let mut block = Vec::with_capacity(channel.samples.len() * width.bytes());
        for &s in &channel.samples {
            width.write(s as u64, &mut block);
        }
        for _ in 0..V3_DELTA_PASSES {
            block = stage.apply(&block).map_err(|source| TraceError::Transform {
                stage: stage.name(),
                context: "SCF samples section".to_string(),
                source,
            })?;
        }
        out.extend_from_slice(&block);
    }
    Ok(out)
}
