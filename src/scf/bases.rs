//! Base-call codecs.
//!
//! Both layouts carry, per base, a peak position (`u32`), four channel
//! confidences, the call itself and three spare bytes.  v2 stores them as
//! 12-byte rows; v3 stores each field as a column.

use crate::chromatogram::{Chromatogram, ChromatogramBuilder, ChannelId};
use crate::error::{Result, TraceError};
use crate::stream::SectionCursor;
use super::header::ScfHeader;

const SPARE: usize = 3;

/// Columns shared by both layouts.
struct BaseColumns {
    peaks:      Vec<u32>,
    confidence: [Vec<u8>; 4],
    calls:      Vec<u8>,
}

impl BaseColumns {
    fn with_capacity(n: usize) -> Self {
        Self {
            peaks:      Vec::with_capacity(n),
            confidence: std::array::from_fn(|_| Vec::with_capacity(n)),
            calls:      Vec::with_capacity(n),
        }
    }

    /// Missing per-base vectors are written as zeros.
    fn from_trace(trace: &Chromatogram) -> Self {
        let n = trace.base_count();
        let or_zero = |v: &[u8]| if v.is_empty() { vec![0; n] } else { v.to_vec() };
        Self {
            peaks:      if trace.peaks().is_empty() { vec![0; n] } else { trace.peaks().to_vec() },
            confidence: ChannelId::ALL.map(|id| or_zero(&trace.channels().get(id).confidence)),
            calls:      trace.basecalls().as_bytes().to_vec(),
        }
    }

    fn into_builder(self, mut builder: ChromatogramBuilder) -> ChromatogramBuilder {
        let basecalls: String = self.calls.iter().map(|&b| b as char).collect();
        builder = builder.basecalls(basecalls).peaks(self.peaks);
        for (id, conf) in ChannelId::ALL.into_iter().zip(self.confidence) {
            builder = builder.confidence(id, conf);
        }
        builder
    }
}

fn base_count(trace: &Chromatogram, header: &mut ScfHeader) -> Result<usize> {
    header.bases = u32::try_from(trace.base_count())
        .map_err(|_| TraceError::InvalidTrace("too many bases for SCF".into()))?;
    Ok(trace.base_count())
}

// ── v2: rows ─────────────────────────────────────────────────────────────────

pub(super) fn decode_v2(
    payload: &[u8],
    header:  &ScfHeader,
    context: &str,
    builder: ChromatogramBuilder,
) -> Result<ChromatogramBuilder> {
    let n = header.bases as usize;
    let mut cols = BaseColumns::with_capacity(n);
    let mut cursor = SectionCursor::new(payload, context);
    for _ in 0..n {
        cols.peaks.push(cursor.u32()?);
        for conf in cols.confidence.iter_mut() {
            conf.push(cursor.u8()?);
        }
        cols.calls.push(cursor.u8()?);
        cursor.take(SPARE)?;
    }
    cursor.finish()?;
    Ok(cols.into_builder(builder))
}

pub(super) fn encode_v2(trace: &Chromatogram, header: &mut ScfHeader) -> Result<Vec<u8>> {
    let n = base_count(trace, header)?;
    let cols = BaseColumns::from_trace(trace);
    let mut out = Vec::with_capacity(n * 12);
    for i in 0..n {
        out.extend_from_slice(&cols.peaks[i].to_be_bytes());
        for conf in &cols.confidence {
            out.push(conf[i]);
        }
        out.push(cols.calls[i]);
        out.extend_from_slice(&[0; SPARE]);
    }
    Ok(out)
}

// ── v3: columns ──────────────────────────────────────────────────────────────

pub(super) fn decode_v3(
    payload: &[u8],
    header:  &ScfHeader,
    context: &str,
    builder: ChromatogramBuilder,
) -> Result<ChromatogramBuilder> {
    let n = header.bases as usize;
    let mut cols = BaseColumns::with_capacity(n);
    let mut cursor = SectionCursor::new(payload, context);
    for _ in 0..n {
        cols.peaks.push(cursor.u32()?);
    }
    for conf in cols.confidence.iter_mut() {
        conf.extend_from_slice(cursor.take(n)?);
    }
    cols.calls.extend_from_slice(cursor.take(n)?);
    cursor.take(n * SPARE)?;
    cursor.finish()?;
    Ok(cols.into_builder(builder))
}

pub(super) fn encode_v3(trace: &Chromatogram, header: &mut ScfHeader) -> Result<Vec<u8>> {
    let n = base_count(trace, header)?;
    let cols = BaseColumns::from_trace(trace);
    let mut out = Vec::with_capacity(n * 12);
    for peak in &cols.peaks {
        out.extend_from_slice(&peak.to_be_bytes());
    }
    for conf in &cols.confidence {
        out.extend_from_slice(conf);
    }
    out.extend_from_slice(&cols.calls);
    out.resize(out.len() + n * SPARE, 0);
    Ok(out)
}
