//! Self-describing chunk data.
//!
//! A chunk's data block starts with a format byte.  Format `0` means the rest
//! is the chunk's raw layout; every other format names the transform that
//! produced the rest of the block from an inner block, which itself starts
//! with a format byte.  Decoding peels formats until it reaches `0`.
//!
//! | Byte | Header | Stage |
//! |------|--------|-------|
//! | 0  | `0`                | raw |
//! | 1  | `1`                | run-length (guard byte) |
//! | 2  | `2`                | zlib |
//! | 64 | `64 level`         | 8-bit delta |
//! | 65 | `65 level`         | 16-bit delta |
//! | 66 | `66 level 0 0`     | 32-bit delta |
//! | 70 | `70`               | 16 → 8 bit packing |
//! | 71 | `71`               | 32 → 8 bit packing |

use tracing::trace;

use crate::error::{Result, TraceError};
use crate::transform::{DeltaLevel, ElementWidth, Pipeline, TransformStage, DEFAULT_DEFLATE_LEVEL};

pub const FORMAT_RAW:     u8 = 0;
pub const FORMAT_RLE:     u8 = 1;
pub const FORMAT_ZLIB:    u8 = 2;
pub const FORMAT_DELTA1:  u8 = 64;
pub const FORMAT_DELTA2:  u8 = 65;
pub const FORMAT_DELTA4:  u8 = 66;
pub const FORMAT_16TO8:   u8 = 70;
pub const FORMAT_32TO8:   u8 = 71;

/// Deepest nesting of formats accepted on decode.
pub const MAX_LAYERS: usize = 16;

/// Format header written in front of a stage's output, or `None` for stages
/// that leave the block untouched.
fn format_header(stage: &TransformStage) -> Result<Option<Vec<u8>>> {
    let header = match *stage {
        TransformStage::Identity => return Ok(None),
        TransformStage::RunLength => vec![FORMAT_RLE],
        TransformStage::Deflate { .. } => vec![FORMAT_ZLIB],
        TransformStage::Delta { width: ElementWidth::Bits8, level }  => vec![FORMAT_DELTA1, level.as_u8()],
        TransformStage::Delta { width: ElementWidth::Bits16, level } => vec![FORMAT_DELTA2, level.as_u8()],
        TransformStage::Delta { width: ElementWidth::Bits32, level } => vec![FORMAT_DELTA4, level.as_u8(), 0, 0],
        TransformStage::BitPack { source: ElementWidth::Bits16, target: ElementWidth::Bits8 } => vec![FORMAT_16TO8],
        TransformStage::BitPack { source: ElementWidth::Bits32, target: ElementWidth::Bits8 } => vec![FORMAT_32TO8],
        TransformStage::BitPack { .. } => {
            return Err(TraceError::unsupported("ZTR stage", format!("{stage:?}")));
        }
    };
    Ok(Some(header))
}

/// Parse the format header at the front of `block`, returning the stage to
/// invert and the header length.
fn parse_header(block: &[u8], context: &str) -> Result<(TransformStage, usize)> {
    let delta = |width: ElementWidth, header_len: usize| -> Result<(TransformStage, usize)> {
        if block.len() < header_len {
            return Err(TraceError::framing(context, format!("format {} header is incomplete", block[0])));
        }
        let level = DeltaLevel::from_u8(block[1])
            .ok_or_else(|| TraceError::unsupported("ZTR delta level", block[1].to_string()))?;
        Ok((TransformStage::delta(width, level), header_len))
    };
    match block[0] {
        FORMAT_RLE    => Ok((TransformStage::RunLength, 1)),
        FORMAT_ZLIB   => Ok((TransformStage::Deflate { level: DEFAULT_DEFLATE_LEVEL }, 1)),
        FORMAT_DELTA1 => delta(ElementWidth::Bits8, 2),
        FORMAT_DELTA2 => delta(ElementWidth::Bits16, 2),
        FORMAT_DELTA4 => delta(ElementWidth::Bits32, 4),
        FORMAT_16TO8  => Ok((TransformStage::shrink_to_8(ElementWidth::Bits16), 1)),
        FORMAT_32TO8  => Ok((TransformStage::shrink_to_8(ElementWidth::Bits32), 1)),
        other         => Err(TraceError::unsupported("ZTR data format", other.to_string())),
    }
}

/// Strip every format layer from `data` and return the raw layout that
/// follows the final `0` format byte.
pub fn unwrap(data: &[u8], context: &str) -> Result<Vec<u8>> {
    let mut block = data.to_vec();
    for _ in 0..MAX_LAYERS {
        let Some(&format) = block.first() else {
            return Err(TraceError::framing(context, "data block has no format byte"));
        };
        if format == FORMAT_RAW {
            block.remove(0);
            return Ok(block);
        }
        let (stage, header_len) = parse_header(&block, context)?;
        trace!(format, stage = stage.name(), len = block.len(), "unwrapping ZTR layer");
        block = stage.invert(&block[header_len..]).map_err(|source| TraceError::Transform {
            stage: stage.name(),
            context: context.to_string(),
            source,
        })?;
    }
    Err(TraceError::framing(context, format!("more than {MAX_LAYERS} nested data formats")))
}

/// Prefix `raw` with the raw format byte and push it forward through
/// `pipeline`, prefixing each stage's output with that stage's header.
pub fn wrap(raw: &[u8], pipeline: &Pipeline, context: &str) -> Result<Vec<u8>> {
    let mut block = Vec::with_capacity(raw.len() + 1);
    block.push(FORMAT_RAW);
    block.extend_from_slice(raw);
    for stage in &pipeline.stages {
        let Some(header) = format_header(stage)? else { continue };
        let body = stage.apply(&block).map_err(|source| TraceError::Transform {
            stage: stage.name(),
            context: context.to_string(),
            source,
        })?;
        block = header;
        block.extend_from_slice(&body);
    }
    Ok(block)
}
