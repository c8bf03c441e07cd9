//! Reversible byte-array transforms shared by the container codecs.
//!
//! # Contract
//! Every [`TransformStage`] exposes `apply` (encode direction) and `invert`
//! (decode direction).  For any buffer `b` accepted by `apply`,
//! `invert(apply(b)) == b` holds exactly.  Stages carry only static
//! configuration, so one instance may be shared between threads.
//!
//! # Element layout
//! Multi-byte elements are always big-endian, the byte order used by every
//! supported container.  Arithmetic on elements wraps at the element width.
//!
//! # Framing
//! Stages transform bare payloads.  The only exceptions are the stages that
//! cannot be inverted without knowing the original size up front: `Deflate`
//! and `RunLength` prefix their output with the uncompressed length
//! (`u32`, little-endian).  Container-level format tags are written by the
//! container that selects the stage (see `ztr::data`).

mod bitpack;
mod deflate;
mod delta;
mod rle;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Default zlib level used when a caller does not choose one.
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The encoded bytes violate the stage's format.
    #[error("Corrupt data: {0}")]
    Corrupt(String),
    /// The encoded stream ended before the stage could finish.
    #[error("Stream truncated: needed {expected} more bytes, {available} available")]
    Truncated { expected: u64, available: u64 },
    #[error("Length {len} is not a multiple of the {width}-byte element width")]
    Misaligned { len: usize, width: usize },
    #[error("Declared length {declared} does not match reconstructed length {actual}")]
    LengthMismatch { declared: u64, actual: u64 },
    #[error("Invalid stage configuration: {0}")]
    InvalidStage(String),
}

// ── Configuration enums ──────────────────────────────────────────────────────

/// Width of one numeric element inside a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementWidth {
    Bits8,
    Bits16,
    Bits32,
}

impl ElementWidth {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            ElementWidth::Bits8  => 1,
            ElementWidth::Bits16 => 2,
            ElementWidth::Bits32 => 4,
        }
    }

    #[inline]
    pub(crate) fn mask(self) -> u64 {
        match self {
            ElementWidth::Bits8  => 0xFF,
            ElementWidth::Bits16 => 0xFFFF,
            ElementWidth::Bits32 => 0xFFFF_FFFF,
        }
    }

    pub fn from_bytes(n: usize) -> Option<Self> {
        match n {
            1 => Some(ElementWidth::Bits8),
            2 => Some(ElementWidth::Bits16),
            4 => Some(ElementWidth::Bits32),
            _ => None,
        }
    }

    /// Read one element from the front of `bytes` (big-endian).
    #[inline]
    pub(crate) fn read(self, bytes: &[u8]) -> u64 {
        bytes[..self.bytes()].iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    /// Append the low `self.bytes()` bytes of `value` to `out` (big-endian).
    #[inline]
    pub(crate) fn write(self, value: u64, out: &mut Vec<u8>) {
        let be = value.to_be_bytes();
        out.extend_from_slice(&be[8 - self.bytes()..]);
    }

    pub(crate) fn check_aligned(self, data: &[u8]) -> Result<(), TransformError> {
        if data.len() % self.bytes() != 0 {
            return Err(TransformError::Misaligned { len: data.len(), width: self.bytes() });
        }
        Ok(())
    }
}

/// Number of finite-differencing rounds applied before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaLevel {
    Raw,
    Level1,
    Level2,
    Level3,
}

impl DeltaLevel {
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(DeltaLevel::Raw),
            1 => Some(DeltaLevel::Level1),
            2 => Some(DeltaLevel::Level2),
            3 => Some(DeltaLevel::Level3),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            DeltaLevel::Raw    => 0,
            DeltaLevel::Level1 => 1,
            DeltaLevel::Level2 => 2,
            DeltaLevel::Level3 => 3,
        }
    }
}

// ── Stage ────────────────────────────────────────────────────────────────────

/// One reversible transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformStage {
    Identity,
    Delta { width: ElementWidth, level: DeltaLevel },
    /// Narrow `source`-wide signed values to `target` bytes with an escape
    /// byte for values that do not fit.  Only `target = Bits8` is defined.
    BitPack { source: ElementWidth, target: ElementWidth },
    Deflate { level: u32 },
    RunLength,
}

impl TransformStage {
    pub const fn delta(width: ElementWidth, level: DeltaLevel) -> Self {
        TransformStage::Delta { width, level }
    }

    pub const fn shrink_to_8(source: ElementWidth) -> Self {
        TransformStage::BitPack { source, target: ElementWidth::Bits8 }
    }

    pub const fn deflate() -> Self {
        TransformStage::Deflate { level: DEFAULT_DEFLATE_LEVEL }
    }

    /// Short stage name used in error context and logs.
    pub fn name(&self) -> &'static str {
        match self {
            TransformStage::Identity => "identity",
            TransformStage::Delta { width: ElementWidth::Bits8, .. }  => "delta8",
            TransformStage::Delta { width: ElementWidth::Bits16, .. } => "delta16",
            TransformStage::Delta { width: ElementWidth::Bits32, .. } => "delta32",
            TransformStage::BitPack { source: ElementWidth::Bits32, .. } => "shrink32to8",
            TransformStage::BitPack { .. } => "shrink16to8",
            TransformStage::Deflate { .. } => "deflate",
            TransformStage::RunLength      => "rle",
        }
    }

    /// Encode direction.
    pub fn apply(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        trace!(stage = self.name(), input_len = data.len(), "apply");
        match *self {
            TransformStage::Identity                 => Ok(data.to_vec()),
            TransformStage::Delta { width, level }   => delta::encode(data, width, level),
            TransformStage::BitPack { source, target } => {
                check_bitpack(source, target)?;
                bitpack::pack(data, source)
            }
            TransformStage::Deflate { level }        => deflate::compress(data, level),
            TransformStage::RunLength                => rle::encode(data),
        }
    }

    /// Decode direction.
    pub fn invert(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        trace!(stage = self.name(), input_len = data.len(), "invert");
        match *self {
            TransformStage::Identity                 => Ok(data.to_vec()),
            TransformStage::Delta { width, level }   => delta::decode(data, width, level),
            TransformStage::BitPack { source, target } => {
                check_bitpack(source, target)?;
                bitpack::unpack(data, source)
            }
            TransformStage::Deflate { .. }           => deflate::decompress(data),
            TransformStage::RunLength                => rle::decode(data),
        }
    }
}

fn check_bitpack(source: ElementWidth, target: ElementWidth) -> Result<(), TransformError> {
    if target != ElementWidth::Bits8 || source == ElementWidth::Bits8 {
        return Err(TransformError::InvalidStage(format!(
            "bit packing from {} to {} bytes is not defined",
            source.bytes(), target.bytes()
        )));
    }
    Ok(())
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// An ordered list of stages.  `apply` runs them first to last; `invert`
/// runs them last to first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub stages: Vec<TransformStage>,
}

impl Pipeline {
    pub fn new(stages: Vec<TransformStage>) -> Self {
        Self { stages }
    }

    pub fn apply(&self, data: &[u8]) -> Result<Vec<u8>, (TransformStage, TransformError)> {
        let mut buf = data.to_vec();
        for stage in &self.stages {
            buf = stage.apply(&buf).map_err(|e| (*stage, e))?;
        }
        Ok(buf)
    }

    pub fn invert(&self, data: &[u8]) -> Result<Vec<u8>, (TransformStage, TransformError)> {
        let mut buf = data.to_vec();
        for stage in self.stages.iter().rev() {
            buf = stage.invert(&buf).map_err(|e| (*stage, e))?;
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn all_stages() -> Vec<TransformStage> {
        let mut stages = vec![
            TransformStage::Identity,
            TransformStage::deflate(),
            TransformStage::RunLength,
            TransformStage::shrink_to_8(ElementWidth::Bits16),
            TransformStage::shrink_to_8(ElementWidth::Bits32),
        ];
        for width in [ElementWidth::Bits8, ElementWidth::Bits16, ElementWidth::Bits32] {
            for level in [DeltaLevel::Raw, DeltaLevel::Level1, DeltaLevel::Level2, DeltaLevel::Level3] {
                stages.push(TransformStage::delta(width, level));
            }
        }
        stages
    }

    proptest! {
        #[test]
        fn every_stage_inverts_its_own_output(mut data in proptest::collection::vec(any::<u8>(), 0..512)) {
            // Keep the buffer aligned for the widest element.
            data.truncate(data.len() - data.len() % 4);
            for stage in all_stages() {
                let encoded = stage.apply(&data).unwrap();
                prop_assert_eq!(stage.invert(&encoded).unwrap(), data.clone(), "stage {}", stage.name());
            }
        }
    }

    #[test]
    fn pipeline_inverts_in_reverse_order() {
        let samples: Vec<u8> = (0u16..300).flat_map(|v| (v * 7).to_be_bytes()).collect();
        let pipeline = Pipeline::new(vec![
            TransformStage::delta(ElementWidth::Bits16, DeltaLevel::Level3),
            TransformStage::shrink_to_8(ElementWidth::Bits16),
            TransformStage::deflate(),
        ]);
        let encoded = pipeline.apply(&samples).unwrap();
        assert!(encoded.len() < samples.len());
        assert_eq!(pipeline.invert(&encoded).unwrap(), samples);
    }

    #[test]
    fn bitpack_rejects_undefined_widths() {
        let stage = TransformStage::BitPack { source: ElementWidth::Bits32, target: ElementWidth::Bits16 };
        assert!(matches!(stage.apply(&[0, 0, 0, 1]), Err(TransformError::InvalidStage(_))));
    }

    #[test]
    fn pipeline_reports_failing_stage() {
        let pipeline = Pipeline::new(vec![TransformStage::deflate()]);
        let (stage, err) = pipeline.invert(&[4, 0, 0, 0, 0xFF, 0xFF]).unwrap_err();
        assert_eq!(stage.name(), "deflate");
        assert!(matches!(err, TransformError::Corrupt(_)));
    }
}
