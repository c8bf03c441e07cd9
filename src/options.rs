//! Encoder configuration.
//!
//! Decoding needs no options: every container describes itself.  Encoding
//! has a handful of free choices, collected here so that the same trace and
//! the same options always produce the same bytes.
//!
//! ```rust
//! use tracecodec::options::EncodeOptions;
//!
//! let opts = EncodeOptions::from_json(r#"{ "scf_version": 2, "deflate_level": 9 }"#)?;
//! assert_eq!(opts.scf_version, 2);
//! assert_eq!(opts.scf_sample_size, None);
//! # Ok::<(), tracecodec::TraceError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::transform::{DeltaLevel, ElementWidth, Pipeline, TransformStage};

pub const DEFAULT_SCF_VERSION: u8 = 3;
pub const DEFAULT_AB1_VERSION: u16 = 101;

// ── ZtrPipelines ──────────────────────────────────────────────────────────────

/// Transform pipeline applied to each ZTR chunk type on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZtrPipelines {
    pub samples:    Pipeline,
    pub bases:      Pipeline,
    pub positions:  Pipeline,
    pub confidence: Pipeline,
    pub text:       Pipeline,
    pub clip:       Pipeline,
}

impl Default for ZtrPipelines {
    fn default() -> Self {
        Self {
            samples: Pipeline::new(vec![
                TransformStage::delta(ElementWidth::Bits16, DeltaLevel::Level3),
                TransformStage::shrink_to_8(ElementWidth::Bits16),
                TransformStage::deflate(),
            ]),
            bases: Pipeline::new(vec![TransformStage::deflate()]),
            positions: Pipeline::new(vec![
                TransformStage::delta(ElementWidth::Bits32, DeltaLevel::Level1),
                TransformStage::shrink_to_8(ElementWidth::Bits32),
                TransformStage::deflate(),
            ]),
            confidence: Pipeline::new(vec![
                TransformStage::delta(ElementWidth::Bits8, DeltaLevel::Level1),
                TransformStage::RunLength,
                TransformStage::deflate(),
            ]),
            text: Pipeline::new(vec![TransformStage::deflate()]),
            clip: Pipeline::default(),
        }
    }
}

impl ZtrPipelines {
    /// Store every chunk raw.
    pub fn raw() -> Self {
        Self {
            samples:    Pipeline::default(),
            bases:      Pipeline::default(),
            positions:  Pipeline::default(),
            confidence: Pipeline::default(),
            text:       Pipeline::default(),
            clip:       Pipeline::default(),
        }
    }

    fn all_mut(&mut self) -> [&mut Pipeline; 6] {
        [
            &mut self.samples,
            &mut self.bases,
            &mut self.positions,
            &mut self.confidence,
            &mut self.text,
            &mut self.clip,
        ]
    }

    fn all(&self) -> [&Pipeline; 6] {
        [&self.samples, &self.bases, &self.positions, &self.confidence, &self.text, &self.clip]
    }
}

// ── EncodeOptions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// SCF layout version, 2 or 3.
    pub scf_version:     u8,
    /// Bytes per SCF sample; `None` picks the narrowest that fits.
    pub scf_sample_size: Option<u8>,
    pub ztr:             ZtrPipelines,
    /// When set, overrides the level of every deflate stage in `ztr`.
    pub deflate_level:   Option<u32>,
    /// Version number written to the ABIF header.
    pub ab1_version:     u16,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            scf_version:     DEFAULT_SCF_VERSION,
            scf_sample_size: None,
            ztr:             ZtrPipelines::default(),
            deflate_level:   None,
            ab1_version:     DEFAULT_AB1_VERSION,
        }
    }
}

impl EncodeOptions {
    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(json)?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.scf_version, 2 | 3) {
            return Err(TraceError::unsupported("SCF version", self.scf_version.to_string()));
        }
        if let Some(size) = self.scf_sample_size {
            if !matches!(size, 1 | 2) {
                return Err(TraceError::unsupported("SCF sample size", size.to_string()));
            }
        }
        if let Some(level) = self.deflate_level {
            if level > 9 {
                return Err(TraceError::unsupported("deflate level", level.to_string()));
            }
        }
        for pipeline in self.ztr.all() {
            for stage in &pipeline.stages {
                if let TransformStage::BitPack { source, target } = stage {
                    if *target != ElementWidth::Bits8 || *source == ElementWidth::Bits8 {
                        return Err(TraceError::unsupported("ZTR stage", format!("{stage:?}")));
                    }
                }
            }
        }
        Ok(())
    }

    /// ZTR pipelines with the deflate level override applied.
    pub fn ztr_pipelines(&self) -> ZtrPipelines {
        let mut pipelines = self.ztr.clone();
        if let Some(level) = self.deflate_level {
            for pipeline in pipelines.all_mut() {
                for stage in pipeline.stages.iter_mut() {
                    if let TransformStage::Deflate { level: l } = stage {
                        *l = level;
                    }
                }
            }
        }
        pipelines
    }
}
