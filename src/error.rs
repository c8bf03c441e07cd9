//! Error taxonomy shared by every container codec.
//!
//! Four failure classes are kept apart so callers can decide between skipping
//! a file and aborting a batch:
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | `Framing` | declared lengths disagree with what a codec consumed |
//! | `Unsupported` | a version, tag or data format this build does not know |
//! | `Transform` | a stage could not reconstruct its input |
//! | `Truncated` | the stream ended before a declared length was satisfied |

use std::io;
use thiserror::Error;

use crate::transform::TransformError;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Framing error in {context}: {detail}")]
    Framing { context: String, detail: String },

    #[error("Unsupported {what}: {detail}")]
    Unsupported { what: &'static str, detail: String },

    #[error("Transform stage {stage} failed in {context}")]
    Transform {
        stage:   &'static str,
        context: String,
        #[source]
        source:  TransformError,
    },

    #[error("Truncated input in {context}: needed {expected} bytes, {available} available")]
    Truncated { context: String, expected: u64, available: u64 },

    #[error("Invalid trace: {0}")]
    InvalidTrace(String),

    #[error("Invalid encode options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TraceError {
    pub(crate) fn framing(context: impl Into<String>, detail: impl Into<String>) -> Self {
        TraceError::Framing { context: context.into(), detail: detail.into() }
    }

    pub(crate) fn unsupported(what: &'static str, detail: impl Into<String>) -> Self {
        TraceError::Unsupported { what, detail: detail.into() }
    }

    pub(crate) fn truncated(context: impl Into<String>, expected: u64, available: u64) -> Self {
        TraceError::Truncated { context: context.into(), expected, available }
    }

    /// True when the file uses a feature this build cannot decode, as opposed
    /// to being corrupt.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TraceError::Unsupported { .. })
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, TraceError::Truncated { .. })
    }
}
