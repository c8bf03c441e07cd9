//! Codecs for DNA sequencing chromatogram files.
//!
//! Three container formats decode to and encode from one in-memory
//! [`Chromatogram`]:
//!
//! - [`scf`]: fixed header plus offset-addressed sections (versions 2 and 3);
//! - [`ztr`]: typed chunks whose data passes through [`transform`] stages;
//! - [`abi`]: the ABIF tagged-record directory used by AB1 files.
//!
//! ```rust
//! use tracecodec::{Chromatogram, ChannelId, EncodeOptions, TraceFormat};
//!
//! let trace = Chromatogram::builder()
//!     .basecalls("GAT")
//!     .qualities(vec![20, 30, 40])
//!     .samples(ChannelId::A, vec![0, 5, 0])
//!     .samples(ChannelId::C, vec![0, 0, 0])
//!     .samples(ChannelId::G, vec![9, 0, 0])
//!     .samples(ChannelId::T, vec![0, 0, 7])
//!     .build()?;
//!
//! let ztr = tracecodec::encode(&trace, TraceFormat::Ztr, &EncodeOptions::default())?;
//! assert_eq!(TraceFormat::sniff(&ztr), Some(TraceFormat::Ztr));
//! assert_eq!(tracecodec::decode(&ztr)?, trace);
//! # Ok::<(), tracecodec::TraceError>(())
//! ```

pub mod abi;
pub mod chromatogram;
pub mod error;
pub mod format;
pub mod options;
pub mod perf;
pub mod scf;
mod stream;
pub mod transform;
pub mod ztr;

pub use chromatogram::{Channel, ChannelGroup, ChannelId, Chromatogram, ChromatogramBuilder, ClipRange};
pub use error::{Result, TraceError};
pub use format::{decode, decode_as, decode_from, encode, encode_to, TraceFormat};
pub use options::{EncodeOptions, ZtrPipelines};
pub use transform::{DeltaLevel, ElementWidth, Pipeline, TransformError, TransformStage};
