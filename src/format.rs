//! Format detection and the crate-level entry points.

use std::fmt;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chromatogram::Chromatogram;
use crate::error::{Result, TraceError};
use crate::options::EncodeOptions;
use crate::{abi, scf, ztr};

/// Bytes needed to recognise every supported magic, MacBinary-wrapped AB1
/// included.
const SNIFF_LEN: usize = 132;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceFormat {
    Scf,
    Ztr,
    Ab1,
}

impl TraceFormat {
    pub const ALL: [TraceFormat; 3] = [TraceFormat::Scf, TraceFormat::Ztr, TraceFormat::Ab1];

    /// Detect the container from its leading bytes.
    pub fn sniff(prefix: &[u8]) -> Option<Self> {
        if prefix.starts_with(scf::MAGIC) {
            Some(TraceFormat::Scf)
        } else if prefix.starts_with(ztr::MAGIC) {
            Some(TraceFormat::Ztr)
        } else if prefix.starts_with(abi::MAGIC)
            || prefix.get(128..132) == Some(&abi::MAGIC[..])
        {
            Some(TraceFormat::Ab1)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TraceFormat::Scf => "scf",
            TraceFormat::Ztr => "ztr",
            TraceFormat::Ab1 => "ab1",
        }
    }

    /// Parse a format name or file extension, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "scf"         => Some(TraceFormat::Scf),
            "ztr"         => Some(TraceFormat::Ztr),
            "ab1" | "abi" => Some(TraceFormat::Ab1),
            _             => None,
        }
    }
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Decode a trace of any supported format.
pub fn decode(data: &[u8]) -> Result<Chromatogram> {
    let format = TraceFormat::sniff(data)
        .ok_or_else(|| TraceError::unsupported("trace format", hex::encode(&data[..data.len().min(8)])))?;
    decode_as(data, format)
}

pub fn decode_as(data: &[u8], format: TraceFormat) -> Result<Chromatogram> {
    debug!(format = format.name(), len = data.len(), "decoding trace");
    match format {
        TraceFormat::Scf => scf::decode(data),
        TraceFormat::Ztr => ztr::decode(data),
        TraceFormat::Ab1 => abi::decode(data),
    }
}

/// Decode from a stream, sniffing the format from its first bytes.
pub fn decode_from<R: Read>(mut reader: R) -> Result<Chromatogram> {
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    (&mut reader).take(SNIFF_LEN as u64).read_to_end(&mut prefix)?;
    let format = TraceFormat::sniff(&prefix)
        .ok_or_else(|| TraceError::unsupported("trace format", hex::encode(&prefix[..prefix.len().min(8)])))?;
    let stream = prefix.as_slice().chain(reader);
    match format {
        TraceFormat::Scf => scf::decode_from(stream),
        TraceFormat::Ztr => ztr::decode_from(stream),
        TraceFormat::Ab1 => abi::decode_from(stream),
    }
}

// ── Encode ───────────────────────────────────────────────────────────────────

pub fn encode(trace: &Chromatogram, format: TraceFormat, opts: &EncodeOptions) -> Result<Vec<u8>> {
    match format {
        TraceFormat::Scf => scf::encode(trace, opts),
        TraceFormat::Ztr => ztr::encode(trace, opts),
        TraceFormat::Ab1 => abi::encode(trace, opts),
    }
}

pub fn encode_to<W: Write>(trace: &Chromatogram, format: TraceFormat, opts: &EncodeOptions, writer: W) -> Result<()> {
    match format {
        TraceFormat::Scf => scf::encode_to(trace, opts, writer),
        TraceFormat::Ztr => ztr::encode_to(trace, opts, writer),
        TraceFormat::Ab1 => abi::encode_to(trace, opts, writer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromatogram::ChannelId;

    fn trace() -> Chromatogram {
        Chromatogram::builder()
            .basecalls("ACG")
            .peaks(vec![1, 4, 7])
            .qualities(vec![9, 19, 29])
            .samples(ChannelId::A, vec![1; 9])
            .samples(ChannelId::C, vec![2; 9])
            .samples(ChannelId::G, vec![3; 9])
            .samples(ChannelId::T, vec![4; 9])
            .build()
            .unwrap()
    }

    #[test]
    fn every_format_sniffs_its_own_output() {
        for format in TraceFormat::ALL {
            let bytes = encode(&trace(), format, &EncodeOptions::default()).unwrap();
            assert_eq!(TraceFormat::sniff(&bytes), Some(format));
            assert_eq!(decode(&bytes).unwrap(), trace());
            assert_eq!(decode_from(&bytes[..]).unwrap(), trace());
        }
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(TraceFormat::from_name(".AB1"), Some(TraceFormat::Ab1));
        assert_eq!(TraceFormat::from_name("abi"), Some(TraceFormat::Ab1));
        assert_eq!(TraceFormat::from_name("ztr"), Some(TraceFormat::Ztr));
        assert_eq!(TraceFormat::from_name("fasta"), None);
        assert_eq!(TraceFormat::Scf.to_string(), "scf");
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        assert!(decode(b"\x00\x01garbage").unwrap_err().is_unsupported());
        assert!(decode_from(&b""[..]).unwrap_err().is_unsupported());
    }
}
