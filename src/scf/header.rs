//! The fixed 128-byte SCF header.
//!
//! # Layout (big-endian)
//! ```text
//! magic[4] ".scf"   samples        samples_offset   bases
//! bases_left_clip   bases_right_clip bases_offset   comments_size
//! comments_offset   version[4]     sample_size      code_set
//! private_size      private_offset spare[18]
//! ```
//! Every field except `magic` and `version` is a `u32`.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TraceError};
use super::section::SectionKind;

pub const MAGIC: &[u8; 4] = b".scf";
pub const HEADER_SIZE: u64 = 128;

const SPARE_WORDS: usize = 18;

/// Bytes per base record in both base layouts.
pub const BASE_RECORD_SIZE: u64 = 12;

/// Layout family selected by the header's version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScfVersion {
    /// Versions 1.x and 2.x: interleaved samples, row-wise base records.
    V2,
    /// Version 3.x: per-channel delta-coded samples, column-wise base records.
    V3,
}

impl ScfVersion {
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            2 => Some(ScfVersion::V2),
            3 => Some(ScfVersion::V3),
            _ => None,
        }
    }

    pub fn label(self) -> &'static [u8; 4] {
        match self {
            ScfVersion::V2 => b"2.00",
            ScfVersion::V3 => b"3.00",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScfHeader {
    pub samples:          u32,
    pub samples_offset:   u32,
    pub bases:            u32,
    pub bases_left_clip:  u32,
    pub bases_right_clip: u32,
    pub bases_offset:     u32,
    pub comments_size:    u32,
    pub comments_offset:  u32,
    pub version:          [u8; 4],
    pub sample_size:      u32,
    pub code_set:         u32,
    pub private_size:     u32,
    pub private_offset:   u32,
    pub spare:            [u32; SPARE_WORDS],
}

impl ScfHeader {
    pub fn new(version: ScfVersion) -> Self {
        Self {
            samples:          0,
            samples_offset:   HEADER_SIZE as u32,
            bases:            0,
            bases_left_clip:  0,
            bases_right_clip: 0,
            bases_offset:     HEADER_SIZE as u32,
            comments_size:    0,
            comments_offset:  HEADER_SIZE as u32,
            version:          *version.label(),
            sample_size:      2,
            code_set:         0,
            private_size:     0,
            private_offset:   HEADER_SIZE as u32,
            spare:            [0; SPARE_WORDS],
        }
    }

    /// Resolve the version string to a layout family.
    pub fn format_version(&self) -> Result<ScfVersion> {
        match self.version[0] {
            b'1' | b'2' => Ok(ScfVersion::V2),
            b'3'        => Ok(ScfVersion::V3),
            _ => Err(TraceError::unsupported(
                "SCF version",
                String::from_utf8_lossy(&self.version).into_owned(),
            )),
        }
    }

    /// `(offset, declared length)` of a section.
    pub fn section(&self, kind: SectionKind) -> (u64, u64) {
        match kind {
            SectionKind::Samples => (
                self.samples_offset as u64,
                self.samples as u64 * self.sample_size as u64 * 4,
            ),
            SectionKind::Bases => (
                self.bases_offset as u64,
                self.bases as u64 * BASE_RECORD_SIZE,
            ),
            SectionKind::Comments    => (self.comments_offset as u64, self.comments_size as u64),
            SectionKind::PrivateData => (self.private_offset as u64, self.private_size as u64),
        }
    }

    pub fn set_offset(&mut self, kind: SectionKind, offset: u32) {
        match kind {
            SectionKind::Samples     => self.samples_offset  = offset,
            SectionKind::Bases       => self.bases_offset    = offset,
            SectionKind::Comments    => self.comments_offset = offset,
            SectionKind::PrivateData => self.private_offset  = offset,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<BigEndian>(self.samples)?;
        writer.write_u32::<BigEndian>(self.samples_offset)?;
        writer.write_u32::<BigEndian>(self.bases)?;
        writer.write_u32::<BigEndian>(self.bases_left_clip)?;
        writer.write_u32::<BigEndian>(self.bases_right_clip)?;
        writer.write_u32::<BigEndian>(self.bases_offset)?;
        writer.write_u32::<BigEndian>(self.comments_size)?;
        writer.write_u32::<BigEndian>(self.comments_offset)?;
        writer.write_all(&self.version)?;
        writer.write_u32::<BigEndian>(self.sample_size)?;
        writer.write_u32::<BigEndian>(self.code_set)?;
        writer.write_u32::<BigEndian>(self.private_size)?;
        writer.write_u32::<BigEndian>(self.private_offset)?;
        for word in self.spare {
            writer.write_u32::<BigEndian>(word)?;
        }
        Ok(())
    }

    /// Parse a header from exactly [`HEADER_SIZE`] bytes.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(TraceError::unsupported("SCF magic", hex::encode(magic)));
        }
        let samples          = reader.read_u32::<BigEndian>()?;
        let samples_offset   = reader.read_u32::<BigEndian>()?;
        let bases            = reader.read_u32::<BigEndian>()?;
        let bases_left_clip  = reader.read_u32::<BigEndian>()?;
        let bases_right_clip = reader.read_u32::<BigEndian>()?;
        let bases_offset     = reader.read_u32::<BigEndian>()?;
        let comments_size    = reader.read_u32::<BigEndian>()?;
        let comments_offset  = reader.read_u32::<BigEndian>()?;
        let mut version = [0u8; 4];
        reader.read_exact(&mut version)?;
        let sample_size      = reader.read_u32::<BigEndian>()?;
        let code_set         = reader.read_u32::<BigEndian>()?;
        let private_size     = reader.read_u32::<BigEndian>()?;
        let private_offset   = reader.read_u32::<BigEndian>()?;
        let mut spare = [0u32; SPARE_WORDS];
        reader.read_u32_into::<BigEndian>(&mut spare)?;

        let header = Self {
            samples,
            samples_offset,
            bases,
            bases_left_clip,
            bases_right_clip,
            bases_offset,
            comments_size,
            comments_offset,
            version,
            sample_size,
            code_set,
            private_size,
            private_offset,
            spare,
        };
        if header.samples > 0 && !matches!(header.sample_size, 1 | 2) {
            return Err(TraceError::unsupported("SCF sample size", header.sample_size.to_string()));
        }
        Ok(header)
    }
}
