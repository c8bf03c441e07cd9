//! Tagged data records.
//!
//! # Directory entry (28 bytes, big-endian)
//! ```text
//! name[4]  number: i32  data_type: i16  element_size: i16  element_count: i32
//! total_length: i32  data_offset: i32  cryptic_value: i32
//! ```
//! When `total_length <= 4` the payload is stored left-aligned inside the
//! `data_offset` field instead of at that offset.

use std::fmt;
use std::io::{self, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::error::{Result, TraceError};

pub const ENTRY_SIZE: usize = 28;

// ── Data types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    Byte,
    Char,
    Word,
    Short,
    Long,
    Float,
    Double,
    Date,
    Time,
    Thumb,
    Bool,
    PString,
    CString,
    Directory,
    /// Instrument-specific structures, codes 1024 and up.
    UserDefined(i16),
    /// A reserved code this build does not interpret.
    Unsupported(i16),
}

impl DataType {
    pub fn from_code(code: i16) -> Self {
        match code {
            1    => DataType::Byte,
            2    => DataType::Char,
            3    => DataType::Word,
            4    => DataType::Short,
            5    => DataType::Long,
            7    => DataType::Float,
            8    => DataType::Double,
            10   => DataType::Date,
            11   => DataType::Time,
            12   => DataType::Thumb,
            13   => DataType::Bool,
            18   => DataType::PString,
            19   => DataType::CString,
            1023 => DataType::Directory,
            c if c >= 1024 => DataType::UserDefined(c),
            c    => DataType::Unsupported(c),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            DataType::Byte      => 1,
            DataType::Char      => 2,
            DataType::Word      => 3,
            DataType::Short     => 4,
            DataType::Long      => 5,
            DataType::Float     => 7,
            DataType::Double    => 8,
            DataType::Date      => 10,
            DataType::Time      => 11,
            DataType::Thumb     => 12,
            DataType::Bool      => 13,
            DataType::PString   => 18,
            DataType::CString   => 19,
            DataType::Directory => 1023,
            DataType::UserDefined(c) | DataType::Unsupported(c) => c,
        }
    }

    /// Bytes per element, where the type fixes it.
    pub fn element_size(self) -> Option<usize> {
        match self {
            DataType::Byte | DataType::Char | DataType::Bool
                | DataType::PString | DataType::CString => Some(1),
            DataType::Word | DataType::Short           => Some(2),
            DataType::Long | DataType::Float
                | DataType::Date | DataType::Time      => Some(4),
            DataType::Double                           => Some(8),
            DataType::Thumb                            => Some(10),
            DataType::Directory                        => Some(ENTRY_SIZE),
            DataType::UserDefined(_) | DataType::Unsupported(_) => None,
        }
    }
}

// ── Payload values ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AbiDate {
    pub year:  i16,
    pub month: u8,
    pub day:   u8,
}

impl AbiDate {
    pub fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
    }
}

impl fmt::Display for AbiDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            None       => write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AbiTime {
    pub hour:       u8,
    pub minute:     u8,
    pub second:     u8,
    pub hundredths: u8,
}

impl AbiTime {
    pub fn to_naive(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_milli_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
            self.hundredths as u32 * 10,
        )
    }
}

impl fmt::Display for AbiTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}.{:02}", self.hour, self.minute, self.second, self.hundredths)
    }
}

/// A record's payload, parsed according to its data type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TaggedPayload {
    Bytes(Vec<u8>),
    Chars(Vec<u8>),
    Words(Vec<u16>),
    Shorts(Vec<i16>),
    Longs(Vec<i32>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
    Dates(Vec<AbiDate>),
    Times(Vec<AbiTime>),
    Bools(Vec<bool>),
    /// pString or cString contents without the length byte or terminator.
    Text(String),
    /// Raw entries of a directory record.
    Directory(Vec<u8>),
    UserDefined { code: i16, bytes: Vec<u8> },
}

impl TaggedPayload {
    pub fn as_text(&self) -> Option<String> {
        match self {
            TaggedPayload::Text(s)   => Some(s.clone()),
            TaggedPayload::Dates(d)  => Some(d.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")),
            TaggedPayload::Times(t)  => Some(t.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")),
            _ => None,
        }
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedDataRecord {
    pub name:          [u8; 4],
    pub number:        i32,
    pub data_type:     DataType,
    pub element_size:  i16,
    pub element_count: i32,
    pub total_length:  i32,
    pub data_offset:   i32,
    pub cryptic_value: i32,
}

impl TaggedDataRecord {
    pub fn label(&self) -> String {
        format!("{}{}", String::from_utf8_lossy(&self.name), self.number)
    }

    /// Parse one directory entry.
    pub fn from_entry(entry: &[u8; ENTRY_SIZE]) -> Self {
        let mut name = [0u8; 4];
        name.copy_from_slice(&entry[..4]);
        Self {
            name,
            number:        BigEndian::read_i32(&entry[4..8]),
            data_type:     DataType::from_code(BigEndian::read_i16(&entry[8..10])),
            element_size:  BigEndian::read_i16(&entry[10..12]),
            element_count: BigEndian::read_i32(&entry[12..16]),
            total_length:  BigEndian::read_i32(&entry[16..20]),
            data_offset:   BigEndian::read_i32(&entry[20..24]),
            cryptic_value: BigEndian::read_i32(&entry[24..28]),
        }
    }

    pub fn write_entry<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.name)?;
        writer.write_i32::<BigEndian>(self.number)?;
        writer.write_i16::<BigEndian>(self.data_type.code())?;
        writer.write_i16::<BigEndian>(self.element_size)?;
        writer.write_i32::<BigEndian>(self.element_count)?;
        writer.write_i32::<BigEndian>(self.total_length)?;
        writer.write_i32::<BigEndian>(self.data_offset)?;
        writer.write_i32::<BigEndian>(self.cryptic_value)?;
        Ok(())
    }

    pub fn is_inline(&self) -> bool {
        self.total_length <= 4
    }

    /// Check the record's own length arithmetic.
    fn check_lengths(&self) -> Result<usize> {
        let declared = self.element_size as i64 * self.element_count as i64;
        if self.element_size < 0 || self.element_count < 0 || declared != self.total_length as i64 {
            return Err(TraceError::framing(
                format!("AB1 record {}", self.label()),
                format!(
                    "total length {} is not element size {} x count {}",
                    self.total_length, self.element_size, self.element_count
                ),
            ));
        }
        if let Some(size) = self.data_type.element_size() {
            if self.element_size as usize != size {
                return Err(TraceError::framing(
                    format!("AB1 record {}", self.label()),
                    format!("element size {} does not match {:?}", self.element_size, self.data_type),
                ));
            }
        }
        Ok(self.total_length as usize)
    }

    /// Payload bytes located in `file` (offsets relative to the `ABIF` magic).
    pub fn locate<'a>(&self, file: &'a [u8], inline: &'a [u8; 4]) -> Result<&'a [u8]> {
        let len = self.check_lengths()?;
        if self.is_inline() {
            return Ok(&inline[..len]);
        }
        let context = format!("AB1 record {} at offset {}", self.label(), self.data_offset);
        let start = usize::try_from(self.data_offset)
            .map_err(|_| TraceError::framing(&context, "negative data offset"))?;
        let available = file.len().saturating_sub(start);
        if available < len {
            return Err(TraceError::truncated(context, len as u64, available as u64));
        }
        Ok(&file[start..start + len])
    }

    /// Locate and parse this record's payload.
    pub fn read_payload(&self, file: &[u8]) -> Result<TaggedPayload> {
        let inline = self.data_offset.to_be_bytes();
        let raw = self.locate(file, &inline)?;
        self.parse_payload(raw)
    }

    /// Parse `raw`, which must hold exactly `total_length` bytes.
    pub fn parse_payload(&self, raw: &[u8]) -> Result<TaggedPayload> {
        let len = self.check_lengths()?;
        let context = format!("AB1 record {}", self.label());
        if raw.len() < len {
            return Err(TraceError::truncated(context, len as u64, raw.len() as u64));
        }
        if raw.len() > len {
            return Err(TraceError::framing(context, format!("{} bytes supplied for a {len}-byte payload", raw.len())));
        }

        let payload = match self.data_type {
            DataType::Byte  | DataType::Thumb => TaggedPayload::Bytes(raw.to_vec()),
            DataType::Char  => TaggedPayload::Chars(raw.to_vec()),
            DataType::Word  => TaggedPayload::Words(raw.chunks_exact(2).map(BigEndian::read_u16).collect()),
            DataType::Short => TaggedPayload::Shorts(raw.chunks_exact(2).map(BigEndian::read_i16).collect()),
            DataType::Long  => TaggedPayload::Longs(raw.chunks_exact(4).map(BigEndian::read_i32).collect()),
            DataType::Float => TaggedPayload::Floats(raw.chunks_exact(4).map(BigEndian::read_f32).collect()),
            DataType::Double => TaggedPayload::Doubles(raw.chunks_exact(8).map(BigEndian::read_f64).collect()),
            DataType::Date  => TaggedPayload::Dates(
                raw.chunks_exact(4)
                    .map(|b| AbiDate { year: BigEndian::read_i16(&b[..2]), month: b[2], day: b[3] })
                    .collect(),
            ),
            DataType::Time  => TaggedPayload::Times(
                raw.chunks_exact(4)
                    .map(|b| AbiTime { hour: b[0], minute: b[1], second: b[2], hundredths: b[3] })
                    .collect(),
            ),
            DataType::Bool  => TaggedPayload::Bools(raw.iter().map(|&b| b != 0).collect()),
            DataType::PString => {
                let body = match raw.split_first() {
                    Some((&n, rest)) => &rest[..(n as usize).min(rest.len())],
                    None => &[][..],
                };
                TaggedPayload::Text(String::from_utf8_lossy(body).into_owned())
            }
            DataType::CString => {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                TaggedPayload::Text(String::from_utf8_lossy(&raw[..end]).into_owned())
            }
            DataType::Directory => TaggedPayload::Directory(raw.to_vec()),
            DataType::UserDefined(code) => TaggedPayload::UserDefined { code, bytes: raw.to_vec() },
            DataType::Unsupported(code) => {
                return Err(TraceError::unsupported("AB1 data type", format!("{code} in record {}", self.label())));
            }
        };
        Ok(payload)
    }
}

// ── Building records for write ───────────────────────────────────────────────

/// A record and its encoded payload, before the writer assigns an offset.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub record: TaggedDataRecord,
    pub bytes:  Vec<u8>,
}

impl PendingRecord {
    pub fn new(name: [u8; 4], number: i32, payload: &TaggedPayload) -> Result<Self> {
        let (data_type, bytes) = encode_payload(payload)?;
        let element_size = data_type.element_size().unwrap_or(1);
        let total_length = i32::try_from(bytes.len())
            .map_err(|_| TraceError::InvalidTrace("AB1 record exceeds 2 GiB".into()))?;
        let record = TaggedDataRecord {
            name,
            number,
            data_type,
            element_size:  element_size as i16,
            element_count: total_length / element_size as i32,
            total_length,
            data_offset:   0,
            cryptic_value: 0,
        };
        Ok(Self { record, bytes })
    }

    /// Inline payloads packed into the offset field.
    pub fn inline_offset(&self) -> i32 {
        let mut field = [0u8; 4];
        field[..self.bytes.len()].copy_from_slice(&self.bytes);
        i32::from_be_bytes(field)
    }
}

fn encode_payload(payload: &TaggedPayload) -> Result<(DataType, Vec<u8>)> {
    let mut out = Vec::new();
    let data_type = match payload {
        TaggedPayload::Bytes(v) => { out.extend_from_slice(v); DataType::Byte }
        TaggedPayload::Chars(v) => { out.extend_from_slice(v); DataType::Char }
        TaggedPayload::Words(v) => {
            v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes()));
            DataType::Word
        }
        TaggedPayload::Shorts(v) => {
            v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes()));
            DataType::Short
        }
        TaggedPayload::Longs(v) => {
            v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes()));
            DataType::Long
        }
        TaggedPayload::Floats(v) => {
            v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes()));
            DataType::Float
        }
        TaggedPayload::Doubles(v) => {
            v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes()));
            DataType::Double
        }
        TaggedPayload::Dates(v) => {
            for d in v {
                out.extend_from_slice(&d.year.to_be_bytes());
                out.extend_from_slice(&[d.month, d.day]);
            }
            DataType::Date
        }
        TaggedPayload::Times(v) => {
            v.iter().for_each(|t| out.extend_from_slice(&[t.hour, t.minute, t.second, t.hundredths]));
            DataType::Time
        }
        TaggedPayload::Bools(v) => { out.extend(v.iter().map(|&b| b as u8)); DataType::Bool }
        TaggedPayload::Text(s) => {
            if let Ok(n) = u8::try_from(s.len()) {
                out.push(n);
                out.extend_from_slice(s.as_bytes());
                DataType::PString
            } else {
                if s.contains('\0') {
                    return Err(TraceError::InvalidTrace("AB1 string contains NUL".into()));
                }
                out.extend_from_slice(s.as_bytes());
                out.push(0);
                DataType::CString
            }
        }
        TaggedPayload::Directory(v) => { out.extend_from_slice(v); DataType::Directory }
        TaggedPayload::UserDefined { code, bytes } => { out.extend_from_slice(bytes); DataType::UserDefined(*code) }
    };
    Ok((data_type, out))
}
