//! AB1 (ABIF) container reader and writer.
//!
//! # Header (128 bytes, big-endian)
//! ```text
//! "ABIF"  version: u16  root entry[28]  reserved: 47 × u16
//! ```
//! The root entry is a `tdir` directory record whose payload is the list of
//! 28-byte entries.  All offsets count from the `ABIF` magic; files carrying
//! a 128-byte MacBinary prefix are accepted by locating the magic there.
//!
//! # Chromatogram mapping
//! | Record | Field |
//! |--------|-------|
//! | `FWO_1` | dye order of the analysed channels |
//! | `DATA9`–`DATA12` | analysed samples, in `FWO_` order |
//! | `PBAS2` (else `PBAS1`) | basecalls |
//! | `PLOC2` (else `PLOC1`) | peak positions |
//! | `PCON2` (else `PCON1`) | called-base qualities |
//! | strings, dates, times | comments keyed `NAME` (number 1) or `NAMEn` |
//! | `CMNTn` holding `key=value` | comments whose keys are not record labels |

pub mod record;

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use tracing::{debug, warn};

use crate::chromatogram::{Chromatogram, ChromatogramBuilder, ChannelId};
use crate::error::{Result, TraceError};
use crate::options::EncodeOptions;

pub use record::{
    AbiDate, AbiTime, DataType, PendingRecord, TaggedDataRecord, TaggedPayload, ENTRY_SIZE,
};

pub const MAGIC: &[u8; 4] = b"ABIF";
pub const HEADER_SIZE: usize = 128;
/// Length of the MacBinary wrapper some older files still carry.
const MACBINARY_PREFIX: usize = 128;
const DEFAULT_BASE_ORDER: &[u8; 4] = b"GATC";
/// `DATA` numbers of the analysed channels.
const ANALYSED_DATA: [i32; 4] = [9, 10, 11, 12];
/// Records the writer derives from trace fields; never taken from comments.
const RESERVED: [&[u8; 4]; 7] = [b"FWO_", b"DATA", b"PBAS", b"PLOC", b"PCON", b"CMNT", b"tdir"];

// ── Comment keys ─────────────────────────────────────────────────────────────

/// Split a comment key into a record name and number when it has the shape
/// this module produces on read: four label characters, then nothing
/// (number 1) or a decimal number other than 1.
fn tag_key(key: &str) -> Option<([u8; 4], i32)> {
    let bytes = key.as_bytes();
    if bytes.len() < 4 || !key.is_char_boundary(4) {
        return None;
    }
    let (name, digits) = bytes.split_at(4);
    if !name.iter().all(|&b| b.is_ascii_alphanumeric() || b == b'_') {
        return None;
    }
    let mut label = [0u8; 4];
    label.copy_from_slice(name);
    if RESERVED.iter().any(|r| **r == label) {
        return None;
    }
    if digits.is_empty() {
        return Some((label, 1));
    }
    if digits[0] == b'0' || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let number: i32 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    (number != 1).then_some((label, number))
}

fn comment_key(record: &TaggedDataRecord) -> String {
    let name = String::from_utf8_lossy(&record.name);
    if record.number == 1 {
        name.into_owned()
    } else {
        format!("{name}{}", record.number)
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub fn decode_from<R: Read>(mut reader: R) -> Result<Chromatogram> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    decode(&data)
}

pub fn decode(data: &[u8]) -> Result<Chromatogram> {
    let file = locate_magic(data)?;
    if file.len() < HEADER_SIZE {
        return Err(TraceError::truncated("AB1 header", HEADER_SIZE as u64, file.len() as u64));
    }
    let version = BigEndian::read_u16(&file[4..6]);
    if version / 100 != 1 {
        return Err(TraceError::unsupported("AB1 version", version.to_string()));
    }

    let mut root_entry = [0u8; ENTRY_SIZE];
    root_entry.copy_from_slice(&file[6..6 + ENTRY_SIZE]);
    let root = TaggedDataRecord::from_entry(&root_entry);
    if root.data_type != DataType::Directory {
        return Err(TraceError::framing("AB1 header", format!("root entry has type {:?}", root.data_type)));
    }
    let entries = match root.read_payload(file)? {
        TaggedPayload::Directory(bytes) => bytes,
        _ => return Err(TraceError::framing("AB1 header", "root entry is not a directory")),
    };
    debug!(version, records = root.element_count, offset = root.data_offset, "parsed AB1 header");

    let mut records: HashMap<([u8; 4], i32), TaggedDataRecord> = HashMap::new();
    let mut order = Vec::with_capacity(entries.len() / ENTRY_SIZE);
    for chunk in entries.chunks_exact(ENTRY_SIZE) {
        let mut entry = [0u8; ENTRY_SIZE];
        entry.copy_from_slice(chunk);
        let record = TaggedDataRecord::from_entry(&entry);
        let key = (record.name, record.number);
        if records.contains_key(&key) {
            warn!(record = %record.label(), "duplicate AB1 record; keeping the first");
            continue;
        }
        order.push(key);
        records.insert(key, record);
    }

    let mapped = RecordMap { file, records: &records };
    let mut builder = ChromatogramBuilder::new();

    let base_order = match mapped.first(b"FWO_", &[1])? {
        Some(TaggedPayload::Chars(order)) | Some(TaggedPayload::Bytes(order)) if order.len() == 4 => order,
        Some(other) => {
            return Err(TraceError::framing("AB1 record FWO_1", format!("unexpected payload {other:?}")));
        }
        None => DEFAULT_BASE_ORDER.to_vec(),
    };
    for (&number, &letter) in ANALYSED_DATA.iter().zip(&base_order) {
        let Some(id) = ChannelId::from_base(letter) else {
            return Err(TraceError::framing("AB1 record FWO_1", format!("unknown dye letter {:?}", letter as char)));
        };
        if let Some(payload) = mapped.first(b"DATA", &[number])? {
            builder = builder.samples(id, expect_shorts(payload, "DATA")?);
        }
    }

    if let Some(payload) = mapped.first(b"PBAS", &[2, 1])? {
        let calls = expect_chars(payload, "PBAS")?;
        builder = builder.basecalls(calls.iter().map(|&b| b as char).collect::<String>());
    }
    if let Some(payload) = mapped.first(b"PLOC", &[2, 1])? {
        let peaks = expect_shorts(payload, "PLOC")?;
        builder = builder.peaks(peaks.into_iter().map(u32::from).collect());
    }
    if let Some(payload) = mapped.first(b"PCON", &[2, 1])? {
        builder = builder.qualities(expect_chars(payload, "PCON")?);
    }

    for key in &order {
        let record = &records[key];
        if !matches!(record.data_type, DataType::PString | DataType::CString | DataType::Date | DataType::Time) {
            if matches!(record.data_type, DataType::Unsupported(_)) {
                warn!(record = %record.label(), code = record.data_type.code(), "ignoring AB1 record of unknown type");
            }
            continue;
        }
        let Some(text) = record.read_payload(file)?.as_text() else { continue };
        if &record.name == b"CMNT" {
            if let Some((k, v)) = text.split_once('=') {
                if !k.is_empty() && tag_key(k).is_none() {
                    builder = builder.comment(k, v);
                    continue;
                }
            }
        }
        builder = builder.comment(comment_key(record), text);
    }

    builder.build()
}

fn locate_magic(data: &[u8]) -> Result<&[u8]> {
    if data.starts_with(MAGIC) {
        return Ok(data);
    }
    if data.len() >= MACBINARY_PREFIX + MAGIC.len() && &data[MACBINARY_PREFIX..MACBINARY_PREFIX + 4] == MAGIC {
        debug!("skipping MacBinary prefix");
        return Ok(&data[MACBINARY_PREFIX..]);
    }
    let head = &data[..data.len().min(4)];
    Err(TraceError::unsupported("AB1 magic", hex::encode(head)))
}

/// Lookup of records by name and number, parsing payloads on demand.
struct RecordMap<'a> {
    file:    &'a [u8],
    records: &'a HashMap<([u8; 4], i32), TaggedDataRecord>,
}

impl RecordMap<'_> {
    /// Payload of the first of `numbers` present under `name`.
    fn first(&self, name: &[u8; 4], numbers: &[i32]) -> Result<Option<TaggedPayload>> {
        for &number in numbers {
            if let Some(record) = self.records.get(&(*name, number)) {
                return record.read_payload(self.file).map(Some);
            }
        }
        Ok(None)
    }
}

fn expect_shorts(payload: TaggedPayload, name: &str) -> Result<Vec<u16>> {
    match payload {
        TaggedPayload::Shorts(v) => Ok(v.into_iter().map(|s| s as u16).collect()),
        TaggedPayload::Words(v)  => Ok(v),
        other => Err(TraceError::framing(format!("AB1 record {name}"), format!("expected shorts, found {other:?}"))),
    }
}

fn expect_chars(payload: TaggedPayload, name: &str) -> Result<Vec<u8>> {
    match payload {
        TaggedPayload::Chars(v) | TaggedPayload::Bytes(v) => Ok(v),
        other => Err(TraceError::framing(format!("AB1 record {name}"), format!("expected characters, found {other:?}"))),
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub fn encode(trace: &Chromatogram, opts: &EncodeOptions) -> Result<Vec<u8>> {
    opts.validate()?;
    let mut pending = trace_records(trace)?;
    pending.sort_by(|a, b| (a.record.name, a.record.number).cmp(&(b.record.name, b.record.number)));

    // Payloads first, directory last.
    let mut body = Vec::new();
    let mut offset = HEADER_SIZE;
    for p in pending.iter_mut() {
        if p.record.is_inline() {
            p.record.data_offset = p.inline_offset();
        } else {
            p.record.data_offset = i32::try_from(offset)
                .map_err(|_| TraceError::InvalidTrace("trace too large for AB1 offsets".into()))?;
            body.extend_from_slice(&p.bytes);
            offset += p.bytes.len();
        }
    }
    let directory_offset = i32::try_from(offset)
        .map_err(|_| TraceError::InvalidTrace("trace too large for AB1 offsets".into()))?;
    for p in &pending {
        p.record.write_entry(&mut body)?;
    }

    let count = pending.len() as i32;
    let root = TaggedDataRecord {
        name:          *b"tdir",
        number:        1,
        data_type:     DataType::Directory,
        element_size:  ENTRY_SIZE as i16,
        element_count: count,
        total_length:  count * ENTRY_SIZE as i32,
        data_offset:   directory_offset,
        cryptic_value: 0,
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(MAGIC);
    out.write_u16::<BigEndian>(opts.ab1_version)?;
    root.write_entry(&mut out)?;
    out.resize(HEADER_SIZE, 0);
    out.extend_from_slice(&body);
    debug!(records = count, bytes = out.len(), "writing AB1");
    Ok(out)
}

pub fn encode_to<W: Write>(trace: &Chromatogram, opts: &EncodeOptions, mut writer: W) -> Result<()> {
    writer.write_all(&encode(trace, opts)?)?;
    Ok(())
}

fn trace_records(trace: &Chromatogram) -> Result<Vec<PendingRecord>> {
    if trace.private_data().is_some() {
        warn!("AB1 has no private data record; dropping private data");
    }
    if trace.clip().is_some() {
        warn!("AB1 clip points are not written; dropping clip range");
    }

    let mut out = Vec::new();
    if trace.sample_count() > 0 {
        out.push(PendingRecord::new(*b"FWO_", 1, &TaggedPayload::Chars(DEFAULT_BASE_ORDER.to_vec()))?);
        for (&number, &letter) in ANALYSED_DATA.iter().zip(DEFAULT_BASE_ORDER) {
            let id = ChannelId::from_base(letter).unwrap_or(ChannelId::A);
            let shorts = trace.channels().get(id).samples.iter().map(|&s| s as i16).collect();
            out.push(PendingRecord::new(*b"DATA", number, &TaggedPayload::Shorts(shorts))?);
        }
    }
    if trace.base_count() > 0 {
        let calls = TaggedPayload::Chars(trace.basecalls().as_bytes().to_vec());
        out.push(PendingRecord::new(*b"PBAS", 1, &calls)?);
        out.push(PendingRecord::new(*b"PBAS", 2, &calls)?);
    }
    if !trace.peaks().is_empty() {
        let shorts = trace
            .peaks()
            .iter()
            .map(|&p| {
                u16::try_from(p)
                    .map(|v| v as i16)
                    .map_err(|_| TraceError::InvalidTrace(format!("peak position {p} exceeds the AB1 16-bit range")))
            })
            .collect::<Result<Vec<i16>>>()?;
        let peaks = TaggedPayload::Shorts(shorts);
        out.push(PendingRecord::new(*b"PLOC", 1, &peaks)?);
        out.push(PendingRecord::new(*b"PLOC", 2, &peaks)?);
    }
    if !trace.qualities().is_empty() {
        let quals = TaggedPayload::Chars(trace.qualities().to_vec());
        out.push(PendingRecord::new(*b"PCON", 1, &quals)?);
        out.push(PendingRecord::new(*b"PCON", 2, &quals)?);
    }

    out.extend(comment_records(trace.comments())?);
    Ok(out)
}

fn comment_records(comments: &BTreeMap<String, String>) -> Result<Vec<PendingRecord>> {
    let mut out = Vec::new();
    let mut cmnt = 0;
    for (key, value) in comments {
        let payload = match tag_key(key) {
            Some((name, number)) => {
                out.push(PendingRecord::new(name, number, &TaggedPayload::Text(value.clone()))?);
                continue;
            }
            None => {
                if key.is_empty() || key.contains('=') {
                    warn!(key = %key, "comment key cannot be stored in AB1; skipping");
                    continue;
                }
                TaggedPayload::Text(format!("{key}={value}"))
            }
        };
        cmnt += 1;
        out.push(PendingRecord::new(*b"CMNT", cmnt, &payload)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> Chromatogram {
        Chromatogram::builder()
            .basecalls("TGCA")
            .peaks(vec![3, 8, 13, 18])
            .qualities(vec![12, 24, 36, 48])
            .samples(ChannelId::A, (0..20).map(|i| i * 100).collect())
            .samples(ChannelId::C, vec![40000; 20])
            .samples(ChannelId::G, (0..20).collect())
            .samples(ChannelId::T, vec![0; 20])
            .comment("SMPL", "sample-7")
            .comment("LANE2", "x")
            .comment("run note", "first pass")
            .build()
            .unwrap()
    }

    #[test]
    fn round_trips_through_the_directory() {
        let bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(BigEndian::read_u16(&bytes[4..6]), 101);
        assert_eq!(&bytes[6..10], b"tdir");
        assert_eq!(decode(&bytes).unwrap(), trace());
    }

    #[test]
    fn macbinary_prefix_is_skipped() {
        let mut bytes = vec![0u8; MACBINARY_PREFIX];
        bytes.extend(encode(&trace(), &EncodeOptions::default()).unwrap());
        assert_eq!(decode(&bytes).unwrap(), trace());
    }

    #[test]
    fn comment_keys_map_to_record_labels() {
        assert_eq!(tag_key("SMPL"), Some((*b"SMPL", 1)));
        assert_eq!(tag_key("LANE2"), Some((*b"LANE", 2)));
        assert_eq!(tag_key("LANE1"), None);
        assert_eq!(tag_key("LANE02"), None);
        assert_eq!(tag_key("DATA"), None);
        assert_eq!(tag_key("run note"), None);
    }

    #[test]
    fn channels_follow_the_dye_order() {
        let bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.channels().c().samples, vec![40000; 20]);
        assert_eq!(decoded.channels().g().samples, (0..20).collect::<Vec<u16>>());
    }

    #[test]
    fn wide_peaks_are_rejected() {
        let wide = Chromatogram::builder().basecalls("A").peaks(vec![70000]).build().unwrap();
        assert!(matches!(encode(&wide, &EncodeOptions::default()), Err(TraceError::InvalidTrace(_))));
    }

    #[test]
    fn truncated_directory_is_reported() {
        let bytes = encode(&trace(), &EncodeOptions::default()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 10]).unwrap_err().is_truncated());
    }

    #[test]
    fn wrong_magic_is_unsupported() {
        assert!(decode(b"SCF?").unwrap_err().is_unsupported());
    }
}
