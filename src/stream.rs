//! Bounded reading helpers.
//!
//! Two layers keep the error taxonomy honest:
//!
//! - [`OffsetReader`] pulls declared-length blocks off the underlying stream
//!   and tracks the absolute offset.  Running out of stream here is a
//!   *truncation*.
//! - [`SectionCursor`] walks one block that has already been read in full.
//!   Reading past its end, or leaving bytes behind, is a *framing* error: the
//!   codec and the declared length disagree.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Result, TraceError};

// ── Stream side ──────────────────────────────────────────────────────────────

pub(crate) struct OffsetReader<R: Read> {
    inner:  R,
    offset: u64,
}

impl<R: Read> OffsetReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read exactly `len` bytes.  A short stream is a truncation.
    pub fn read_block(&mut self, len: u64, context: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut self.inner).take(len).read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;
        if (buf.len() as u64) < len {
            return Err(TraceError::truncated(context, len, buf.len() as u64));
        }
        Ok(buf)
    }

    pub fn read_array<const N: usize>(&mut self, context: &str) -> Result<[u8; N]> {
        let block = self.read_block(N as u64, context)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&block);
        Ok(out)
    }

    /// Discard bytes up to the absolute offset `target`.
    pub fn skip_to(&mut self, target: u64, context: &str) -> Result<()> {
        if target < self.offset {
            return Err(TraceError::framing(
                context,
                format!("starts at offset {target}, which overlaps data ending at {}", self.offset),
            ));
        }
        let gap = target - self.offset;
        let skipped = io::copy(&mut (&mut self.inner).take(gap), &mut io::sink())?;
        self.offset += skipped;
        if skipped < gap {
            return Err(TraceError::truncated(context, gap, skipped));
        }
        Ok(())
    }

    /// Read a 4-byte tag, or `None` at a clean end of stream.
    pub fn read_tag(&mut self, context: &str) -> Result<Option<[u8; 4]>> {
        let mut tag = [0u8; 4];
        let mut filled = 0;
        while filled < tag.len() {
            match self.inner.read(&mut tag[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.offset += filled as u64;
        match filled {
            0 => Ok(None),
            4 => Ok(Some(tag)),
            n => Err(TraceError::truncated(context, 4, n as u64)),
        }
    }

    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner.read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;
        Ok(buf)
    }
}

// ── Block side ───────────────────────────────────────────────────────────────

pub(crate) struct SectionCursor<'a> {
    data:    &'a [u8],
    pos:     usize,
    context: &'a str,
}

impl<'a> SectionCursor<'a> {
    pub fn new(data: &'a [u8], context: &'a str) -> Self {
        Self { data, pos: 0, context }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(TraceError::framing(
                self.context,
                format!("needs {n} bytes at position {}, only {} declared", self.pos, self.remaining()),
            ));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    /// Succeeds only if every declared byte was consumed.
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(TraceError::framing(
                self.context,
                format!("{} declared bytes left unread", self.remaining()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn short_stream_is_truncation() {
        let mut r = OffsetReader::new(Cursor::new(vec![1u8, 2, 3]));
        let err = r.read_block(8, "samples").unwrap_err();
        assert!(matches!(err, TraceError::Truncated { expected: 8, available: 3, .. }));
    }

    #[test]
    fn backwards_skip_is_framing() {
        let mut r = OffsetReader::new(Cursor::new(vec![0u8; 16]));
        r.read_block(10, "header").unwrap();
        assert!(matches!(r.skip_to(4, "bases"), Err(TraceError::Framing { .. })));
        r.skip_to(12, "bases").unwrap();
        assert_eq!(r.offset(), 12);
    }

    #[test]
    fn tag_reader_distinguishes_clean_eof() {
        let mut r = OffsetReader::new(Cursor::new(b"BASEBA".to_vec()));
        assert_eq!(r.read_tag("chunk").unwrap(), Some(*b"BASE"));
        assert!(r.read_tag("chunk").unwrap_err().is_truncated());
        assert_eq!(r.read_tag("chunk").unwrap(), None);
    }

    #[test]
    fn cursor_flags_over_and_under_reads() {
        let data = [0u8, 0, 0, 7, 9];
        let mut c = SectionCursor::new(&data, "bases");
        assert_eq!(c.u32().unwrap(), 7);
        assert!(matches!(c.take(2), Err(TraceError::Framing { .. })));
        assert!(matches!(c.finish(), Err(TraceError::Framing { .. })));
    }
}
