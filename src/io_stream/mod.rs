//! Binary stream abstraction used by the framed-block codec.
//!
//! # Fault model
//! Streams never return `Result` from individual reads or writes.  The first
//! failure latches a sticky fault flag instead:
//!   - Reads after a fault return `0` / an empty buffer.
//!   - Writes after a fault are dropped.
//!   - `fail()` reports the flag; callers check it once after a sequence of
//!     operations rather than after every field.
//!
//! # Endianness
//! Byte order is a property of the stream, selected at construction
//! ([`Endian::Little`] by default).  The framed-block layer never swaps bytes
//! itself.
//!
//! # Implementations
//! - [`StreamBuf`]: growable in-memory buffer with a read cursor; implements
//!   both directions.
//! - [`StreamReader`] / [`StreamWriter`]: adapters over any `std::io::Read` /
//!   `std::io::Write`.  They keep the first `io::Error` for inspection.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

/// Byte order of multi-byte integers on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Source side of a binary stream.
pub trait InputStream {
    fn get16(&mut self) -> u16;
    fn get32(&mut self) -> u32;
    /// Read up to `len` bytes.  A short read latches the fault flag and
    /// returns what was available.
    fn get_raw(&mut self, len: usize) -> Vec<u8>;
    fn skip(&mut self, len: usize);
    fn fail(&self) -> bool;
}

/// Sink side of a binary stream.
pub trait OutputStream {
    fn put16(&mut self, value: u16);
    fn put32(&mut self, value: u32);
    fn put_raw(&mut self, bytes: &[u8]);
    fn fail(&self) -> bool;
}

// ── StreamBuf ────────────────────────────────────────────────────────────────

/// In-memory stream.  Writes append at the end; reads consume from a cursor.
#[derive(Debug, Clone, Default)]
pub struct StreamBuf {
    data:   Vec<u8>,
    pos:    usize,
    endian: Endian,
    failed: bool,
}

impl StreamBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endian(endian: Endian) -> Self {
        Self { endian, ..Self::default() }
    }

    /// Wrap existing bytes; the cursor starts at the first byte.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, ..Self::default() }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Unread bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Number of unread bytes.
    pub fn size(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Every byte ever written, including the ones already read.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn fail(&self) -> bool {
        self.failed
    }

    /// Take `len` bytes off the cursor, or latch the fault and drain the rest.
    fn take(&mut self, len: usize) -> Option<&[u8]> {
        if self.failed {
            return None;
        }
        if self.size() < len {
            self.failed = true;
            self.pos = self.data.len();
            return None;
        }
        let start = self.pos;
        self.pos += len;
        Some(&self.data[start..self.pos])
    }
}

impl InputStream for StreamBuf {
    fn get16(&mut self) -> u16 {
        let endian = self.endian;
        match self.take(2) {
            Some(b) => match endian {
                Endian::Little => LittleEndian::read_u16(b),
                Endian::Big    => BigEndian::read_u16(b),
            },
            None => 0,
        }
    }

    fn get32(&mut self) -> u32 {
        let endian = self.endian;
        match self.take(4) {
            Some(b) => match endian {
                Endian::Little => LittleEndian::read_u32(b),
                Endian::Big    => BigEndian::read_u32(b),
            },
            None => 0,
        }
    }

    fn get_raw(&mut self, len: usize) -> Vec<u8> {
        if self.failed {
            return Vec::new();
        }
        let available = len.min(self.size());
        let out = self.data[self.pos..self.pos + available].to_vec();
        self.pos += available;
        if available < len {
            self.failed = true;
        }
        out
    }

    fn skip(&mut self, len: usize) {
        let _ = self.take(len);
    }

    fn fail(&self) -> bool {
        self.failed
    }
}

impl OutputStream for StreamBuf {
    fn put16(&mut self, value: u16) {
        if self.failed {
            return;
        }
        let mut b = [0u8; 2];
        match self.endian {
            Endian::Little => LittleEndian::write_u16(&mut b, value),
            Endian::Big    => BigEndian::write_u16(&mut b, value),
        }
        self.data.extend_from_slice(&b);
    }

    fn put32(&mut self, value: u32) {
        if self.failed {
            return;
        }
        let mut b = [0u8; 4];
        match self.endian {
            Endian::Little => LittleEndian::write_u32(&mut b, value),
            Endian::Big    => BigEndian::write_u32(&mut b, value),
        }
        self.data.extend_from_slice(&b);
    }

    fn put_raw(&mut self, bytes: &[u8]) {
        if !self.failed {
            self.data.extend_from_slice(bytes);
        }
    }

    fn fail(&self) -> bool {
        self.failed
    }
}

// ── StreamReader ─────────────────────────────────────────────────────────────

/// [`InputStream`] over any `Read`.
pub struct StreamReader<R: Read> {
    inner:  R,
    endian: Endian,
    error:  Option<io::Error>,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_endian(inner, Endian::Little)
    }

    pub fn with_endian(inner: R, endian: Endian) -> Self {
        Self { inner, endian, error: None }
    }

    /// The error that latched the fault, if any.
    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn latch<T: Default>(&mut self, res: io::Result<T>) -> T {
        res.unwrap_or_else(|e| {
            self.error = Some(e);
            T::default()
        })
    }
}

impl<R: Read> InputStream for StreamReader<R> {
    fn get16(&mut self) -> u16 {
        if self.error.is_some() {
            return 0;
        }
        let res = match self.endian {
            Endian::Little => self.inner.read_u16::<LittleEndian>(),
            Endian::Big    => self.inner.read_u16::<BigEndian>(),
        };
        self.latch(res)
    }

    fn get32(&mut self) -> u32 {
        if self.error.is_some() {
            return 0;
        }
        let res = match self.endian {
            Endian::Little => self.inner.read_u32::<LittleEndian>(),
            Endian::Big    => self.inner.read_u32::<BigEndian>(),
        };
        self.latch(res)
    }

    fn get_raw(&mut self, len: usize) -> Vec<u8> {
        if self.error.is_some() {
            return Vec::new();
        }
        let mut out = Vec::new();
        let res = (&mut self.inner).take(len as u64).read_to_end(&mut out);
        match res {
            Ok(n) if n < len => {
                self.error = Some(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {len} bytes, stream ended after {n}"),
                ));
            }
            Ok(_) => {}
            Err(e) => self.error = Some(e),
        }
        out
    }

    fn skip(&mut self, len: usize) {
        if self.error.is_some() {
            return;
        }
        let res = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink());
        match res {
            Ok(n) if n < len as u64 => {
                self.error = Some(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("cannot skip {len} bytes, stream ended after {n}"),
                ));
            }
            Ok(_) => {}
            Err(e) => self.error = Some(e),
        }
    }

    fn fail(&self) -> bool {
        self.error.is_some()
    }
}

// ── StreamWriter ─────────────────────────────────────────────────────────────

/// [`OutputStream`] over any `Write`.
pub struct StreamWriter<W: Write> {
    inner:  W,
    endian: Endian,
    error:  Option<io::Error>,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_endian(inner, Endian::Little)
    }

    pub fn with_endian(inner: W, endian: Endian) -> Self {
        Self { inner, endian, error: None }
    }

    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    /// Flush the underlying writer.  A flush failure latches the fault.
    pub fn flush(&mut self) {
        if self.error.is_none() {
            if let Err(e) = self.inner.flush() {
                self.error = Some(e);
            }
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn latch(&mut self, res: io::Result<()>) {
        if let Err(e) = res {
            self.error = Some(e);
        }
    }
}

impl<W: Write> OutputStream for StreamWriter<W> {
    fn put16(&mut self, value: u16) {
        if self.error.is_some() {
            return;
        }
        let res = match self.endian {
            Endian::Little => self.inner.write_u16::<LittleEndian>(value),
            Endian::Big    => self.inner.write_u16::<BigEndian>(value),
        };
        self.latch(res);
    }

    fn put32(&mut self, value: u32) {
        if self.error.is_some() {
            return;
        }
        let res = match self.endian {
            Endian::Little => self.inner.write_u32::<LittleEndian>(value),
            Endian::Big    => self.inner.write_u32::<BigEndian>(value),
        };
        self.latch(res);
    }

    fn put_raw(&mut self, bytes: &[u8]) {
        if self.error.is_some() {
            return;
        }
        let res = self.inner.write_all(bytes);
        self.latch(res);
    }

    fn fail(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn streambuf_little_endian_layout() {
        let mut buf = StreamBuf::new();
        buf.put32(0x0102_0304);
        buf.put16(0x0506);
        buf.put_raw(&[7, 8]);
        assert_eq!(buf.as_slice(), &[4, 3, 2, 1, 6, 5, 7, 8]);

        assert_eq!(buf.get32(), 0x0102_0304);
        assert_eq!(buf.get16(), 0x0506);
        assert_eq!(buf.get_raw(2), vec![7, 8]);
        assert_eq!(buf.size(), 0);
        assert!(!buf.fail());
    }

    #[test]
    fn streambuf_big_endian_layout() {
        let mut buf = StreamBuf::with_endian(Endian::Big);
        buf.put32(0x0102_0304);
        buf.put16(0x0506);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.get32(), 0x0102_0304);
        assert_eq!(buf.get16(), 0x0506);
    }

    #[test]
    fn streambuf_fault_is_sticky() {
        let mut buf = StreamBuf::from_vec(vec![1, 2, 3]);
        assert_eq!(buf.get32(), 0);
        assert!(buf.fail());
        assert_eq!(buf.get16(), 0);
        buf.put_raw(&[9]);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn streambuf_short_raw_read_returns_available() {
        let mut buf = StreamBuf::from_vec(vec![1, 2, 3]);
        buf.skip(1);
        assert_eq!(buf.data(), &[2, 3]);
        assert_eq!(buf.get_raw(5), vec![2, 3]);
        assert!(buf.fail());
    }

    #[test]
    fn reader_latches_first_error() {
        let mut reader = StreamReader::new(Cursor::new(vec![0xAA, 0xBB, 0xCC]));
        assert_eq!(reader.get16(), 0xBBAA);
        assert!(!reader.fail());
        assert_eq!(reader.get32(), 0);
        assert!(reader.fail());
        assert_eq!(reader.error().map(|e| e.kind()), Some(io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn reader_skip_and_raw() {
        let mut reader = StreamReader::with_endian(Cursor::new(vec![0, 0, 1, 2, 3, 4]), Endian::Big);
        reader.skip(2);
        assert_eq!(reader.get16(), 0x0102);
        assert_eq!(reader.get_raw(2), vec![3, 4]);
        assert!(!reader.fail());
        reader.skip(1);
        assert!(reader.fail());
    }

    struct Broken;
    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_reports_sink_failure() {
        let mut writer = StreamWriter::new(Broken);
        writer.put32(1);
        assert!(writer.fail());
        assert_eq!(writer.error().map(|e| e.kind()), Some(io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn writer_matches_streambuf_bytes() {
        let mut writer = StreamWriter::new(Vec::new());
        writer.put32(0xDEAD_BEEF);
        writer.put16(7);
        writer.put_raw(b"xy");
        writer.flush();
        let mut buf = StreamBuf::new();
        buf.put32(0xDEAD_BEEF);
        buf.put16(7);
        buf.put_raw(b"xy");
        assert_eq!(writer.into_inner(), buf.into_vec());
    }
}
