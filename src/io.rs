//! Byte-level I/O primitives: positioning, raw reads/writes, the big-endian
//! integer/double codec used by the header and tile-header table, and the
//! pixel byte-order adapter.
//!
//! Every primitive here returns an explicit [`crate::error::Result`]; callers
//! record the resulting [`crate::error::ErrorKind`] onto the handle's sticky
//! error field rather than propagating a bare `std::io::Error`.

use crate::error::{Error, ErrorKind, Result, UnitResult};
use std::io::{Read, Seek, SeekFrom, Write};

/// Declares which byte order pixel data units are stored in on disk,
/// independent of the host's native byte order. This is the only part of
/// the original format's "simple" data-type convention this crate documents;
/// application-level pixel-type tables are out of scope.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DataEndian {
    Little,
    Big,
}

impl DataEndian {
    /// The byte order of the machine this code is running on.
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            DataEndian::Big
        } else {
            DataEndian::Little
        }
    }

    fn matches_host(self) -> bool {
        self == Self::host()
    }
}

/// Seeks to an absolute byte offset from the start of the stream.
pub fn seek_to(stream: &mut impl Seek, offset: u64) -> UnitResult {
    stream
        .seek(SeekFrom::Start(offset))
        .map(|_| ())
        .map_err(|io| Error::io(ErrorKind::Seek, io))
}

/// Reads exactly `buffer.len()` bytes, or fails with [`ErrorKind::Read`].
pub fn read_exact(stream: &mut impl Read, buffer: &mut [u8]) -> UnitResult {
    stream.read_exact(buffer).map_err(|io| Error::io(ErrorKind::Read, io))
}

/// Writes the entire buffer, or fails with [`ErrorKind::Write`].
pub fn write_all(stream: &mut impl Write, buffer: &[u8]) -> UnitResult {
    stream.write_all(buffer).map_err(|io| Error::io(ErrorKind::Write, io))
}

/// Truncates the underlying file at `offset`, or fails with [`ErrorKind::Truncate`].
pub fn truncate_to(file: &std::fs::File, offset: u64) -> UnitResult {
    file.set_len(offset).map_err(|io| Error::io(ErrorKind::Truncate, io))
}

/// Flushes buffered writes, or fails with [`ErrorKind::Write`].
pub fn flush(stream: &mut impl Write) -> UnitResult {
    stream.flush().map_err(|io| Error::io(ErrorKind::Write, io))
}

/// Reads a 32-bit signed integer in big-endian network byte order.
pub fn read_i32_be(stream: &mut impl Read) -> Result<i32> {
    let mut bytes = [0u8; 4];
    read_exact(stream, &mut bytes)?;
    Ok(i32::from_be_bytes(bytes))
}

/// Writes a 32-bit signed integer in big-endian network byte order.
pub fn write_i32_be(stream: &mut impl Write, value: i32) -> UnitResult {
    write_all(stream, &value.to_be_bytes())
}

/// Reads a 64-bit unsigned integer in big-endian network byte order.
///
/// Nothing in the persisted file format uses this codec (all on-disk
/// integers are 32-bit); it exists so the crate exposes a correct 64-bit
/// codec rather than the original library's `_sif_int64_to_packed_bytes`,
/// which never writes the fourth byte of the value.
pub fn read_u64_be(stream: &mut impl Read) -> Result<u64> {
    let mut bytes = [0u8; 8];
    read_exact(stream, &mut bytes)?;
    Ok(u64::from_be_bytes(bytes))
}

/// Writes a 64-bit unsigned integer in big-endian network byte order.
pub fn write_u64_be(stream: &mut impl Write, value: u64) -> UnitResult {
    write_all(stream, &value.to_be_bytes())
}

/// Reads a 64-bit IEEE-754 double in big-endian network byte order
/// (format version ≥ 2).
pub fn read_f64_be(stream: &mut impl Read) -> Result<f64> {
    let mut bytes = [0u8; 8];
    read_exact(stream, &mut bytes)?;
    Ok(f64::from_be_bytes(bytes))
}

/// Writes a 64-bit IEEE-754 double in big-endian network byte order.
pub fn write_f64_be(stream: &mut impl Write, value: f64) -> UnitResult {
    write_all(stream, &value.to_be_bytes())
}

/// Version 1 quirk: the affine transform was written in the byte order of
/// whichever host wrote the file, not network order. Readers and writers of
/// a version-1 file must preserve this exactly; new files always use
/// [`write_f64_be`].
pub fn read_f64_native(stream: &mut impl Read) -> Result<f64> {
    let mut bytes = [0u8; 8];
    read_exact(stream, &mut bytes)?;
    Ok(if cfg!(target_endian = "big") {
        f64::from_be_bytes(bytes)
    } else {
        f64::from_le_bytes(bytes)
    })
}

/// Writes a double in the host's native byte order (version 1 compatibility only).
pub fn write_f64_native(stream: &mut impl Write, value: f64) -> UnitResult {
    let bytes = if cfg!(target_endian = "big") {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };

    write_all(stream, &bytes)
}

/// Reverses the byte order within each `unit_size`-byte element of `buffer`
/// in place, unless `file_endian` already matches the host's native order.
/// A no-op for single-byte data units, which have no byte order.
pub fn adapt_pixel_bytes(buffer: &mut [u8], unit_size: usize, file_endian: DataEndian) {
    if unit_size <= 1 || file_endian.matches_host() {
        return;
    }

    debug_assert_eq!(buffer.len() % unit_size, 0, "buffer is not a whole number of data units");

    for unit in buffer.chunks_exact_mut(unit_size) {
        unit.reverse();
    }
}

/// Streams that can be shrunk to an exact length, so [`crate::file::SifFile`]
/// can truncate away a defragmented or consolidated file's trailing bytes
/// regardless of whether it's backed by a real file or an in-memory buffer.
pub trait Truncatable {
    fn truncate(&mut self, len: u64) -> UnitResult;
}

impl Truncatable for std::fs::File {
    fn truncate(&mut self, len: u64) -> UnitResult {
        truncate_to(self, len)
    }
}

impl Truncatable for std::io::Cursor<Vec<u8>> {
    fn truncate(&mut self, len: u64) -> UnitResult {
        self.get_mut().truncate(len as usize);
        Ok(())
    }
}

/// Wraps a stream and counts the bytes read or written through it, so the
/// header codec and defragmenter can assert exact offsets without an extra
/// `stream_position` syscall at every step.
#[derive(Debug)]
pub struct Tracking<T> {
    inner: T,
    position: u64,
}

impl<T> Tracking<T> {
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0 }
    }

    pub fn byte_position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.position += count as u64;
        Ok(count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let count = self.inner.write(buf)?;
        self.position += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<T: Seek> Seek for Tracking<T> {
    fn seek(&mut self, position: SeekFrom) -> std::io::Result<u64> {
        let new_position = self.inner.seek(position)?;
        self.position = new_position;
        Ok(new_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn be_i32_round_trips_negative_values() {
        let mut buffer = Vec::new();
        write_i32_be(&mut buffer, -1).unwrap();
        assert_eq!(buffer, [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(read_i32_be(&mut Cursor::new(buffer)).unwrap(), -1);
    }

    #[test]
    fn be_f64_round_trips() {
        let mut buffer = Vec::new();
        write_f64_be(&mut buffer, 1.5).unwrap();
        assert_eq!(read_f64_be(&mut Cursor::new(buffer)).unwrap(), 1.5);
    }

    #[test]
    fn be_u64_writes_all_eight_bytes() {
        let mut buffer = Vec::new();
        write_u64_be(&mut buffer, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(buffer, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(read_u64_be(&mut Cursor::new(buffer)).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn adapt_pixel_bytes_is_noop_for_matching_endian() {
        let mut buffer = [1u8, 2, 3, 4];
        adapt_pixel_bytes(&mut buffer, 2, DataEndian::host());
        assert_eq!(buffer, [1, 2, 3, 4]);
    }

    #[test]
    fn adapt_pixel_bytes_reverses_each_unit() {
        let opposite = if DataEndian::host() == DataEndian::Big { DataEndian::Little } else { DataEndian::Big };
        let mut buffer = [1u8, 2, 3, 4];
        adapt_pixel_bytes(&mut buffer, 2, opposite);
        assert_eq!(buffer, [2, 1, 4, 3]);
    }

    #[test]
    fn adapt_pixel_bytes_is_noop_for_byte_sized_units() {
        let opposite = if DataEndian::host() == DataEndian::Big { DataEndian::Little } else { DataEndian::Big };
        let mut buffer = [1u8, 2, 3, 4];
        adapt_pixel_bytes(&mut buffer, 1, opposite);
        assert_eq!(buffer, [1, 2, 3, 4]);
    }

    #[test]
    fn tracking_counts_reads_and_writes() {
        let mut write_tracker = Tracking::new(Vec::new());
        write_tracker.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(write_tracker.byte_position(), 3);

        let mut read_tracker = Tracking::new(Cursor::new(vec![1u8, 2, 3, 4]));
        let mut buf = [0u8; 2];
        read_tracker.read_exact(&mut buf).unwrap();
        assert_eq!(read_tracker.byte_position(), 2);
    }
}
