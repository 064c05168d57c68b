//! Little-endian read helpers for OBF structures

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read, Seek};

use super::constants::MAX_DIMENSIONS;
use crate::types::ScanError;

/// Random-access byte source the reader can scan and decode from
///
/// Implemented for every `Read + Seek` type (files, cursors over byte buffers, ...).
pub trait ByteSource: Read + Seek {}

impl<T: Read + Seek + ?Sized> ByteSource for T {}

/// Read exactly `len` bytes without trusting `len` for the allocation size
pub(crate) fn read_bytes<R: Read + ?Sized>(reader: &mut R, len: u64) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    (&mut *reader).take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, got {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

/// Read a u32 length-prefixed UTF-8 string (invalid sequences are replaced)
pub(crate) fn read_string<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let len = reader.read_u32::<LittleEndian>()?;
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = read_bytes(reader, len as u64)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read `count` consecutive little-endian f64 values
pub(crate) fn read_f64_vec<R: Read + ?Sized>(reader: &mut R, count: u64) -> io::Result<Vec<f64>> {
    let bytes = read_bytes(reader, count.saturating_mul(8))?;
    let mut values = vec![0.0; count as usize];
    LittleEndian::read_f64_into(&bytes, &mut values);
    Ok(values)
}

/// Read `count` consecutive little-endian u64 values
pub(crate) fn read_u64_vec<R: Read + ?Sized>(reader: &mut R, count: u64) -> io::Result<Vec<u64>> {
    let bytes = read_bytes(reader, count.saturating_mul(8))?;
    let mut values = vec![0u64; count as usize];
    LittleEndian::read_u64_into(&bytes, &mut values);
    Ok(values)
}

/// Read all fixed dimension slots, including the unused ones
pub(crate) fn read_u32_slots<R: Read + ?Sized>(reader: &mut R) -> io::Result<[u32; MAX_DIMENSIONS]> {
    let mut slots = [0u32; MAX_DIMENSIONS];
    reader.read_u32_into::<LittleEndian>(&mut slots)?;
    Ok(slots)
}

pub(crate) fn read_f64_slots<R: Read + ?Sized>(reader: &mut R) -> io::Result<[f64; MAX_DIMENSIONS]> {
    let mut slots = [0f64; MAX_DIMENSIONS];
    reader.read_f64_into::<LittleEndian>(&mut slots)?;
    Ok(slots)
}

/// Keep only the first `rank` slots
pub(crate) fn leading<T: Copy>(slots: &[T], rank: usize) -> Vec<T> {
    slots[..rank.min(slots.len())].to_vec()
}

/// Wraps a reader and counts the bytes consumed through it
pub(crate) struct CountingReader<'a, R: ?Sized> {
    inner: &'a mut R,
    consumed: u64,
}

impl<'a, R: Read + ?Sized> CountingReader<'a, R> {
    pub(crate) fn new(inner: &'a mut R) -> Self {
        Self { inner, consumed: 0 }
    }

    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: Read + ?Sized> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

/// Map end-of-stream inside a stack section to a local truncation error
pub(crate) fn truncated(position: u64, section: &'static str) -> impl Fn(io::Error) -> ScanError + Copy {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ScanError::TruncatedStack { position, section }
        } else {
            ScanError::IoError(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_string() {
        let mut data = Vec::new();
        data.extend_from_slice(&5u32.to_le_bytes());
        data.extend_from_slice(b"hello");
        data.extend_from_slice(&0u32.to_le_bytes());

        let mut cursor = Cursor::new(data);
        assert_eq!(read_string(&mut cursor).unwrap(), "hello");
        assert_eq!(read_string(&mut cursor).unwrap(), "");
    }

    #[test]
    fn test_read_string_past_end() {
        let mut data = Vec::new();
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(b"abc");

        let err = read_string(&mut Cursor::new(data)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_counting_reader() {
        let mut cursor = Cursor::new(vec![0u8; 32]);
        let mut reader = CountingReader::new(&mut cursor);
        reader.read_u32::<LittleEndian>().unwrap();
        reader.read_u64::<LittleEndian>().unwrap();
        assert_eq!(reader.consumed(), 12);
    }

    #[test]
    fn test_leading_slots() {
        let slots = [1u32, 2, 3, 4];
        assert_eq!(leading(&slots, 2), vec![1, 2]);
        assert_eq!(leading(&slots, 10), vec![1, 2, 3, 4]);
    }
}
