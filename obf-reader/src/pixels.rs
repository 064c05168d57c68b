//! Pixel data decoding
//!
//! Reads the sample run of one scanned stack, inflates it when the stack is
//! compressed, and reinterprets the bytes as a row-major `(height, width)` grid
//! in the stack's numeric encoding. Only flat 2D images of stack version 6 or
//! newer without a chunk table are decoded.

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use serde::Serialize;
use std::io::{Read, SeekFrom};

use crate::obf::io::read_bytes;
use crate::obf::{ByteSource, DataType};
use crate::types::{DecodeError, StackMetadata};

/// Oldest stack version with trustworthy sample accounting
pub const MIN_DECODABLE_STACK_VERSION: u32 = 6;

/// A row-major 2D grid of samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid2D<T> {
    height: usize,
    width: usize,
    data: Vec<T>,
}

impl<T> Grid2D<T> {
    /// Build a grid from row-major samples; None if the length does not match the shape
    pub fn from_vec(height: usize, width: usize, data: Vec<T>) -> Option<Self> {
        if height.checked_mul(width)? != data.len() {
            return None;
        }
        Some(Self {
            height,
            width,
            data,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// (height, width)
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.data.get(row * self.width + col)
    }

    pub fn row(&self, row: usize) -> Option<&[T]> {
        if row >= self.height {
            return None;
        }
        Some(&self.data[row * self.width..(row + 1) * self.width])
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

/// Decoded image, typed by the stack's sample encoding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StackImage {
    U8(Grid2D<u8>),
    I8(Grid2D<i8>),
    U16(Grid2D<u16>),
    I16(Grid2D<i16>),
    U32(Grid2D<u32>),
    I32(Grid2D<i32>),
    F32(Grid2D<f32>),
    F64(Grid2D<f64>),
    U64(Grid2D<u64>),
    I64(Grid2D<i64>),
}

impl StackImage {
    pub fn data_type(&self) -> DataType {
        match self {
            StackImage::U8(_) => DataType::U8,
            StackImage::I8(_) => DataType::I8,
            StackImage::U16(_) => DataType::U16,
            StackImage::I16(_) => DataType::I16,
            StackImage::U32(_) => DataType::U32,
            StackImage::I32(_) => DataType::I32,
            StackImage::F32(_) => DataType::F32,
            StackImage::F64(_) => DataType::F64,
            StackImage::U64(_) => DataType::U64,
            StackImage::I64(_) => DataType::I64,
        }
    }

    /// (height, width)
    pub fn shape(&self) -> (usize, usize) {
        match self {
            StackImage::U8(g) => g.shape(),
            StackImage::I8(g) => g.shape(),
            StackImage::U16(g) => g.shape(),
            StackImage::I16(g) => g.shape(),
            StackImage::U32(g) => g.shape(),
            StackImage::I32(g) => g.shape(),
            StackImage::F32(g) => g.shape(),
            StackImage::F64(g) => g.shape(),
            StackImage::U64(g) => g.shape(),
            StackImage::I64(g) => g.shape(),
        }
    }

    pub fn len(&self) -> usize {
        let (height, width) = self.shape();
        height * width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples widened to f64 (lossy for 64-bit integers above 2^53)
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            StackImage::U8(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
            StackImage::I8(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
            StackImage::U16(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
            StackImage::I16(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
            StackImage::U32(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
            StackImage::I32(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
            StackImage::F32(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
            StackImage::F64(g) => g.as_slice().to_vec(),
            StackImage::U64(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
            StackImage::I64(g) => g.as_slice().iter().map(|&v| v as f64).collect(),
        }
    }
}

/// Decode the pixel data of `stack` from `source`
///
/// Preconditions are checked before any byte is read. The decoded length must
/// match `width * height * bytes_per_sample` exactly; nothing is truncated or padded.
pub fn read_stack_data<R: ByteSource + ?Sized>(
    stack: &StackMetadata,
    source: &mut R,
) -> Result<StackImage, DecodeError> {
    let header = stack.header();

    if header.format_version < MIN_DECODABLE_STACK_VERSION {
        return Err(DecodeError::UnsupportedStackVersion(header.format_version));
    }
    let samples = stack
        .footer()
        .samples
        .ok_or(DecodeError::UnsupportedStackVersion(header.format_version))?;

    if samples.num_chunk_positions > 0 {
        return Err(DecodeError::ChunkedDataUnsupported(samples.num_chunk_positions));
    }

    // The first dimension with more than one pixel is the width, the second the height
    let dims: Vec<usize> = header
        .num_pixels
        .iter()
        .filter(|&&n| n > 1)
        .map(|&n| n as usize)
        .collect();
    if dims.len() != 2 {
        return Err(DecodeError::UnsupportedDimensionality(dims.len()));
    }
    let (width, height) = (dims[0], dims[1]);

    let data_type = header.data_type;
    let expected = (width as u64)
        .checked_mul(height as u64)
        .and_then(|count| count.checked_mul(data_type.bytes_per_sample() as u64))
        .ok_or(DecodeError::ImageTooLarge {
            height: height as u64,
            width: width as u64,
        })?;
    let compressed = header.compression_type != 0;

    let to_read = if compressed {
        header.data_len_disk
    } else {
        written_bytes(samples.samples_written, data_type, header.data_len_disk)
    };

    log::debug!(
        "Decoding stack '{}': {}x{} {}, reading {} bytes{}",
        header.name,
        height,
        width,
        data_type,
        to_read,
        if compressed { " (zlib)" } else { "" }
    );

    source.seek(SeekFrom::Start(header.data_start_position))?;
    let raw = read_bytes(source, to_read)?;

    let bytes = if compressed {
        inflate(&raw, expected)?
    } else {
        raw
    };

    if bytes.len() as u64 != expected {
        return Err(DecodeError::SizeMismatch {
            expected,
            actual: bytes.len() as u64,
        });
    }

    Ok(reinterpret(data_type, height, width, &bytes))
}

/// Number of on-disk bytes holding the written samples of an uncompressed stack
///
/// The sample run never extends past the stack's data region. Zero samples
/// written means the full declared size was written. Compressed runs are always
/// read whole: the zlib stream carries its own end.
fn written_bytes(samples_written: u64, data_type: DataType, data_len_disk: u64) -> u64 {
    if samples_written == 0 {
        return data_len_disk;
    }
    samples_written
        .saturating_mul(data_type.bytes_per_sample() as u64)
        .min(data_len_disk)
}

/// Inflate a zlib stream, reading at most one byte more than `expected`
fn inflate(compressed: &[u8], expected: u64) -> Result<Vec<u8>, DecodeError> {
    let mut decompressed = Vec::new();
    ZlibDecoder::new(compressed)
        .take(expected.saturating_add(1))
        .read_to_end(&mut decompressed)
        .map_err(|e| DecodeError::Decompression(e.to_string()))?;
    log::trace!(
        "Inflated {} bytes into {} bytes",
        compressed.len(),
        decompressed.len()
    );
    Ok(decompressed)
}

/// Reinterpret little-endian bytes; `bytes.len()` must equal height * width * sample size
fn reinterpret(data_type: DataType, height: usize, width: usize, bytes: &[u8]) -> StackImage {
    let count = height * width;

    match data_type {
        DataType::U8 => StackImage::U8(Grid2D {
            height,
            width,
            data: bytes.to_vec(),
        }),
        DataType::I8 => StackImage::I8(Grid2D {
            height,
            width,
            data: bytes.iter().map(|&b| b as i8).collect(),
        }),
        DataType::U16 => {
            let mut data = vec![0u16; count];
            LittleEndian::read_u16_into(bytes, &mut data);
            StackImage::U16(Grid2D { height, width, data })
        }
        DataType::I16 => {
            let mut data = vec![0i16; count];
            LittleEndian::read_i16_into(bytes, &mut data);
            StackImage::I16(Grid2D { height, width, data })
        }
        DataType::U32 => {
            let mut data = vec![0u32; count];
            LittleEndian::read_u32_into(bytes, &mut data);
            StackImage::U32(Grid2D { height, width, data })
        }
        DataType::I32 => {
            let mut data = vec![0i32; count];
            LittleEndian::read_i32_into(bytes, &mut data);
            StackImage::I32(Grid2D { height, width, data })
        }
        DataType::F32 => {
            let mut data = vec![0f32; count];
            LittleEndian::read_f32_into(bytes, &mut data);
            StackImage::F32(Grid2D { height, width, data })
        }
        DataType::F64 => {
            let mut data = vec![0f64; count];
            LittleEndian::read_f64_into(bytes, &mut data);
            StackImage::F64(Grid2D { height, width, data })
        }
        DataType::U64 => {
            let mut data = vec![0u64; count];
            LittleEndian::read_u64_into(bytes, &mut data);
            StackImage::U64(Grid2D { height, width, data })
        }
        DataType::I64 => {
            let mut data = vec![0i64; count];
            LittleEndian::read_i64_into(bytes, &mut data);
            StackImage::I64(Grid2D { height, width, data })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_accessors() {
        let grid = Grid2D::from_vec(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(grid.shape(), (2, 3));
        assert_eq!(grid.get(1, 0), Some(&4));
        assert_eq!(grid.get(0, 3), None);
        assert_eq!(grid.row(1), Some(&[4, 5, 6][..]));
        assert_eq!(grid.row(2), None);
        assert!(Grid2D::from_vec(2, 2, vec![1, 2, 3]).is_none());
    }

    #[test]
    fn test_reinterpret_little_endian() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x34, 0x12];
        match reinterpret(DataType::I16, 2, 2, &bytes) {
            StackImage::I16(grid) => assert_eq!(grid.as_slice(), &[1, -1, i16::MIN, 0x1234]),
            other => panic!("unexpected image {:?}", other),
        }

        match reinterpret(DataType::I8, 2, 4, &bytes) {
            StackImage::I8(grid) => assert_eq!(grid.get(0, 2), Some(&-1)),
            other => panic!("unexpected image {:?}", other),
        }
    }

    #[test]
    fn test_image_helpers() {
        let image = reinterpret(DataType::F32, 1, 2, &[0, 0, 0x80, 0x3f, 0, 0, 0, 0x40]);
        assert_eq!(image.data_type(), DataType::F32);
        assert_eq!(image.shape(), (1, 2));
        assert_eq!(image.len(), 2);
        assert_eq!(image.to_f64_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_written_bytes() {
        // Full run of a 4x3 float32 image
        assert_eq!(written_bytes(12, DataType::F32, 48), 48);
        // Capped at the data region
        assert_eq!(written_bytes(48, DataType::F32, 48), 48);
        // Partially written acquisition
        assert_eq!(written_bytes(5, DataType::U16, 24), 10);
        assert_eq!(written_bytes(0, DataType::U16, 24), 24);
    }

    #[test]
    fn test_inflate_is_bounded() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[7u8; 100]).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(inflate(&compressed, 100).unwrap().len(), 100);
        assert_eq!(inflate(&compressed, 10).unwrap().len(), 11);
        assert_eq!(inflate(&compressed, u64::MAX).unwrap().len(), 100);
        assert!(matches!(
            inflate(b"not zlib", 10),
            Err(DecodeError::Decompression(_))
        ));
    }
}
