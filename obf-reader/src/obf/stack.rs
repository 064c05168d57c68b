//! Fixed-layout OBF stack header
//!
//! ## Layout (little-endian)
//! - 16 bytes: stack signature
//! - u32 format version, u32 rank
//! - 15 × u32 pixel counts, 15 × f64 physical lengths, 15 × f64 physical offsets
//! - u32 data type, u32 compression type, u32 compression level
//! - u32 name length, u32 description length
//! - u64 reserved, u64 data length on disk, u64 next stack offset
//! - name bytes, description bytes, then the pixel data
//!
//! Only the first `rank` dimension slots carry data, but all 15 are always stored.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, SeekFrom};

use super::constants::{MAX_DIMENSIONS, STACK_MAGIC};
use super::data_type::DataType;
use super::io::{leading, read_bytes, read_f64_slots, read_u32_slots, ByteSource};
use crate::types::{Result, ScanError, StackHeader};

/// Read the stack header at `position`
///
/// Any problem here is fatal to the scan: without a trusted header there is no
/// way to locate the footer or the next stack.
pub fn read_stack_header<R: ByteSource + ?Sized>(source: &mut R, position: u64) -> Result<StackHeader> {
    let corrupt = move |reason: String| ScanError::CorruptStack { position, reason };
    let header_eof = move |e: io::Error| match e.kind() {
        io::ErrorKind::UnexpectedEof => ScanError::CorruptStack {
            position,
            reason: "stack header extends past the end of the file".to_string(),
        },
        _ => ScanError::IoError(e),
    };

    source.seek(SeekFrom::Start(position))?;

    let mut magic = [0u8; 16];
    source.read_exact(&mut magic).map_err(header_eof)?;
    if &magic != STACK_MAGIC {
        return Err(corrupt("stack signature not found".to_string()));
    }

    let format_version = source.read_u32::<LittleEndian>().map_err(header_eof)?;
    let rank = source.read_u32::<LittleEndian>().map_err(header_eof)?;
    if rank as usize > MAX_DIMENSIONS {
        return Err(corrupt(format!(
            "rank {} exceeds the maximum of {} dimensions",
            rank, MAX_DIMENSIONS
        )));
    }

    // All slots are consumed to keep the cursor aligned
    let pixel_slots = read_u32_slots(source).map_err(header_eof)?;
    let length_slots = read_f64_slots(source).map_err(header_eof)?;
    let offset_slots = read_f64_slots(source).map_err(header_eof)?;

    let data_type_code = source.read_u32::<LittleEndian>().map_err(header_eof)?;
    let compression_type = source.read_u32::<LittleEndian>().map_err(header_eof)?;
    let compression_level = source.read_u32::<LittleEndian>().map_err(header_eof)?;
    let name_len = source.read_u32::<LittleEndian>().map_err(header_eof)?;
    let description_len = source.read_u32::<LittleEndian>().map_err(header_eof)?;
    let reserved = source.read_u64::<LittleEndian>().map_err(header_eof)?;
    let data_len_disk = source.read_u64::<LittleEndian>().map_err(header_eof)?;
    let next_stack_pos = source.read_u64::<LittleEndian>().map_err(header_eof)?;

    let data_type =
        DataType::from_code(data_type_code).ok_or(ScanError::UnsupportedDataType(data_type_code))?;

    let name = read_bytes(source, name_len as u64).map_err(header_eof)?;
    let description = read_bytes(source, description_len as u64).map_err(header_eof)?;

    let data_start_position = source.stream_position()?;
    if data_start_position.checked_add(data_len_disk).is_none() {
        return Err(corrupt(format!(
            "data length {} overflows the file offset range",
            data_len_disk
        )));
    }

    let rank_len = rank as usize;
    let header = StackHeader {
        position,
        format_version,
        rank,
        num_pixels: leading(&pixel_slots, rank_len),
        physical_lengths: leading(&length_slots, rank_len),
        physical_offsets: leading(&offset_slots, rank_len),
        data_type,
        compression_type,
        compression_level,
        reserved,
        data_len_disk,
        next_stack_pos,
        name: String::from_utf8_lossy(&name).into_owned(),
        description: String::from_utf8_lossy(&description).into_owned(),
        data_start_position,
    };

    log::debug!(
        "Stack '{}' at {}: version {}, rank {}, pixels {:?}, {}, {} bytes on disk",
        header.name,
        position,
        format_version,
        rank,
        header.num_pixels,
        data_type,
        data_len_disk
    );

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stack_header_bytes(rank: u32, data_type: u32, name: &str) -> Vec<u8> {
        let mut buf = STACK_MAGIC.to_vec();
        buf.extend_from_slice(&6u32.to_le_bytes());
        buf.extend_from_slice(&rank.to_le_bytes());
        for i in 0..MAX_DIMENSIONS as u32 {
            // Padding slots hold garbage that must not leak into the header
            buf.extend_from_slice(&(i + 10).to_le_bytes());
        }
        for i in 0..MAX_DIMENSIONS {
            buf.extend_from_slice(&(i as f64 * 1.5).to_le_bytes());
        }
        for i in 0..MAX_DIMENSIONS {
            buf.extend_from_slice(&(-(i as f64)).to_le_bytes());
        }
        buf.extend_from_slice(&data_type.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&6u32.to_le_bytes());
        buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&100u64.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b"desc");
        buf
    }

    #[test]
    fn test_read_stack_header() {
        let mut data = vec![0u8; 8];
        data.extend(stack_header_bytes(2, 0x4, "Ch1"));
        let mut cursor = Cursor::new(data);

        let header = read_stack_header(&mut cursor, 8).unwrap();
        assert_eq!(header.position, 8);
        assert_eq!(header.format_version, 6);
        assert_eq!(header.num_pixels, vec![10, 11]);
        assert_eq!(header.physical_lengths, vec![0.0, 1.5]);
        assert_eq!(header.physical_offsets, vec![0.0, -1.0]);
        assert_eq!(header.data_type, DataType::U16);
        assert_eq!(header.compression_type, 1);
        assert_eq!(header.compression_level, 6);
        assert_eq!(header.name, "Ch1");
        assert_eq!(header.description, "desc");
        assert_eq!(header.data_len_disk, 100);
        assert_eq!(header.data_start_position, 8 + 368 + 3 + 4);
        assert_eq!(header.footer_start_position(), 8 + 368 + 3 + 4 + 100);
    }

    #[test]
    fn test_bad_stack_magic() {
        let mut data = stack_header_bytes(2, 0x4, "Ch1");
        data[3] = 0;
        let result = read_stack_header(&mut Cursor::new(data), 0);
        assert!(matches!(result, Err(ScanError::CorruptStack { position: 0, .. })));
    }

    #[test]
    fn test_rank_too_large() {
        let data = stack_header_bytes(16, 0x4, "Ch1");
        let result = read_stack_header(&mut Cursor::new(data), 0);
        assert!(matches!(result, Err(ScanError::CorruptStack { .. })));
    }

    #[test]
    fn test_unsupported_data_type() {
        let data = stack_header_bytes(2, 0x400, "rgb");
        let result = read_stack_header(&mut Cursor::new(data), 0);
        assert!(matches!(result, Err(ScanError::UnsupportedDataType(0x400))));
    }

    #[test]
    fn test_truncated_header() {
        let mut data = stack_header_bytes(2, 0x4, "Ch1");
        data.truncate(200);
        let result = read_stack_header(&mut Cursor::new(data), 0);
        assert!(matches!(result, Err(ScanError::CorruptStack { .. })));
    }
}
