//! Numeric sample encodings
//!
//! Stack headers declare the sample encoding as a bit-flag code. The same
//! lookup serves the scanner (bytes per sample) and the pixel decoder
//! (reinterpretation of the raw bytes). All encodings are little-endian.
//!
//! Codes that exist in the format but are not handled here:
//! - 0x0000_0000: "automatic"
//! - 0x0000_0400 / 0x0000_0800: packed RGB with 3 or 4 samples per pixel
//! - 0x0001_0000: boolean
//! - any code with 0x4000_0000 set: complex-valued variant

use serde::Serialize;
use std::fmt;

/// Sample encoding of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
    U64,
    I64,
}

impl DataType {
    /// All supported encodings, in code order
    pub const ALL: [DataType; 10] = [
        DataType::U8,
        DataType::I8,
        DataType::U16,
        DataType::I16,
        DataType::U32,
        DataType::I32,
        DataType::F32,
        DataType::F64,
        DataType::U64,
        DataType::I64,
    ];

    /// Map an on-disk code to an encoding
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x0000_0001 => Some(DataType::U8),
            0x0000_0002 => Some(DataType::I8),
            0x0000_0004 => Some(DataType::U16),
            0x0000_0008 => Some(DataType::I16),
            0x0000_0010 => Some(DataType::U32),
            0x0000_0020 => Some(DataType::I32),
            0x0000_0040 => Some(DataType::F32),
            0x0000_0080 => Some(DataType::F64),
            0x0000_1000 => Some(DataType::U64),
            0x0000_2000 => Some(DataType::I64),
            _ => None,
        }
    }

    /// The on-disk code of this encoding
    pub fn code(self) -> u32 {
        match self {
            DataType::U8 => 0x0000_0001,
            DataType::I8 => 0x0000_0002,
            DataType::U16 => 0x0000_0004,
            DataType::I16 => 0x0000_0008,
            DataType::U32 => 0x0000_0010,
            DataType::I32 => 0x0000_0020,
            DataType::F32 => 0x0000_0040,
            DataType::F64 => 0x0000_0080,
            DataType::U64 => 0x0000_1000,
            DataType::I64 => 0x0000_2000,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::F64 | DataType::U64 | DataType::I64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::U8 => "uint8",
            DataType::I8 => "int8",
            DataType::U16 => "uint16",
            DataType::I16 => "int16",
            DataType::U32 => "uint32",
            DataType::I32 => "int32",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
            DataType::U64 => "uint64",
            DataType::I64 => "int64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_codes() {
        // Header table (8-bit..64-bit float) plus the 64-bit integer codes
        let expected = [
            (0x1, 1),
            (0x2, 1),
            (0x4, 2),
            (0x8, 2),
            (0x10, 4),
            (0x20, 4),
            (0x40, 4),
            (0x80, 8),
            (0x1000, 8),
            (0x2000, 8),
        ];

        for (code, bytes) in expected {
            let data_type = DataType::from_code(code).unwrap();
            assert_eq!(data_type.bytes_per_sample(), bytes, "code 0x{:x}", code);
            assert_eq!(data_type.code(), code);
        }
        assert_eq!(DataType::ALL.len(), expected.len());
    }

    #[test]
    fn test_unsupported_codes() {
        for code in [0x0, 0x400, 0x800, 0x1_0000, 0x4000_0040, 0x3] {
            assert_eq!(DataType::from_code(code), None, "code 0x{:x}", code);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::F32.to_string(), "float32");
        assert_eq!(DataType::I64.to_string(), "int64");
    }
}
