//! Fixed values of the OBF on-disk format

/// File signature: "OMAS_BF\n" followed by 0xFF 0xFF
pub const FILE_MAGIC: &[u8; 10] = b"OMAS_BF\n\xff\xff";

/// Stack signature: "OMAS_BF_STACK\n" followed by 0xFF 0xFF
pub const STACK_MAGIC: &[u8; 16] = b"OMAS_BF_STACK\n\xff\xff";

/// Oldest file format version with a defined layout
pub const MIN_FILE_VERSION: u32 = 2;

/// Hard limit on the number of stack dimensions
pub const MAX_DIMENSIONS: usize = 15;

/// Key of the OME-XML entry in the file metadata block
pub const OME_XML_KEY: &str = "ome_xml";

/// Size of the fixed stack header, up to and including the next stack offset
pub const STACK_HEADER_SIZE: u64 = 16 + 4 + 4
    + (MAX_DIMENSIONS as u64) * (4 + 8 + 8)
    + 4 * 5
    + 8 * 3;

/// Number of exponent fractions in an SI unit record
pub const SI_FRACTION_COUNT: usize = 9;

/// One SI unit record: 9 (numerator, denominator) i32 pairs and an f64 scale factor
pub const SI_UNIT_SIZE: u64 = (SI_FRACTION_COUNT as u64) * 8 + 8;

// Cumulative fixed footer sizes, per tier
pub const V1_FOOTER_LENGTH: u64 = 124;
pub const V1A_FOOTER_LENGTH: u64 = 128;
pub const V2_FOOTER_LENGTH: u64 = 1408;
pub const V3_FOOTER_LENGTH: u64 = 1424;
pub const V4_FOOTER_LENGTH: u64 = 1432;
pub const V5_FOOTER_LENGTH: u64 = 1444;
pub const V5A_FOOTER_LENGTH: u64 = 1452;
pub const V6_FOOTER_LENGTH: u64 = 1468;
pub const V7_FOOTER_LENGTH: u64 = 1528;

/// Newest stack version whose footer layout is known
pub const LATEST_STACK_VERSION: u32 = 7;

/// Expected fixed footer size for a declared stack version
///
/// Version 1 and 5 stacks are written with their "A" revisions. Versions newer
/// than the latest known one are read up to the latest known tier.
pub fn footer_size_for_version(version: u32) -> u64 {
    match version {
        0 => 0,
        1 => V1A_FOOTER_LENGTH,
        2 => V2_FOOTER_LENGTH,
        3 => V3_FOOTER_LENGTH,
        4 => V4_FOOTER_LENGTH,
        5 => V5A_FOOTER_LENGTH,
        6 => V6_FOOTER_LENGTH,
        _ => V7_FOOTER_LENGTH,
    }
}
