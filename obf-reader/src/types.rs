//! Core types for the OBF container reader
//!
//! This module defines the records produced by a scan (file header, embedded
//! metadata, per-stack metadata) and the error types of the scanner and the
//! pixel decoder. Every record is read-only once the scan has produced it.

use crate::obf::data_type::DataType;
use crate::xml::XmlElement;
use serde::Serialize;
use std::fmt;

/// Result type for scanner operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors that can occur while scanning the container structure
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Not a valid OBF/MSR file: {0}")]
    InvalidFormat(String),

    #[error("Unsupported OBF file version {0} (version 2 or newer is required)")]
    UnsupportedVersion(u32),

    #[error("Corrupt stack at offset {position}: {reason}")]
    CorruptStack { position: u64, reason: String },

    #[error("Stack at offset {position} is truncated while reading {section}")]
    TruncatedStack {
        position: u64,
        section: &'static str,
    },

    #[error("Unsupported data type 0x{0:08x}")]
    UnsupportedDataType(u32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A fatal scan error together with the stacks that were fully parsed before it
#[derive(Debug)]
pub struct ScanFailure {
    /// The error that stopped the scan
    pub error: ScanError,
    /// Stacks parsed before the error, in link order
    pub stacks: Vec<StackMetadata>,
}

impl ScanFailure {
    pub(crate) fn with_stacks(error: ScanError, stacks: Vec<StackMetadata>) -> Self {
        Self { error, stacks }
    }
}

impl From<ScanError> for ScanFailure {
    fn from(error: ScanError) -> Self {
        Self {
            error,
            stacks: Vec::new(),
        }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stacks.is_empty() {
            write!(f, "{}", self.error)
        } else {
            write!(f, "{} ({} stacks parsed before the error)", self.error, self.stacks.len())
        }
    }
}

impl std::error::Error for ScanFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Errors that can occur while decoding the pixel data of one stack
///
/// Decode errors are local to the stack being decoded; siblings can still be read.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Reading pixel data requires stack format version 6 or newer (found {0})")]
    UnsupportedStackVersion(u32),

    #[error("Chunked stacks are not supported ({0} chunk positions)")]
    ChunkedDataUnsupported(u64),

    #[error("Only 2D images can be decoded (stack has {0} dimensions with more than one pixel)")]
    UnsupportedDimensionality(usize),

    #[error("Unexpected pixel data length: expected {expected} bytes, found {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Image of {height}x{width} samples exceeds the addressable byte range")]
    ImageTooLarge { height: u64, width: u64 },

    #[error("Failed to decompress pixel data: {0}")]
    Decompression(String),

    #[error("Stack index {index} is out of range ({count} stacks)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// OBF file header, read once at the start of a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHeader {
    /// File format version (2 or newer)
    pub format_version: u32,
    /// Absolute offset of the first stack record (0 = no stacks)
    pub first_stack_pos: u64,
    /// Free-form file description
    pub description: String,
    /// Absolute offset of the embedded metadata block (0 = none)
    pub meta_data_position: u64,
}

/// File-level metadata block
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedMetadata {
    /// Parsed OME-XML document
    OmeXml(XmlElement),
    /// Strings that did not form a parsable `ome_xml` entry, kept verbatim
    Unparsed(Vec<String>),
}

impl EmbeddedMetadata {
    /// The OME-XML tree, if the block was parsed successfully
    pub fn ome_xml(&self) -> Option<&XmlElement> {
        match self {
            EmbeddedMetadata::OmeXml(tree) => Some(tree),
            EmbeddedMetadata::Unparsed(_) => None,
        }
    }
}

/// Exponent of one SI base unit, stored as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SiFraction {
    pub numerator: i32,
    pub denominator: i32,
}

/// Base and supplemental SI units, in on-disk exponent order
pub const SI_BASE_UNITS: [&str; 9] = ["m", "kg", "s", "A", "K", "mol", "cd", "r", "sr"];

/// Dimensions and scaling factor of a quantity
///
/// Exponents follow [`SI_BASE_UNITS`] order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiUnit {
    pub exponents: [SiFraction; 9],
    pub scale_factor: f64,
}

impl SiUnit {
    /// Symbol of the first base unit with a positive exponent, or "" if there is none
    pub fn symbol(&self) -> &'static str {
        self.exponents
            .iter()
            .position(|e| e.numerator > 0)
            .map(|i| SI_BASE_UNITS[i])
            .unwrap_or("")
    }
}

/// Fixed-layout stack header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackHeader {
    /// Absolute offset of this stack record
    pub position: u64,
    /// Stack format version
    pub format_version: u32,
    /// Number of valid dimensions
    pub rank: u32,
    /// Pixel count per dimension (`rank` entries)
    pub num_pixels: Vec<u32>,
    /// Physical length per dimension (`rank` entries)
    pub physical_lengths: Vec<f64>,
    /// Physical offset per dimension (`rank` entries)
    pub physical_offsets: Vec<f64>,
    /// Numeric encoding of the samples
    pub data_type: DataType,
    /// 0 = none, anything else = zlib
    pub compression_type: u32,
    pub compression_level: u32,
    pub reserved: u64,
    /// Length of the pixel data on disk (after compression)
    pub data_len_disk: u64,
    /// Absolute offset of the next stack (0 = last stack)
    pub next_stack_pos: u64,
    pub name: String,
    pub description: String,
    /// Absolute offset where the pixel data begins
    pub data_start_position: u64,
}

impl StackHeader {
    /// Absolute offset of the footer (right after the pixel data)
    pub fn footer_start_position(&self) -> u64 {
        self.data_start_position.saturating_add(self.data_len_disk)
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.data_type.bytes_per_sample()
    }
}

/// Footer tier 1/1A: footer size and per-dimension flags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FooterLayout {
    /// Size of the fixed footer; the variable metadata starts right after it
    pub footer_size: u32,
    /// True for dimensions with a step array after the footer (`rank` entries)
    pub has_col_positions: Vec<bool>,
    /// True for dimensions with a label after the footer (`rank` entries)
    pub has_col_labels: Vec<bool>,
    /// Length of the legacy metadata blob (superseded by the tag dictionary)
    pub obsolete_metadata_length: u32,
}

/// Footer tier 2: SI units of the value and of each axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiUnits {
    pub value: SiUnit,
    /// One entry per dimension (`rank` entries)
    pub dimensions: Vec<SiUnit>,
}

/// Footer tier 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushInfo {
    pub num_flush_points: u64,
    pub flush_block_size: u64,
}

/// Footer tier 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TagInfo {
    pub tag_dictionary_length: u64,
}

/// Footer tier 5/5A
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StackExtent {
    /// Where all the stack metadata ends on disk
    pub stack_end_disk: u64,
    /// Oldest format version able to read this stack
    pub min_format_version: u32,
    /// Where the used part of the stack ends on disk
    pub stack_end_used_disk: u64,
}

/// Footer tier 6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleInfo {
    /// Length of the written sample run (0 = the full declared size was written)
    pub samples_written: u64,
    pub num_chunk_positions: u64,
}

/// Version-gated stack footer
///
/// A tier that the stack's declared version does not reach is `None`. Tiers are
/// cumulative: if a tier is present, every lower tier is present too.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StackFooter {
    /// Highest tier read from disk (0 = no footer)
    pub tier: u32,
    pub layout: Option<FooterLayout>,
    pub si_units: Option<SiUnits>,
    pub flush: Option<FlushInfo>,
    pub tags: Option<TagInfo>,
    pub extent: Option<StackExtent>,
    pub samples: Option<SampleInfo>,
}

/// One tag dictionary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEntry {
    pub key: String,
    pub value: String,
}

/// Chunk position table; both arrays start with a synthetic `0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPositions {
    pub logical: Vec<u64>,
    pub file: Vec<u64>,
}

/// Variable-length metadata stored after the fixed footer
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TrailingMetadata {
    /// One label per dimension
    pub labels: Vec<String>,
    /// Per-dimension pixel positions; empty for dimensions without column positions
    pub steps: Vec<Vec<f64>>,
    pub flush_points: Vec<u64>,
    /// Tag dictionary entries in on-disk order
    pub tag_dictionary: Vec<TagEntry>,
    pub chunk_positions: Option<ChunkPositions>,
}

/// Complete metadata of one stack
///
/// Only the scanner assembles these, from a fully read header, footer and
/// trailing block; callers never observe a partially parsed stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackMetadata {
    header: StackHeader,
    footer: StackFooter,
    trailing: TrailingMetadata,
}

impl StackMetadata {
    pub(crate) fn assemble(
        header: StackHeader,
        footer: StackFooter,
        trailing: TrailingMetadata,
    ) -> Self {
        Self {
            header,
            footer,
            trailing,
        }
    }

    pub fn header(&self) -> &StackHeader {
        &self.header
    }

    pub fn footer(&self) -> &StackFooter {
        &self.footer
    }

    pub fn trailing(&self) -> &TrailingMetadata {
        &self.trailing
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn description(&self) -> &str {
        &self.header.description
    }

    pub fn format_version(&self) -> u32 {
        self.header.format_version
    }

    pub fn rank(&self) -> usize {
        self.header.rank as usize
    }

    pub fn num_pixels(&self) -> &[u32] {
        &self.header.num_pixels
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.header.bytes_per_sample()
    }

    pub fn next_stack_pos(&self) -> u64 {
        self.header.next_stack_pos
    }

    pub fn si_units(&self) -> Option<&SiUnits> {
        self.footer.si_units.as_ref()
    }

    pub fn num_flush_points(&self) -> Option<u64> {
        self.footer.flush.map(|f| f.num_flush_points)
    }

    pub fn min_format_version(&self) -> Option<u32> {
        self.footer.extent.map(|e| e.min_format_version)
    }

    pub fn samples_written(&self) -> Option<u64> {
        self.footer.samples.map(|s| s.samples_written)
    }

    pub fn num_chunk_positions(&self) -> Option<u64> {
        self.footer.samples.map(|s| s.num_chunk_positions)
    }

    pub fn labels(&self) -> &[String] {
        &self.trailing.labels
    }

    pub fn tag_dictionary(&self) -> &[TagEntry] {
        &self.trailing.tag_dictionary
    }

    /// Look up a tag dictionary value by key
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.trailing
            .tag_dictionary
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }

    /// Number of dimensions with more than one pixel
    pub fn num_dims(&self) -> usize {
        self.header.num_pixels.iter().filter(|&&n| n > 1).count()
    }

    /// True for flat 2D images (exactly two dimensions with more than one pixel)
    pub fn is_image(&self) -> bool {
        self.num_dims() == 2
    }

    /// Per-axis scale factors from the SI units (1.0 where none are recorded)
    fn scale_factors(&self) -> Vec<f64> {
        (0..self.rank())
            .map(|dim| {
                self.si_units()
                    .and_then(|units| units.dimensions.get(dim))
                    .map(|unit| unit.scale_factor)
                    .unwrap_or(1.0)
            })
            .collect()
    }

    fn scaled(&self, values: &[f64], scaled: bool) -> Vec<f64> {
        if !scaled {
            return values.to_vec();
        }
        values
            .iter()
            .zip(self.scale_factors())
            .map(|(value, factor)| value * factor)
            .collect()
    }

    /// Physical length per dimension, optionally scaled by the axis SI factors
    pub fn physical_sizes(&self, scaled: bool) -> Vec<f64> {
        self.scaled(&self.header.physical_lengths, scaled)
    }

    /// Physical offset per dimension, optionally scaled by the axis SI factors
    pub fn offsets(&self, scaled: bool) -> Vec<f64> {
        self.scaled(&self.header.physical_offsets, scaled)
    }

    /// Physical size of one pixel per dimension
    pub fn pixel_sizes(&self, scaled: bool) -> Vec<f64> {
        self.physical_sizes(scaled)
            .into_iter()
            .zip(&self.header.num_pixels)
            .map(|(length, &count)| length / count as f64)
            .collect()
    }

    /// SI unit symbol per dimension, or None if the footer carries no SI units
    pub fn units(&self) -> Option<Vec<&'static str>> {
        let units = self.si_units()?;
        Some(units.dimensions.iter().map(SiUnit::symbol).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(exponent_index: Option<usize>, scale_factor: f64) -> SiUnit {
        let mut exponents = [SiFraction::default(); 9];
        if let Some(i) = exponent_index {
            exponents[i] = SiFraction {
                numerator: 1,
                denominator: 1,
            };
        }
        SiUnit {
            exponents,
            scale_factor,
        }
    }

    fn image_stack(si_units: Option<SiUnits>) -> StackMetadata {
        let header = StackHeader {
            position: 64,
            format_version: 6,
            rank: 2,
            num_pixels: vec![4, 2],
            physical_lengths: vec![2.0, 1.0],
            physical_offsets: vec![0.5, -0.5],
            data_type: DataType::U16,
            compression_type: 0,
            compression_level: 0,
            reserved: 0,
            data_len_disk: 16,
            next_stack_pos: 0,
            name: "ExpControl Ch1 {1}".to_string(),
            description: String::new(),
            data_start_position: 500,
        };
        let footer = StackFooter {
            tier: 2,
            si_units,
            ..StackFooter::default()
        };
        StackMetadata::assemble(header, footer, TrailingMetadata::default())
    }

    #[test]
    fn test_unit_symbol() {
        assert_eq!(unit(Some(0), 1.0).symbol(), "m");
        assert_eq!(unit(Some(2), 1.0).symbol(), "s");
        assert_eq!(unit(Some(8), 1.0).symbol(), "sr");
        assert_eq!(unit(None, 1.0).symbol(), "");
    }

    #[test]
    fn test_geometry_scaled_by_si_factors() {
        let stack = image_stack(Some(SiUnits {
            value: unit(None, 1.0),
            dimensions: vec![unit(Some(0), 1e-6), unit(Some(0), 2.0)],
        }));

        assert_eq!(stack.physical_sizes(false), vec![2.0, 1.0]);
        assert_eq!(stack.physical_sizes(true), vec![2e-6, 2.0]);
        assert_eq!(stack.offsets(true), vec![0.5e-6, -1.0]);
        assert_eq!(stack.pixel_sizes(false), vec![0.5, 0.5]);
        assert_eq!(stack.units(), Some(vec!["m", "m"]));
    }

    #[test]
    fn test_geometry_without_si_units() {
        let stack = image_stack(None);

        assert_eq!(stack.physical_sizes(true), vec![2.0, 1.0]);
        assert_eq!(stack.units(), None);
        assert!(stack.is_image());
        assert_eq!(stack.samples_written(), None);
        assert_eq!(stack.min_format_version(), None);
    }

    #[test]
    fn test_scan_failure_display() {
        let failure = ScanFailure::with_stacks(
            ScanError::CorruptStack {
                position: 42,
                reason: "bad magic".to_string(),
            },
            vec![image_stack(None)],
        );
        assert_eq!(
            failure.to_string(),
            "Corrupt stack at offset 42: bad magic (1 stacks parsed before the error)"
        );
    }
}
