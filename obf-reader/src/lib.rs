//! OBF Reader Library
//!
//! A stateless, read-only library for the OBF/MSR microscope image container.
//!
//! # Architecture
//!
//! The library is split in two passes:
//! - The scanner validates the file header, reads the embedded (OME-XML)
//!   metadata and walks the linked chain of image stacks, collecting each
//!   stack's header, version-gated footer and trailing metadata
//! - The pixel decoder reads one stack's (optionally zlib-compressed) sample
//!   run and returns it as a typed 2D grid
//!
//! Both passes work on any `Read + Seek` source. [`ObfReader`] wraps them for
//! files on disk and adds metadata export and image listings.
//!
//! The library does NOT:
//! - Decode chunked stacks or images with more than two dimensions
//! - Flip, rescale or otherwise post-process decoded grids
//! - Write OBF files
//!
//! # Example Usage
//!
//! ```no_run
//! use obf_reader::{ObfReader, ScanConfig, StackImage};
//!
//! let config = ScanConfig::new().with_ome_xml_parsing(true);
//! let reader = ObfReader::open_with_config("sample.msr", &config).unwrap();
//!
//! for (index, stack) in reader.stacks().iter().enumerate() {
//!     println!("{}: {} {:?}", index, stack.name(), stack.num_pixels());
//!
//!     if stack.is_image() {
//!         match reader.read_stack_data(index) {
//!             Ok(StackImage::U16(grid)) => println!("  {:?} u16 samples", grid.shape()),
//!             Ok(image) => println!("  {:?} {}", image.shape(), image.data_type()),
//!             Err(e) => eprintln!("  Decode error: {}", e),
//!         }
//!     }
//! }
//! ```

// Public modules
pub mod config;
pub mod export;
pub mod obf;
pub mod pixels;
pub mod reader;
pub mod summary;
pub mod types;
pub mod xml;

// Re-export main types for convenience
pub use config::ScanConfig;
pub use export::{ExportError, TagValue};
pub use obf::{scan, ByteSource, DataType, ObfContents, SkippedStack};
pub use pixels::{read_stack_data, Grid2D, StackImage};
pub use reader::ObfReader;
pub use summary::{ImageGroup, ImageSummary, SummaryError};
pub use types::{
    DecodeError, EmbeddedMetadata, FileHeader, Result, ScanError, ScanFailure, StackFooter,
    StackHeader, StackMetadata, TagEntry, TrailingMetadata,
};
pub use xml::{XmlElement, XmlError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_library_basics() {
        // Smoke test: an empty stream is not an OBF file
        let result = scan(&mut Cursor::new(Vec::new()), &ScanConfig::default());
        assert!(matches!(
            result,
            Err(ScanFailure {
                error: ScanError::InvalidFormat(_),
                ..
            })
        ));
        assert!(!VERSION.is_empty());
    }
}
