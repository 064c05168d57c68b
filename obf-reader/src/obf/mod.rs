//! OBF/MSR container scanner
//!
//! An OBF file is a file header followed by a singly-linked chain of stack
//! records. Each stack holds a fixed header, its (possibly compressed) pixel
//! data, a version-gated footer and a variable-length metadata block. Stacks
//! are linked by absolute offsets and need not be stored in file order.

use std::collections::HashSet;

pub mod constants;
pub mod data_type;
pub mod footer;
pub mod header;
pub mod io;
pub mod stack;

pub use data_type::DataType;
pub use io::ByteSource;

use crate::config::ScanConfig;
use crate::types::{
    EmbeddedMetadata, FileHeader, ScanError, ScanFailure, StackHeader, StackMetadata,
};

/// Everything a scan discovers about a file
#[derive(Debug)]
pub struct ObfContents {
    pub header: FileHeader,
    /// File-level metadata block, if the header points to one
    pub metadata: Option<EmbeddedMetadata>,
    /// Stacks in link order
    pub stacks: Vec<StackMetadata>,
    /// Stacks that were skipped because their footer or trailing metadata ended early
    pub skipped: Vec<SkippedStack>,
}

/// A stack left out of a scan, and why
#[derive(Debug)]
pub struct SkippedStack {
    pub position: u64,
    pub error: ScanError,
}

/// Scan the file header, the embedded metadata and every stack in the chain
///
/// Header failures return no stacks. A corrupt stack or an unsupported data type
/// stops the walk; the failure carries the stacks parsed up to that point.
pub fn scan<R: ByteSource + ?Sized>(source: &mut R, config: &ScanConfig) -> Result<ObfContents, ScanFailure> {
    let file_header = header::read_file_header(source)?;
    let metadata = header::read_embedded_metadata(source, &file_header, config)?;

    let mut stacks: Vec<StackMetadata> = Vec::new();
    let mut skipped = Vec::new();
    let mut visited = HashSet::new();
    let mut next_stack_pos = file_header.first_stack_pos;

    while next_stack_pos != 0 {
        if !config.should_scan_more(stacks.len()) {
            log::info!(
                "Stack limit of {} reached, not following the chain further",
                stacks.len()
            );
            break;
        }

        let position = next_stack_pos;
        if !visited.insert(position) {
            return Err(ScanFailure::with_stacks(
                ScanError::CorruptStack {
                    position,
                    reason: "stack chain loops back to an earlier stack".to_string(),
                },
                stacks,
            ));
        }

        let stack_header = match stack::read_stack_header(source, position) {
            Ok(stack_header) => stack_header,
            Err(e) => return Err(ScanFailure::with_stacks(e, stacks)),
        };
        next_stack_pos = stack_header.next_stack_pos;

        match read_stack_tail(source, stack_header) {
            Ok(stack) => stacks.push(stack),
            Err(e @ ScanError::TruncatedStack { .. }) if config.skip_truncated_stacks => {
                log::warn!("Skipping stack: {}", e);
                skipped.push(SkippedStack { position, error: e });
            }
            Err(e) => return Err(ScanFailure::with_stacks(e, stacks)),
        }
    }

    log::info!(
        "Scanned {} stacks ({} skipped)",
        stacks.len(),
        skipped.len()
    );

    Ok(ObfContents {
        header: file_header,
        metadata,
        stacks,
        skipped,
    })
}

/// Footer and trailing metadata, assembled with the header into the final record
fn read_stack_tail<R: ByteSource + ?Sized>(
    source: &mut R,
    stack_header: StackHeader,
) -> Result<StackMetadata, ScanError> {
    let stack_footer = footer::read_footer(source, &stack_header)?;
    let trailing = footer::read_trailing_metadata(source, &stack_header, &stack_footer)?;
    Ok(StackMetadata::assemble(stack_header, stack_footer, trailing))
}
