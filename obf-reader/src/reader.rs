//! File-backed reader API
//!
//! `ObfReader` is the entry point for working with OBF files on disk. It scans
//! the file once when opened and keeps only the metadata; pixel data is read
//! on demand through a fresh file handle, so a reader can be shared across
//! threads and stacks decoded concurrently.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::config::ScanConfig;
use crate::export::{self, ExportError};
use crate::obf::{self, ObfContents, SkippedStack};
use crate::pixels::{self, StackImage};
use crate::summary::{self, ImageGroup, ImageSummary, SummaryError};
use crate::types::{
    DecodeError, EmbeddedMetadata, FileHeader, ScanError, ScanFailure, StackMetadata,
};

/// Scanned OBF file
#[derive(Debug)]
pub struct ObfReader {
    path: PathBuf,
    contents: ObfContents,
}

impl ObfReader {
    /// Open and scan an OBF file with the default configuration
    ///
    /// # Example
    /// ```no_run
    /// use obf_reader::ObfReader;
    ///
    /// let reader = ObfReader::open("sample.msr").unwrap();
    /// for stack in reader.stacks() {
    ///     println!("{}: {:?}", stack.name(), stack.num_pixels());
    /// }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScanFailure> {
        Self::open_with_config(path, &ScanConfig::default())
    }

    /// Open and scan an OBF file
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &ScanConfig) -> Result<Self, ScanFailure> {
        let path = path.as_ref().to_path_buf();
        log::info!("Opening OBF file: {:?}", path);

        let file = File::open(&path).map_err(ScanError::from)?;
        let mut source = BufReader::new(file);
        let contents = obf::scan(&mut source, config)?;

        log::info!(
            "Loaded {:?}: file version {}, {} stacks",
            path,
            contents.header.format_version,
            contents.stacks.len()
        );

        Ok(Self { path, contents })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.contents.header
    }

    pub fn metadata(&self) -> Option<&EmbeddedMetadata> {
        self.contents.metadata.as_ref()
    }

    /// Stacks in link order
    pub fn stacks(&self) -> &[StackMetadata] {
        &self.contents.stacks
    }

    pub fn stack(&self, index: usize) -> Option<&StackMetadata> {
        self.contents.stacks.get(index)
    }

    pub fn num_stacks(&self) -> usize {
        self.contents.stacks.len()
    }

    /// Stacks left out of the scan because their metadata ended early
    pub fn skipped(&self) -> &[SkippedStack] {
        &self.contents.skipped
    }

    /// Decode the pixel data of the stack at `index`
    pub fn read_stack_data(&self, index: usize) -> Result<StackImage, DecodeError> {
        let stack = self.stack(index).ok_or(DecodeError::IndexOutOfRange {
            index,
            count: self.num_stacks(),
        })?;
        let mut source = BufReader::new(File::open(&self.path)?);
        pixels::read_stack_data(stack, &mut source)
    }

    /// Compact OME-XML document with an XML declaration
    pub fn ome_xml(&self) -> Option<String> {
        export::ome_xml_string(self.metadata())
    }

    pub fn export_ome_xml<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        export::export_ome_xml(self.metadata(), path.as_ref())
    }

    /// Write the tag dictionary of the stack at `index`; see [`export::export_tag_dictionary`]
    pub fn export_tag_dictionary<P: AsRef<Path>>(
        &self,
        index: usize,
        path: P,
    ) -> Result<Vec<PathBuf>, ExportError> {
        let stack = self.stack(index).ok_or(ExportError::IndexOutOfRange {
            index,
            count: self.num_stacks(),
        })?;
        export::export_tag_dictionary(stack, path.as_ref())
    }

    /// Summaries of every 2D image stack, in link order
    pub fn image_summaries(&self) -> Vec<ImageSummary> {
        summary::image_summaries(self.stacks())
    }

    /// Summaries of every 2D image stack, in natural order of their descriptions
    pub fn sorted_image_summaries(&self) -> Vec<ImageSummary> {
        summary::sorted_image_summaries(self.stacks())
    }

    /// 2D image stacks grouped by acquisition; see [`summary::image_groups`]
    pub fn image_groups(&self) -> Result<Vec<ImageGroup>, SummaryError> {
        summary::image_groups(self.stacks())
    }

    pub fn into_contents(self) -> ObfContents {
        self.contents
    }
}
