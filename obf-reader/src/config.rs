//! Scanner configuration types
//!
//! This module defines the small set of knobs the scanner understands. The
//! reader is stateless; the configuration only changes how tolerant a scan is
//! and how much of the optional metadata gets interpreted.

use serde::{Deserialize, Serialize};

/// Configuration for scanning an OBF file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Parse the embedded `ome_xml` metadata entry into an XML tree
    #[serde(default = "default_true")]
    pub parse_ome_xml: bool,

    /// Optional: stop the stack walk after this many stacks
    #[serde(default)]
    pub max_stacks: Option<usize>,

    /// Skip stacks whose footer or trailing metadata ends early instead of failing the scan
    #[serde(default = "default_true")]
    pub skip_truncated_stacks: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parse_ome_xml: true,
            max_stacks: None,
            skip_truncated_stacks: true,
        }
    }
}

impl ScanConfig {
    /// Create a new scan configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable OME-XML parsing
    pub fn with_ome_xml_parsing(mut self, enabled: bool) -> Self {
        self.parse_ome_xml = enabled;
        self
    }

    /// Builder method: limit the number of stacks to scan
    pub fn with_max_stacks(mut self, max_stacks: usize) -> Self {
        self.max_stacks = Some(max_stacks);
        self
    }

    /// Builder method: choose whether truncated stacks are skipped or fatal
    pub fn with_truncated_stack_skipping(mut self, enabled: bool) -> Self {
        self.skip_truncated_stacks = enabled;
        self
    }

    /// Check if another stack should be scanned after `scanned` stacks
    pub fn should_scan_more(&self, scanned: usize) -> bool {
        match self.max_stacks {
            Some(max) => scanned < max,
            None => true,
        }
    }
}
