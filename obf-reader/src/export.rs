//! Metadata export
//!
//! Writes the file-level OME-XML document and the per-stack tag dictionaries
//! to disk. Tag values are stored as raw strings by the scanner; they are only
//! classified here, when a caller asks for them.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{EmbeddedMetadata, StackMetadata};
use crate::xml::XmlElement;

/// Errors that can occur while exporting metadata
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("File has no OME-XML metadata to export")]
    NoOmeXml,

    #[error("Stack index {index} is out of range ({count} stacks)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Failed to serialize JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A tag dictionary value, classified by content
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// The value parsed as an XML document
    Xml(XmlElement),
    /// The value parsed as a JSON object
    Json(serde_json::Value),
    /// Anything else, kept verbatim
    Text(String),
}

impl TagValue {
    /// Classify a raw tag value: XML first, then a JSON object, then plain text
    pub fn parse(raw: &str) -> Self {
        if let Ok(tree) = XmlElement::parse(raw) {
            return TagValue::Xml(tree);
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) if value.is_object() => TagValue::Json(value),
            _ => TagValue::Text(raw.to_string()),
        }
    }

    /// File extension used when exporting this value
    pub fn extension(&self) -> &'static str {
        match self {
            TagValue::Xml(_) => "xml",
            TagValue::Json(_) => "json",
            TagValue::Text(_) => "txt",
        }
    }

    /// Serialized file contents: compact XML with a declaration, JSON indented by four spaces, or the raw text
    pub fn to_file_contents(&self) -> Result<String, ExportError> {
        match self {
            TagValue::Xml(tree) => Ok(tree.to_compact_string(true)),
            TagValue::Json(value) => {
                let mut buf = Vec::new();
                let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
                let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
                value.serialize(&mut serializer)?;
                Ok(String::from_utf8_lossy(&buf).into_owned())
            }
            TagValue::Text(text) => Ok(text.clone()),
        }
    }
}

/// Compact OME-XML of the file, with an XML declaration, if the metadata block held one
pub fn ome_xml_string(metadata: Option<&EmbeddedMetadata>) -> Option<String> {
    metadata
        .and_then(EmbeddedMetadata::ome_xml)
        .map(|tree| tree.to_compact_string(true))
}

/// Write the OME-XML document to `path`, creating parent directories as needed
pub fn export_ome_xml(metadata: Option<&EmbeddedMetadata>, path: &Path) -> Result<(), ExportError> {
    let xml = ome_xml_string(metadata).ok_or(ExportError::NoOmeXml)?;
    create_parent_dir(path)?;
    fs::write(path, xml)?;
    log::info!("Exported OME-XML metadata to {:?}", path);
    Ok(())
}

/// Write every tag dictionary entry of `stack` next to `path`
///
/// Each entry lands in `<stem>_<key>.<ext>` in the parent directory of `path`,
/// where the extension follows the classified value. Returns the written paths
/// in dictionary order.
pub fn export_tag_dictionary(stack: &StackMetadata, path: &Path) -> Result<Vec<PathBuf>, ExportError> {
    create_parent_dir(path)?;

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut written = Vec::with_capacity(stack.tag_dictionary().len());
    for entry in stack.tag_dictionary() {
        let value = TagValue::parse(&entry.value);
        let file_name = format!(
            "{}_{}.{}",
            stem,
            sanitize_key(&entry.key),
            value.extension()
        );
        let target = parent.join(file_name);
        fs::write(&target, value.to_file_contents()?)?;
        log::debug!("Exported tag '{}' to {:?}", entry.key, target);
        written.push(target);
    }

    log::info!(
        "Exported {} tag dictionary entries of stack '{}'",
        written.len(),
        stack.name()
    );
    Ok(written)
}

fn create_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

// Keys become part of a file name
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}
