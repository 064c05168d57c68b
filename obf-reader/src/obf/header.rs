//! OBF file header and embedded file metadata

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, SeekFrom};

use super::constants::{FILE_MAGIC, MIN_FILE_VERSION, OME_XML_KEY};
use super::io::{read_string, ByteSource};
use crate::config::ScanConfig;
use crate::types::{EmbeddedMetadata, FileHeader, Result, ScanError};
use crate::xml::XmlElement;

/// Read and validate the file header at the start of the source
///
/// Stops right after the magic signature if it does not match.
pub fn read_file_header<R: ByteSource + ?Sized>(source: &mut R) -> Result<FileHeader> {
    source.seek(SeekFrom::Start(0))?;

    let mut magic = [0u8; 10];
    source.read_exact(&mut magic).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            ScanError::InvalidFormat("file is shorter than the OBF signature".to_string())
        }
        _ => ScanError::IoError(e),
    })?;
    if &magic != FILE_MAGIC {
        return Err(ScanError::InvalidFormat(format!(
            "unexpected file signature {:?}",
            String::from_utf8_lossy(&magic)
        )));
    }

    let format_version = source.read_u32::<LittleEndian>().map_err(header_eof)?;
    if format_version < MIN_FILE_VERSION {
        return Err(ScanError::UnsupportedVersion(format_version));
    }

    let first_stack_pos = source.read_u64::<LittleEndian>().map_err(header_eof)?;
    let description = read_string(source).map_err(header_eof)?;
    let meta_data_position = source.read_u64::<LittleEndian>().map_err(header_eof)?;

    log::debug!(
        "OBF file header: version={}, first stack at {}, metadata at {}",
        format_version,
        first_stack_pos,
        meta_data_position
    );

    Ok(FileHeader {
        format_version,
        first_stack_pos,
        description,
        meta_data_position,
    })
}

fn header_eof(e: io::Error) -> ScanError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            ScanError::InvalidFormat("file header is truncated".to_string())
        }
        _ => ScanError::IoError(e),
    }
}

/// Read the embedded metadata block, if the header points to one
///
/// The block is a run of length-prefixed strings ended by an empty one. A damaged
/// block never fails the scan: whatever strings could be read are kept verbatim.
/// The read position of `source` is restored afterwards.
pub fn read_embedded_metadata<R: ByteSource + ?Sized>(
    source: &mut R,
    header: &FileHeader,
    config: &ScanConfig,
) -> Result<Option<EmbeddedMetadata>> {
    if header.meta_data_position == 0 {
        return Ok(None);
    }

    let resume_at = source.stream_position()?;
    source.seek(SeekFrom::Start(header.meta_data_position))?;

    let mut strings = Vec::new();
    loop {
        match read_string(source) {
            Ok(s) if s.is_empty() => break,
            Ok(s) => strings.push(s),
            Err(e) => {
                log::warn!(
                    "Embedded metadata at offset {} is damaged ({}); keeping {} strings",
                    header.meta_data_position,
                    e,
                    strings.len()
                );
                break;
            }
        }
    }

    source.seek(SeekFrom::Start(resume_at))?;

    Ok(Some(classify_metadata(strings, config)))
}

fn classify_metadata(strings: Vec<String>, config: &ScanConfig) -> EmbeddedMetadata {
    if !config.parse_ome_xml || strings.len() != 2 || strings[0] != OME_XML_KEY {
        return EmbeddedMetadata::Unparsed(strings);
    }

    match XmlElement::parse(&strings[1]) {
        Ok(tree) => {
            log::debug!("Parsed OME-XML metadata (root <{}>)", tree.name);
            EmbeddedMetadata::OmeXml(tree)
        }
        Err(e) => {
            log::warn!("Failed to parse OME-XML metadata: {}", e);
            EmbeddedMetadata::Unparsed(strings)
        }
    }
}
