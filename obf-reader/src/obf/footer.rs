//! Versioned stack footer and trailing metadata
//!
//! The footer grew over seven stack format versions. Each version appends a
//! tier of fixed fields to the previous one:
//!
//! | Tier | Fields | Cumulative size |
//! |------|--------|-----------------|
//! | 1/1A | footer size, column position flags, column label flags, obsolete metadata length | 128 |
//! | 2    | SI unit of the value, SI units of 15 axes | 1408 |
//! | 3    | flush point count, flush block size | 1424 |
//! | 4    | tag dictionary length | 1432 |
//! | 5/5A | stack end on disk, min format version, stack end used on disk | 1452 |
//! | 6    | samples written, chunk position count | 1468 |
//! | 7    | nothing new | 1528 |
//!
//! Tiers are read in order while the bytes consumed stay below the footer size
//! expected for the stack's declared version. Variable-length data (labels,
//! steps, flush points, tag dictionary, chunk table) follows at
//! `footer start + footer size`.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read, SeekFrom};

use super::constants::{
    footer_size_for_version, MAX_DIMENSIONS, SI_FRACTION_COUNT, V1A_FOOTER_LENGTH,
    V2_FOOTER_LENGTH, V3_FOOTER_LENGTH, V4_FOOTER_LENGTH, V5A_FOOTER_LENGTH, V6_FOOTER_LENGTH,
};
use super::io::{
    leading, read_f64_vec, read_string, read_u32_slots, read_u64_vec, truncated, ByteSource,
    CountingReader,
};
use crate::types::{
    ChunkPositions, FlushInfo, FooterLayout, Result, SampleInfo, ScanError, SiFraction, SiUnit,
    SiUnits, StackExtent, StackFooter, StackHeader, TagEntry, TagInfo, TrailingMetadata,
};

/// Read the fixed, version-gated part of the footer
pub fn read_footer<R: ByteSource + ?Sized>(source: &mut R, header: &StackHeader) -> Result<StackFooter> {
    let mut footer = StackFooter::default();

    // Version 0 stacks have no footer at all
    if header.format_version == 0 {
        return Ok(footer);
    }

    let expected = footer_size_for_version(header.format_version);
    source.seek(SeekFrom::Start(header.footer_start_position()))?;

    let mut reader = CountingReader::new(source);
    read_tiers(&mut reader, header.rank as usize, expected, &mut footer)
        .map_err(truncated(header.position, "footer"))?;

    log::debug!(
        "Stack at {}: footer version {} read up to tier {} ({} of {} bytes)",
        header.position,
        header.format_version,
        footer.tier,
        reader.consumed(),
        expected
    );

    Ok(footer)
}

fn read_tiers<R: Read + ?Sized>(
    reader: &mut CountingReader<'_, R>,
    rank: usize,
    expected: u64,
    footer: &mut StackFooter,
) -> io::Result<()> {
    // Tier 1/1A
    let footer_size = reader.read_u32::<LittleEndian>()?;
    let col_positions = read_u32_slots(reader)?;
    let col_labels = read_u32_slots(reader)?;
    let obsolete_metadata_length = reader.read_u32::<LittleEndian>()?;
    assert_eq!(reader.consumed(), V1A_FOOTER_LENGTH, "footer tier 1A length");

    footer.layout = Some(FooterLayout {
        footer_size,
        has_col_positions: leading(&col_positions, rank).iter().map(|&f| f != 0).collect(),
        has_col_labels: leading(&col_labels, rank).iter().map(|&f| f != 0).collect(),
        obsolete_metadata_length,
    });
    footer.tier = 1;
    if reader.consumed() >= expected {
        return Ok(());
    }

    // Tier 2: every axis slot is stored, whatever the rank
    let value = read_si_unit(reader)?;
    let mut dimensions = Vec::with_capacity(MAX_DIMENSIONS);
    for _ in 0..MAX_DIMENSIONS {
        dimensions.push(read_si_unit(reader)?);
    }
    dimensions.truncate(rank);
    assert_eq!(reader.consumed(), V2_FOOTER_LENGTH, "footer tier 2 length");

    footer.si_units = Some(SiUnits { value, dimensions });
    footer.tier = 2;
    if reader.consumed() >= expected {
        return Ok(());
    }

    // Tier 3
    let num_flush_points = reader.read_u64::<LittleEndian>()?;
    let flush_block_size = reader.read_u64::<LittleEndian>()?;
    assert_eq!(reader.consumed(), V3_FOOTER_LENGTH, "footer tier 3 length");

    footer.flush = Some(FlushInfo {
        num_flush_points,
        flush_block_size,
    });
    footer.tier = 3;
    if reader.consumed() >= expected {
        return Ok(());
    }

    // Tier 4
    let tag_dictionary_length = reader.read_u64::<LittleEndian>()?;
    assert_eq!(reader.consumed(), V4_FOOTER_LENGTH, "footer tier 4 length");

    footer.tags = Some(TagInfo {
        tag_dictionary_length,
    });
    footer.tier = 4;
    if reader.consumed() >= expected {
        return Ok(());
    }

    // Tier 5/5A
    let stack_end_disk = reader.read_u64::<LittleEndian>()?;
    let min_format_version = reader.read_u32::<LittleEndian>()?;
    let stack_end_used_disk = reader.read_u64::<LittleEndian>()?;
    assert_eq!(reader.consumed(), V5A_FOOTER_LENGTH, "footer tier 5A length");

    footer.extent = Some(StackExtent {
        stack_end_disk,
        min_format_version,
        stack_end_used_disk,
    });
    footer.tier = 5;
    if reader.consumed() >= expected {
        return Ok(());
    }

    // Tier 6
    let samples_written = reader.read_u64::<LittleEndian>()?;
    let num_chunk_positions = reader.read_u64::<LittleEndian>()?;
    assert_eq!(reader.consumed(), V6_FOOTER_LENGTH, "footer tier 6 length");

    footer.samples = Some(SampleInfo {
        samples_written,
        num_chunk_positions,
    });
    footer.tier = 6;
    if reader.consumed() >= expected {
        return Ok(());
    }

    // Tier 7 adds no documented fields; the rest of the footer is skipped via footer_size
    footer.tier = 7;
    Ok(())
}

fn read_si_unit<R: Read + ?Sized>(reader: &mut R) -> io::Result<SiUnit> {
    let mut exponents = [SiFraction::default(); SI_FRACTION_COUNT];
    for exponent in exponents.iter_mut() {
        exponent.numerator = reader.read_i32::<LittleEndian>()?;
        exponent.denominator = reader.read_i32::<LittleEndian>()?;
    }
    let scale_factor = reader.read_f64::<LittleEndian>()?;
    Ok(SiUnit {
        exponents,
        scale_factor,
    })
}

/// Read the variable-length metadata that follows the fixed footer
///
/// Each section is read only if the tier that declares it was present.
pub fn read_trailing_metadata<R: ByteSource + ?Sized>(
    source: &mut R,
    header: &StackHeader,
    footer: &StackFooter,
) -> Result<TrailingMetadata> {
    let mut trailing = TrailingMetadata::default();

    let Some(layout) = &footer.layout else {
        return Ok(trailing);
    };

    let position = header.position;
    let rank = header.rank as usize;
    let trailing_start = header
        .footer_start_position()
        .checked_add(layout.footer_size as u64)
        .ok_or_else(|| ScanError::CorruptStack {
            position,
            reason: format!(
                "footer size {} overflows the file offset range",
                layout.footer_size
            ),
        })?;
    source.seek(SeekFrom::Start(trailing_start))?;

    // One label per dimension
    for _ in 0..rank {
        let label = read_string(source).map_err(truncated(position, "labels"))?;
        trailing.labels.push(label);
    }

    // Pixel positions, for the dimensions that declare them
    for dim in 0..rank {
        let steps = if layout.has_col_positions[dim] {
            read_f64_vec(source, header.num_pixels[dim] as u64)
                .map_err(truncated(position, "steps"))?
        } else {
            Vec::new()
        };
        trailing.steps.push(steps);
    }

    // The obsolete metadata blob is superseded by the tag dictionary
    if layout.obsolete_metadata_length > 0 {
        source.seek(SeekFrom::Current(layout.obsolete_metadata_length as i64))?;
    }

    if let Some(flush) = footer.flush {
        if flush.num_flush_points > 0 {
            trailing.flush_points = read_u64_vec(source, flush.num_flush_points)
                .map_err(truncated(position, "flush points"))?;
        }
    }

    if footer.tags.is_some() {
        trailing.tag_dictionary =
            read_tag_dictionary(source).map_err(truncated(position, "tag dictionary"))?;
    }

    if let Some(samples) = footer.samples {
        if samples.num_chunk_positions > 0 {
            trailing.chunk_positions = Some(
                read_chunk_positions(source, samples.num_chunk_positions)
                    .map_err(truncated(position, "chunk positions"))?,
            );
        }
    }

    log::trace!(
        "Stack at {}: {} labels, {} tags, {} flush points",
        position,
        trailing.labels.len(),
        trailing.tag_dictionary.len(),
        trailing.flush_points.len()
    );

    Ok(trailing)
}

/// (key, value) string pairs, ended by an empty key
fn read_tag_dictionary<R: Read + ?Sized>(source: &mut R) -> io::Result<Vec<TagEntry>> {
    let mut entries = Vec::new();
    loop {
        let key = read_string(source)?;
        if key.is_empty() {
            return Ok(entries);
        }
        let value = read_string(source)?;
        entries.push(TagEntry { key, value });
    }
}

/// Interleaved (logical, file) u64 pairs, each array seeded with 0
fn read_chunk_positions<R: Read + ?Sized>(source: &mut R, count: u64) -> io::Result<ChunkPositions> {
    let pairs = read_u64_vec(source, count.saturating_mul(2))?;

    let mut logical = vec![0];
    let mut file = vec![0];
    for pair in pairs.chunks_exact(2) {
        logical.push(pair[0]);
        file.push(pair[1]);
    }

    Ok(ChunkPositions { logical, file })
}
