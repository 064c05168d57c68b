//! Console and JSON reports

use obf_reader::{
    FileHeader, ImageGroup, ImageSummary, ObfReader, SkippedStack, StackImage, StackMetadata,
};
use serde::Serialize;
use std::path::Path;

/// JSON view of one scanned file
#[derive(Debug, Serialize)]
pub struct FileReport<'a> {
    pub path: &'a Path,
    pub header: &'a FileHeader,
    pub has_ome_xml: bool,
    pub stacks: Vec<StackReport<'a>>,
    pub skipped: Vec<SkippedReport>,
    pub images: Vec<ImageSummary>,
    pub groups: Vec<ImageGroup>,
}

#[derive(Debug, Serialize)]
pub struct StackReport<'a> {
    pub index: usize,
    #[serde(flatten)]
    pub stack: &'a StackMetadata,
}

#[derive(Debug, Serialize)]
pub struct SkippedReport {
    pub position: u64,
    pub error: String,
}

impl<'a> FileReport<'a> {
    pub fn new(reader: &'a ObfReader, selection: &[usize]) -> Self {
        Self {
            path: reader.path(),
            header: reader.header(),
            has_ome_xml: reader.ome_xml().is_some(),
            stacks: selection
                .iter()
                .filter_map(|&index| reader.stack(index).map(|stack| StackReport { index, stack }))
                .collect(),
            skipped: reader.skipped().iter().map(SkippedReport::from).collect(),
            images: reader
                .sorted_image_summaries()
                .into_iter()
                .filter(|image| selection.contains(&image.index))
                .collect(),
            groups: image_groups(reader),
        }
    }
}

impl From<&SkippedStack> for SkippedReport {
    fn from(skipped: &SkippedStack) -> Self {
        Self {
            position: skipped.position,
            error: skipped.error.to_string(),
        }
    }
}

/// Print the file summary and one line per selected stack
pub fn print_file(reader: &ObfReader, selection: &[usize]) {
    let header = reader.header();
    println!("File: {:?}", reader.path());
    println!("  Format version: {}", header.format_version);
    if !header.description.is_empty() {
        println!("  Description:    {}", header.description);
    }
    println!(
        "  OME-XML:        {}",
        if reader.ome_xml().is_some() { "yes" } else { "no" }
    );
    println!("  Stacks:         {}", reader.num_stacks());

    for &index in selection {
        if let Some(stack) = reader.stack(index) {
            print_stack(index, stack);
        }
    }

    for skipped in reader.skipped() {
        println!("  Skipped stack at offset {}: {}", skipped.position, skipped.error);
    }

    let images: Vec<_> = reader
        .sorted_image_summaries()
        .into_iter()
        .filter(|image| selection.contains(&image.index))
        .collect();
    if !images.is_empty() {
        println!("\n  Images:");
        for image in images {
            println!("    {}", image.as_string());
        }
    }

    let groups = image_groups(reader);
    if !groups.is_empty() {
        println!("\n  Acquisitions:");
        for group in groups {
            let indices: Vec<String> = group.images.iter().map(|i| i.index.to_string()).collect();
            println!("    {}: {} (stacks {})", group.key, group.metadata, indices.join(", "));
        }
    }
}

/// Acquisition groups, or none when their geometry disagrees
fn image_groups(reader: &ObfReader) -> Vec<ImageGroup> {
    match reader.image_groups() {
        Ok(groups) => groups,
        Err(e) => {
            log::warn!("Images of {:?} not grouped: {}", reader.path(), e);
            Vec::new()
        }
    }
}

fn print_stack(index: usize, stack: &StackMetadata) {
    let header = stack.header();
    println!(
        "  [{}] {} (v{}): {:?} {}{}",
        index,
        stack.name(),
        stack.format_version(),
        stack.num_pixels(),
        stack.data_type(),
        if header.compression_type != 0 { ", zlib" } else { "" }
    );

    let sizes = stack.physical_sizes(true);
    match stack.units() {
        Some(units) => {
            let axes: Vec<String> = sizes
                .iter()
                .zip(units)
                .map(|(size, unit)| format!("{:.4e} {}", size, unit))
                .collect();
            println!("      extent: {}", axes.join(" x "));
        }
        None => println!("      extent: {:?}", sizes),
    }

    if !stack.tag_dictionary().is_empty() {
        let keys: Vec<&str> = stack.tag_dictionary().iter().map(|t| t.key.as_str()).collect();
        println!("      tags: {}", keys.join(", "));
    }
}

/// Minimum, maximum and mean of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ImageStats {
    pub fn from_image(image: &StackImage) -> Option<Self> {
        Self::from_samples(&image.to_f64_vec())
    }

    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let (min, max, sum) = samples.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
        );
        Some(Self {
            min,
            max,
            mean: sum / samples.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_stats() {
        let stats = ImageStats::from_samples(&[4.0, -2.0, 10.0, 0.0]).unwrap();
        assert_eq!(stats.min, -2.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.mean, 3.0);
        assert!(ImageStats::from_samples(&[]).is_none());
    }
}
