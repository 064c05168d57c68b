//! Image listings
//!
//! Builds one summary per flat 2D stack, with the detector that recorded it
//! when the acquisition software left that information in the `imspector` tag.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::types::StackMetadata;
use crate::xml::XmlElement;

/// Tag dictionary key holding the acquisition settings
pub const IMSPECTOR_TAG: &str = "imspector";

const CHANNELS_PATH: &str = "doc/ExpControl/measurement/channels";

/// Acquisition number in braces, optionally followed by a suffix: `ExpControl Ch1 {3} STED`
const ACQUISITION_PATTERN: &str = r"(?i)^.+\{(?P<index>\d+)\}(?P<extra>.*)$";

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Images of acquisition '{key}' disagree on their geometry: '{expected}' vs '{found}'")]
    InconsistentMetadata {
        key: String,
        expected: String,
        found: String,
    },

    #[error("Invalid acquisition pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Summary of one 2D image stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageSummary {
    /// Index of the stack in link order
    pub index: usize,
    pub name: String,
    pub description: String,
    pub detector: Option<String>,
    pub num_pixels: Vec<u32>,
    pub physical_lengths: Vec<f64>,
    pub physical_offsets: Vec<f64>,
    /// Scaled pixel size of the first two dimensions, in nm, rounded to 0.01
    pub pixel_sizes_nm: Vec<f64>,
}

impl ImageSummary {
    /// Build the summary of `stack`, or None if it is not a 2D image
    pub fn from_stack(index: usize, stack: &StackMetadata) -> Option<Self> {
        if !stack.is_image() {
            return None;
        }

        let pixel_sizes_nm = stack
            .pixel_sizes(true)
            .into_iter()
            .take(2)
            .map(|size| (size * 1e9 * 100.0).round() / 100.0)
            .collect();

        Some(Self {
            index,
            name: stack.name().to_string(),
            description: stack.description().to_string(),
            detector: detector_for(stack),
            num_pixels: stack.num_pixels().to_vec(),
            physical_lengths: stack.physical_sizes(false),
            physical_offsets: stack.offsets(false),
            pixel_sizes_nm,
        })
    }

    /// Frame size in µm and pixel size in nm of the first two dimensions
    pub fn geometry_string(&self) -> String {
        let axis = |dim: usize| {
            let pixels = self.num_pixels.get(dim).copied().unwrap_or(1) as f64;
            let size = self.pixel_sizes_nm.get(dim).copied().unwrap_or(0.0);
            pixels * size / 1000.0
        };
        format!(
            "Frame: {:.1}x{:.1}µm - Pixel: {}nm",
            axis(0),
            axis(1),
            self.pixel_sizes_nm.first().copied().unwrap_or(0.0)
        )
    }

    /// One-line description: detector, name, size and pixel size
    pub fn as_string(&self) -> String {
        let height = self.num_pixels.get(1).copied().unwrap_or(1);
        let width = self.num_pixels.first().copied().unwrap_or(1);
        let pixel_size = self.pixel_sizes_nm.first().copied().unwrap_or(0.0);
        format!(
            "{}: {}: size = (h={} x w={}); pixel size = {}nm (index = {})",
            self.detector.as_deref().unwrap_or("unknown detector"),
            self.name,
            height,
            width,
            pixel_size,
            self.index
        )
    }
}

/// Summaries of every 2D stack, in link order
pub fn image_summaries(stacks: &[StackMetadata]) -> Vec<ImageSummary> {
    stacks
        .iter()
        .enumerate()
        .filter_map(|(index, stack)| ImageSummary::from_stack(index, stack))
        .collect()
}

/// Summaries of every 2D stack, in natural order of their one-line descriptions
pub fn sorted_image_summaries(stacks: &[StackMetadata]) -> Vec<ImageSummary> {
    let mut summaries = image_summaries(stacks);
    summaries.sort_by(|a, b| natord::compare(&a.as_string(), &b.as_string()));
    summaries
}

/// 2D images of one acquisition, one per detector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageGroup {
    /// `Image N`, `Image N (suffix)`, or the stack name when it carries no acquisition number
    pub key: String,
    /// Frame size and pixel size shared by every image of the group
    pub metadata: String,
    pub images: Vec<ImageSummary>,
}

/// Group the 2D stacks with a known detector by acquisition, in natural key order
///
/// Every image of a group must have the same frame and pixel size.
pub fn image_groups(stacks: &[StackMetadata]) -> Result<Vec<ImageGroup>, SummaryError> {
    let pattern = Regex::new(ACQUISITION_PATTERN)?;
    let mut groups: Vec<ImageGroup> = Vec::new();

    for summary in image_summaries(stacks) {
        if summary.detector.is_none() {
            log::debug!("Stack '{}' has no known detector, not grouped", summary.name);
            continue;
        }

        let key = acquisition_key(&pattern, &summary.name);
        let metadata = summary.geometry_string();

        match groups.iter_mut().find(|group| group.key == key) {
            Some(group) => {
                if group.metadata != metadata {
                    return Err(SummaryError::InconsistentMetadata {
                        key,
                        expected: group.metadata.clone(),
                        found: metadata,
                    });
                }
                group.images.push(summary);
            }
            None => groups.push(ImageGroup {
                key,
                metadata,
                images: vec![summary],
            }),
        }
    }

    groups.sort_by(|a, b| natord::compare(&a.key, &b.key));
    Ok(groups)
}

fn acquisition_key(pattern: &Regex, name: &str) -> String {
    match pattern.captures(name) {
        Some(captures) => {
            let index = &captures["index"];
            match &captures["extra"] {
                "" => format!("Image {}", index),
                extra => format!("Image {} ({})", index, extra),
            }
        }
        None => name.to_string(),
    }
}

/// Detector of the first channel whose name occurs in the stack name
fn detector_for(stack: &StackMetadata) -> Option<String> {
    let raw = stack.tag(IMSPECTOR_TAG)?;
    let root = match XmlElement::parse(raw) {
        Ok(root) => root,
        Err(e) => {
            log::debug!("Tag '{}' of stack '{}' is not XML: {}", IMSPECTOR_TAG, stack.name(), e);
            return None;
        }
    };

    let detector = root
        .find(CHANNELS_PATH)?
        .children_named("item")
        .find_map(|item| {
            let name = item.child("name")?;
            let detector = item.find("detsel/detector")?;
            // An empty channel name would match every stack
            (!name.text.is_empty() && stack.name().contains(name.text.as_str()))
                .then(|| detector.text.clone())
        });
    detector
}
