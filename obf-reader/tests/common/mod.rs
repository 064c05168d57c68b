//! In-memory OBF file builder for integration tests

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

pub const FILE_MAGIC: &[u8] = b"OMAS_BF\n\xff\xff";
pub const STACK_MAGIC: &[u8] = b"OMAS_BF_STACK\n\xff\xff";

/// Offset of the data-length field inside a stack header
pub const DATA_LEN_FIELD: usize = 352;

/// Offset of the next-stack field inside a stack header
const NEXT_STACK_FIELD: usize = 360;

pub fn footer_size(version: u32) -> usize {
    match version {
        0 => 0,
        1 => 128,
        2 => 1408,
        3 => 1424,
        4 => 1432,
        5 => 1452,
        6 => 1468,
        _ => 1528,
    }
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn push_string(buf: &mut Vec<u8>, s: &str) {
    push_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// One synthetic stack
#[derive(Debug, Clone)]
pub struct StackSpec {
    pub name: String,
    pub description: String,
    pub version: u32,
    pub num_pixels: Vec<u32>,
    pub physical_lengths: Vec<f64>,
    pub physical_offsets: Vec<f64>,
    pub data_type: u32,
    /// Logical (uncompressed) sample bytes
    pub payload: Vec<u8>,
    pub compressed: bool,
    /// Overrides the footer's samples-written count (default: payload samples)
    pub samples_written: Option<u64>,
    pub num_chunk_positions: u64,
    pub flush_points: Vec<u64>,
    /// Scale factor of every axis' SI unit (metres)
    pub axis_scale: f64,
    pub tags: Vec<(String, String)>,
    /// Legacy metadata blob written between the labels and the flush points
    pub obsolete_metadata: Vec<u8>,
}

impl StackSpec {
    pub fn new(name: &str, version: u32, num_pixels: &[u32], data_type: u32, payload: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            version,
            num_pixels: num_pixels.to_vec(),
            physical_lengths: num_pixels.iter().map(|&n| n as f64).collect(),
            physical_offsets: vec![0.0; num_pixels.len()],
            data_type,
            payload,
            compressed: false,
            samples_written: None,
            num_chunk_positions: 0,
            flush_points: Vec::new(),
            axis_scale: 1.0,
            tags: Vec::new(),
            obsolete_metadata: Vec::new(),
        }
    }

    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    pub fn with_samples_written(mut self, samples_written: u64) -> Self {
        self.samples_written = Some(samples_written);
        self
    }

    pub fn with_chunks(mut self, num_chunk_positions: u64) -> Self {
        self.num_chunk_positions = num_chunk_positions;
        self
    }

    pub fn with_flush_points(mut self, flush_points: &[u64]) -> Self {
        self.flush_points = flush_points.to_vec();
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_obsolete_metadata(mut self, blob: &[u8]) -> Self {
        self.obsolete_metadata = blob.to_vec();
        self
    }

    pub fn with_geometry(mut self, lengths: &[f64], offsets: &[f64], axis_scale: f64) -> Self {
        self.physical_lengths = lengths.to_vec();
        self.physical_offsets = offsets.to_vec();
        self.axis_scale = axis_scale;
        self
    }

    fn bytes_per_sample(&self) -> u64 {
        match self.data_type {
            0x1 | 0x2 => 1,
            0x4 | 0x8 => 2,
            0x10 | 0x20 | 0x40 => 4,
            _ => 8,
        }
    }

    /// Encoded stack record with a zero next-stack offset
    pub fn encode(&self) -> Vec<u8> {
        let rank = self.num_pixels.len();
        let data = if self.compressed {
            zlib(&self.payload)
        } else {
            self.payload.clone()
        };

        let mut buf = STACK_MAGIC.to_vec();
        push_u32(&mut buf, self.version);
        push_u32(&mut buf, rank as u32);
        for i in 0..15 {
            push_u32(&mut buf, self.num_pixels.get(i).copied().unwrap_or(1));
        }
        for i in 0..15 {
            push_f64(&mut buf, self.physical_lengths.get(i).copied().unwrap_or(1.0));
        }
        for i in 0..15 {
            push_f64(&mut buf, self.physical_offsets.get(i).copied().unwrap_or(0.0));
        }
        push_u32(&mut buf, self.data_type);
        push_u32(&mut buf, u32::from(self.compressed));
        push_u32(&mut buf, if self.compressed { 6 } else { 0 });
        push_u32(&mut buf, self.name.len() as u32);
        push_u32(&mut buf, self.description.len() as u32);
        push_u64(&mut buf, 0);
        push_u64(&mut buf, data.len() as u64);
        push_u64(&mut buf, 0);
        assert_eq!(buf.len(), NEXT_STACK_FIELD + 8);
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(self.description.as_bytes());
        buf.extend_from_slice(&data);

        if self.version == 0 {
            return buf;
        }

        buf.extend(self.encode_footer(rank));
        buf.extend(self.encode_trailing(rank));
        buf
    }

    fn encode_footer(&self, rank: usize) -> Vec<u8> {
        let size = footer_size(self.version);
        let mut footer = Vec::with_capacity(size);

        // Tier 1A: no column positions, a label for every dimension
        push_u32(&mut footer, size as u32);
        for _ in 0..15 {
            push_u32(&mut footer, 0);
        }
        for i in 0..15 {
            push_u32(&mut footer, u32::from(i < rank));
        }
        push_u32(&mut footer, self.obsolete_metadata.len() as u32);

        if self.version >= 2 {
            // Dimensionless value, metres on every axis
            let zero_unit = |buf: &mut Vec<u8>, meter: bool, scale: f64| {
                for i in 0..9 {
                    let numerator = if meter && i == 0 { 1 } else { 0 };
                    buf.extend_from_slice(&(numerator as i32).to_le_bytes());
                    buf.extend_from_slice(&1i32.to_le_bytes());
                }
                push_f64(buf, scale);
            };
            zero_unit(&mut footer, false, 1.0);
            for _ in 0..15 {
                zero_unit(&mut footer, true, self.axis_scale);
            }
        }
        if self.version >= 3 {
            push_u64(&mut footer, self.flush_points.len() as u64);
            push_u64(&mut footer, 4096);
        }
        if self.version >= 4 {
            push_u64(&mut footer, 0);
        }
        if self.version >= 5 {
            push_u64(&mut footer, 0);
            push_u32(&mut footer, 1);
            push_u64(&mut footer, 0);
        }
        if self.version >= 6 {
            let samples = self
                .samples_written
                .unwrap_or(self.payload.len() as u64 / self.bytes_per_sample());
            push_u64(&mut footer, samples);
            push_u64(&mut footer, self.num_chunk_positions);
        }

        footer.resize(size, 0);
        footer
    }

    fn encode_trailing(&self, rank: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        for i in 0..rank {
            push_string(&mut buf, &format!("Axis {}", i));
        }
        buf.extend_from_slice(&self.obsolete_metadata);
        if self.version >= 3 {
            for &point in &self.flush_points {
                push_u64(&mut buf, point);
            }
        }
        if self.version >= 4 {
            for (key, value) in &self.tags {
                push_string(&mut buf, key);
                push_string(&mut buf, value);
            }
            push_string(&mut buf, "");
        }
        if self.version >= 6 {
            for i in 0..self.num_chunk_positions {
                push_u64(&mut buf, (i + 1) * 100);
                push_u64(&mut buf, (i + 1) * 1000);
            }
        }
        buf
    }
}

/// Synthetic OBF file: header, stacks in physical order, then the metadata block
#[derive(Debug, Default)]
pub struct ObfFileBuilder {
    pub file_version: u32,
    pub description: String,
    pub metadata: Option<Vec<String>>,
    pub stacks: Vec<StackSpec>,
    /// Link order as physical stack indices; defaults to physical order
    pub chain: Option<Vec<usize>>,
    /// Extra (from, to) links overriding the chain, e.g. to build a cycle
    pub links: Vec<(usize, usize)>,
    /// Bytes cut from the end of the file
    pub truncate_by: usize,
}

impl ObfFileBuilder {
    pub fn new() -> Self {
        Self {
            file_version: 2,
            description: "synthetic".to_string(),
            ..Self::default()
        }
    }

    pub fn with_stack(mut self, stack: StackSpec) -> Self {
        self.stacks.push(stack);
        self
    }

    pub fn with_metadata(mut self, strings: &[&str]) -> Self {
        self.metadata = Some(strings.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_chain(mut self, order: &[usize]) -> Self {
        self.chain = Some(order.to_vec());
        self
    }

    pub fn with_link(mut self, from: usize, to: usize) -> Self {
        self.links.push((from, to));
        self
    }

    pub fn truncated_by(mut self, bytes: usize) -> Self {
        self.truncate_by = bytes;
        self
    }

    /// Absolute offsets of the stacks, in physical order
    pub fn stack_positions(&self) -> Vec<u64> {
        let mut position = self.header_len() as u64;
        self.stacks
            .iter()
            .map(|stack| {
                let here = position;
                position += stack.encode().len() as u64;
                here
            })
            .collect()
    }

    fn header_len(&self) -> usize {
        FILE_MAGIC.len() + 4 + 8 + 4 + self.description.len() + 8
    }

    pub fn build(&self) -> Vec<u8> {
        let positions = self.stack_positions();
        let chain: Vec<usize> = self
            .chain
            .clone()
            .unwrap_or_else(|| (0..self.stacks.len()).collect());

        let mut next = vec![0u64; self.stacks.len()];
        for pair in chain.windows(2) {
            next[pair[0]] = positions[pair[1]];
        }
        for &(from, to) in &self.links {
            next[from] = positions[to];
        }
        let first = chain.first().map(|&i| positions[i]).unwrap_or(0);

        let mut body = Vec::new();
        for (i, stack) in self.stacks.iter().enumerate() {
            let mut encoded = stack.encode();
            encoded[NEXT_STACK_FIELD..NEXT_STACK_FIELD + 8].copy_from_slice(&next[i].to_le_bytes());
            body.extend(encoded);
        }

        let metadata_position = match &self.metadata {
            Some(_) => (self.header_len() + body.len()) as u64,
            None => 0,
        };

        let mut buf = FILE_MAGIC.to_vec();
        push_u32(&mut buf, self.file_version);
        push_u64(&mut buf, first);
        push_string(&mut buf, &self.description);
        push_u64(&mut buf, metadata_position);
        assert_eq!(buf.len(), self.header_len());
        buf.extend(body);

        if let Some(strings) = &self.metadata {
            for s in strings {
                push_string(&mut buf, s);
            }
            push_string(&mut buf, "");
        }

        let keep = buf.len().saturating_sub(self.truncate_by);
        buf.truncate(keep);
        buf
    }
}

/// Overwrite a little-endian u64 in an encoded file
pub fn patch_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn u16_bytes(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn f64_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
