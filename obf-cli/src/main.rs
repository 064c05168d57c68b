//! OBF Reader CLI Application
//!
//! Command-line front end for the obf-reader library:
//! - Lists the stacks of OBF/MSR files
//! - Decodes 2D image stacks in parallel and prints their statistics
//! - Exports OME-XML metadata and tag dictionaries
//! - Dumps the scanned metadata as JSON

use anyhow::{Context, Result};
use clap::Parser;
use obf_reader::{ExportError, ObfReader, ScanConfig};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

mod config;
mod report;

use config::{AppConfig, ExportConfig};
use report::{FileReport, ImageStats};

/// OBF Reader - Inspect and decode OBF/MSR microscopy files
#[derive(Parser, Debug)]
#[command(name = "obf-cli")]
#[command(about = "Inspect, decode and export OBF/MSR microscopy files", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the OBF/MSR file to read
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Only show (and decode) the stack with this index
    #[arg(short, long, value_name = "INDEX")]
    stack: Option<usize>,

    /// Decode 2D image stacks and print their statistics
    #[arg(short, long)]
    decode: bool,

    /// Print the scanned metadata as JSON
    #[arg(long)]
    json: bool,

    /// Directory for OME-XML and tag dictionary exports
    #[arg(short, long, value_name = "DIR")]
    export_dir: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("OBF Reader CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using reader library v{}", obf_reader::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    let files: Vec<PathBuf> = match &args.file {
        Some(file) => vec![file.clone()],
        None => app_config.input.files.clone(),
    };

    if files.is_empty() {
        println!("OBF Reader - No input specified");
        println!("\nQuick Start:");
        println!("  obf-cli sample.msr");
        println!("  obf-cli sample.msr --decode");
        println!("  obf-cli sample.msr --export-dir out/");
        println!("\nUse --help for more options");
        return Ok(());
    }

    let mut export = app_config.export.clone();
    if let Some(dir) = &args.export_dir {
        export.output_dir = Some(dir.clone());
    }

    for file in &files {
        process_file(file, &app_config.scan, &export, &args)?;
    }

    Ok(())
}

/// Scan one file and run the requested actions on it
fn process_file(path: &Path, scan: &ScanConfig, export: &ExportConfig, args: &Args) -> Result<()> {
    let reader = match ObfReader::open_with_config(path, scan) {
        Ok(reader) => reader,
        Err(failure) => {
            if !failure.stacks.is_empty() {
                log::error!(
                    "Scan of {:?} stopped after {} stacks",
                    path,
                    failure.stacks.len()
                );
            }
            return Err(failure).with_context(|| format!("Failed to read {:?}", path));
        }
    };

    let selection: Vec<usize> = match args.stack {
        Some(index) if index < reader.num_stacks() => vec![index],
        Some(index) => anyhow::bail!(
            "Stack index {} is out of range ({} stacks in {:?})",
            index,
            reader.num_stacks(),
            path
        ),
        None => (0..reader.num_stacks()).collect(),
    };

    if args.json {
        let report = FileReport::new(&reader, &selection);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report::print_file(&reader, &selection);
    }

    if args.decode {
        decode_images(&reader, &selection);
    }

    if let Some(dir) = &export.output_dir {
        export_metadata(&reader, &selection, dir, export)?;
    }

    Ok(())
}

/// Decode the selected 2D stacks in parallel; each decode opens its own file handle
fn decode_images(reader: &ObfReader, selection: &[usize]) {
    let images: Vec<usize> = selection
        .iter()
        .copied()
        .filter(|&index| reader.stack(index).map_or(false, |stack| stack.is_image()))
        .collect();

    log::info!("Decoding {} image stacks", images.len());

    let results: Vec<_> = images
        .par_iter()
        .map(|&index| (index, reader.read_stack_data(index)))
        .collect();

    println!("\n  Decoded images:");
    for (index, result) in results {
        match result {
            Ok(image) => {
                let (height, width) = image.shape();
                match ImageStats::from_image(&image) {
                    Some(stats) => println!(
                        "    [{}] {}x{} {}: min={} max={} mean={:.3}",
                        index,
                        height,
                        width,
                        image.data_type(),
                        stats.min,
                        stats.max,
                        stats.mean
                    ),
                    None => println!("    [{}] empty image", index),
                }
            }
            Err(e) => {
                log::warn!("Stack {} could not be decoded: {}", index, e);
                println!("    [{}] not decoded: {}", index, e);
            }
        }
    }
}

fn export_metadata(reader: &ObfReader, selection: &[usize], dir: &Path, export: &ExportConfig) -> Result<()> {
    let stem = reader
        .path()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "obf".to_string());

    if export.ome_xml {
        let target = dir.join(format!("{}_ome.xml", stem));
        match reader.export_ome_xml(&target) {
            Ok(()) => println!("Exported OME-XML to {:?}", target),
            Err(ExportError::NoOmeXml) => log::info!("{:?} has no OME-XML metadata", reader.path()),
            Err(e) => return Err(e).with_context(|| format!("Failed to write {:?}", target)),
        }
    }

    if export.tag_dictionaries {
        for &index in selection {
            let target = dir.join(format!("{}_stack{}.txt", stem, index));
            let written = reader
                .export_tag_dictionary(index, &target)
                .with_context(|| format!("Failed to export tags of stack {}", index))?;
            println!("Exported {} tag files for stack {}", written.len(), index);
        }
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
