//! Command-line interface for ace-assembly.
//!
//! Available commands:
//!
//! - **stats**: Summarize the contigs of an ACE file
//! - **extract**: Copy selected contigs into a new ACE file
//! - **rewrite**: Re-serialize an ACE file, optionally recomputing qualities
//!
//! ## Usage
//!
//! ```text
//! # Per-contig summary
//! ace-assembly stats assembly.ace
//!
//! # JSON output for scripting
//! ace-assembly stats assembly.ace --format json
//!
//! # Pull two contigs out of a large file without loading it
//! ace-assembly extract assembly.ace Contig12 Contig40 -o subset.ace
//!
//! # Recompute consensus qualities and emit BS records
//! ace-assembly rewrite assembly.ace -o fixed.ace --qualities quals.json --base-segments
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AceConfig;

pub mod extract;
pub mod rewrite;
pub mod stats;

#[derive(Parser)]
#[command(name = "ace-assembly")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Inspect, extract and rewrite Consed/phrap ACE assembly files")]
#[command(
    long_about = "ace-assembly reads ACE files (plain or gzipped), rebuilds contigs with their placed reads, and writes them back out.\n\nLarge files can be processed without loading every contig:\n- stats and rewrite stream contigs one at a time when --store streaming is set\n- extract seeks straight to the requested contigs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// JSON settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize the contigs of an ACE file
    Stats(stats::StatsArgs),

    /// Copy selected contigs into a new ACE file
    Extract(extract::ExtractArgs),

    /// Re-serialize an ACE file
    Rewrite(rewrite::RewriteArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Settings from `--config`, or the defaults
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AceConfig> {
    match path {
        Some(path) => AceConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(AceConfig::default()),
    }
}

/// Read qualities from a JSON object of read id to quality array, in the
/// read's original orientation
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_qualities(path: &Path) -> anyhow::Result<HashMap<String, Vec<u8>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read qualities {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse qualities {}", path.display()))
}

/// Read full read sequences from a JSON object of read id to basecalls
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_sequences(path: &Path) -> anyhow::Result<HashMap<String, Vec<u8>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sequences {}", path.display()))?;
    let sequences: HashMap<String, String> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse sequences {}", path.display()))?;
    Ok(sequences
        .into_iter()
        .map(|(id, bases)| (id, bases.into_bytes()))
        .collect())
}
