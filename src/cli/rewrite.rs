use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tracing::{debug, info};

use crate::assembly::consensus::{ConsensusRecall, MostFrequentBaseCaller};
use crate::cli::{load_qualities, load_sequences, OutputFormat};
use crate::config::AceConfig;
use crate::core::lookup::{SharedQualities, SharedSequences};
use crate::store::StoreHint;
use crate::writing::AceWriter;

#[derive(Args)]
pub struct RewriteArgs {
    /// Input ACE file (.ace or .ace.gz)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output ACE file
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON object of read id to full-length qualities; recomputes consensus
    /// qualities and read base case
    #[arg(long)]
    pub qualities: Option<PathBuf>,

    /// JSON object of read id to full-length basecalls; writes untrimmed reads
    #[arg(long)]
    pub sequences: Option<PathBuf>,

    /// Write BS records
    #[arg(long)]
    pub base_segments: bool,

    /// Recall each consensus base from the reads covering it
    #[arg(long)]
    pub recall: bool,

    /// Store strategy (overrides the config file)
    #[arg(long, value_enum)]
    pub store: Option<StoreHint>,
}

#[derive(Debug, Serialize)]
struct RewriteSummary {
    output: PathBuf,
    num_contigs: usize,
    num_reads: u64,
    num_tags: usize,
}

/// Execute rewrite subcommand
///
/// # Errors
///
/// Returns an error if a lookup file or the input cannot be read, or the
/// output cannot be written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: RewriteArgs, format: OutputFormat, config: &AceConfig, verbose: bool) -> anyhow::Result<()> {
    let mut qualities: Option<SharedQualities> = None;
    if let Some(path) = &args.qualities {
        qualities = Some(Arc::new(load_qualities(path)?) as SharedQualities);
    }
    let mut sequences: Option<SharedSequences> = None;
    if let Some(path) = &args.sequences {
        sequences = Some(Arc::new(load_sequences(path)?) as SharedSequences);
    }

    let mut builder = config.store_builder_for(args.store.unwrap_or(config.store));
    if let Some(qualities) = &qualities {
        builder = builder.with_recomputed_quality(Arc::clone(qualities));
    }
    if args.recall {
        let mut recall = ConsensusRecall::new(MostFrequentBaseCaller);
        if let Some(qualities) = &qualities {
            recall = recall.with_qualities(Arc::clone(qualities));
        }
        builder = builder.with_recall(recall);
    }
    let store = builder
        .build_from_path(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let mut writer = config
        .configure_writer(
            AceWriter::create(&args.output)
                .with_context(|| format!("Failed to create {}", args.output.display()))?,
        )
        .with_base_segments(config.base_segments || args.base_segments);
    if let Some(qualities) = qualities {
        writer = writer.with_qualities(qualities);
    }
    if let Some(sequences) = sequences {
        writer = writer.with_sequences(sequences);
    }

    for contig in store.iter()? {
        let contig = contig?;
        debug!("Writing contig {} ({} reads)", contig.id(), contig.num_reads());
        writer
            .write_contig(&contig)
            .with_context(|| format!("Failed to write contig {}", contig.id()))?;
    }
    let tags = store.tags()?;
    writer.write_tags(&tags);

    let summary = RewriteSummary {
        output: args.output.clone(),
        num_contigs: writer.num_contigs(),
        num_reads: writer.num_reads(),
        num_tags: tags.whole_assembly.len() + tags.consensus.len() + tags.read.len(),
    };
    writer.finish()?;
    info!(
        "Rewrote {} contigs to {}",
        summary.num_contigs,
        summary.output.display()
    );

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Tsv => {
            println!("output\tnum_contigs\tnum_reads\tnum_tags");
            println!(
                "{}\t{}\t{}\t{}",
                summary.output.display(),
                summary.num_contigs,
                summary.num_reads,
                summary.num_tags
            );
        }
        OutputFormat::Text => {
            if verbose {
                println!(
                    "Wrote {} contigs ({} reads, {} tags) to {}",
                    summary.num_contigs,
                    summary.num_reads,
                    summary.num_tags,
                    summary.output.display()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_data::write_ace;
    use crate::store::{AceContigStore, StoreBuilder};

    fn args(input: PathBuf, output: PathBuf) -> RewriteArgs {
        RewriteArgs {
            input,
            output,
            qualities: None,
            sequences: None,
            base_segments: false,
            recall: false,
            store: Some(StoreHint::Streaming),
        }
    }

    fn open(path: &std::path::Path) -> Box<dyn AceContigStore> {
        StoreBuilder::new(StoreHint::InMemory).build_from_path(path).unwrap()
    }

    #[test]
    fn test_rewrite_preserves_contigs_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_ace(&dir);
        let output = dir.path().join("out.ace");
        run(args(input.clone(), output.clone()), OutputFormat::Text, &AceConfig::default(), false).unwrap();

        let before = open(&input);
        let after = open(&output);
        let expected: Vec<_> = before.iter().unwrap().map(Result::unwrap).collect();
        let actual: Vec<_> = after.iter().unwrap().map(Result::unwrap).collect();
        assert_eq!(actual, expected);
        assert_eq!(after.tags().unwrap(), before.tags().unwrap());
    }

    #[test]
    fn test_rewrite_with_qualities_and_segments() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_ace(&dir);
        let output = dir.path().join("out.ace");
        let quals = dir.path().join("quals.json");
        std::fs::write(
            &quals,
            r#"{"r1": [40, 40, 40, 40], "r2": [10, 10], "r3": [10, 10], "r4": [40, 40, 40]}"#,
        )
        .unwrap();

        let mut rewrite = args(input, output.clone());
        rewrite.qualities = Some(quals);
        rewrite.base_segments = true;
        run(rewrite, OutputFormat::Json, &AceConfig::default(), false).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("AS 3 4\n"));
        assert!(text.contains("\nBS "));

        let after = open(&output);
        let ctg1 = after.get("ctg1").unwrap().unwrap();
        assert!(ctg1.consensus_quality().iter().all(|&q| q == 40));
    }

    #[test]
    fn test_missing_lookup_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut rewrite = args(write_ace(&dir), dir.path().join("out.ace"));
        rewrite.qualities = Some(dir.path().join("missing.json"));
        assert!(run(rewrite, OutputFormat::Text, &AceConfig::default(), false).is_err());
    }
}
