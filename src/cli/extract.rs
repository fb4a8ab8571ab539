use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::cli::OutputFormat;
use crate::config::AceConfig;
use crate::core::contig::Contig;
use crate::parsing::parser::AceFileParser;
use crate::store::{AceContigStore, StoreHint};
use crate::writing::AceWriter;

#[derive(Args)]
pub struct ExtractArgs {
    /// Input ACE file (.ace or .ace.gz)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Contig ids to copy, in output order
    #[arg(required = true)]
    pub contigs: Vec<String>,

    /// Output ACE file
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
struct ExtractSummary {
    output: PathBuf,
    num_contigs: usize,
    num_reads: u64,
    consensus_tags: usize,
    read_tags: usize,
}

/// Execute extract subcommand
///
/// Plain files are indexed and only the requested contigs are re-parsed;
/// gzipped input falls back to streaming.
///
/// # Errors
///
/// Returns an error if the input cannot be parsed, a requested contig is
/// missing, or the output cannot be written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: ExtractArgs, format: OutputFormat, config: &AceConfig, verbose: bool) -> anyhow::Result<()> {
    let parser = AceFileParser::from_path(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let hint = if parser.is_seekable() {
        StoreHint::Indexed
    } else {
        StoreHint::Streaming
    };
    info!("Extracting {} contigs with the {hint:?} store", args.contigs.len());

    let wanted: HashSet<String> = args.contigs.iter().cloned().collect();
    let store = config
        .store_builder_for(hint)
        .with_filter(move |id| wanted.contains(id))
        .build(parser)?;

    let contigs = fetch(store.as_ref(), &args.contigs)?;
    let contig_ids: HashSet<&str> = contigs.iter().map(Contig::id).collect();
    let read_ids: HashSet<&str> = contigs
        .iter()
        .flat_map(|c| c.reads().iter().map(|r| r.id()))
        .collect();

    let mut writer = config.configure_writer(
        AceWriter::create(&args.output)
            .with_context(|| format!("Failed to create {}", args.output.display()))?,
    );
    for contig in &contigs {
        writer.write_contig(contig)?;
    }

    for tag in store.whole_assembly_tags()? {
        writer.write_whole_assembly_tag(&tag);
    }
    let mut consensus_tags = 0;
    for tag in store.consensus_tags()? {
        if contig_ids.contains(tag.contig_id.as_str()) {
            writer.write_consensus_tag(&tag);
            consensus_tags += 1;
        }
    }
    let mut read_tags = 0;
    for tag in store.read_tags()? {
        if read_ids.contains(tag.read_id.as_str()) {
            writer.write_read_tag(&tag);
            read_tags += 1;
        }
    }

    let summary = ExtractSummary {
        output: args.output.clone(),
        num_contigs: writer.num_contigs(),
        num_reads: writer.num_reads(),
        consensus_tags,
        read_tags,
    };
    writer.finish()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Tsv => {
            println!("output\tnum_contigs\tnum_reads\tconsensus_tags\tread_tags");
            println!(
                "{}\t{}\t{}\t{}\t{}",
                summary.output.display(),
                summary.num_contigs,
                summary.num_reads,
                summary.consensus_tags,
                summary.read_tags
            );
        }
        OutputFormat::Text => {
            if verbose {
                println!(
                    "Wrote {} contigs ({} reads, {} consensus tags, {} read tags) to {}",
                    summary.num_contigs,
                    summary.num_reads,
                    summary.consensus_tags,
                    summary.read_tags,
                    summary.output.display()
                );
            }
        }
    }
    Ok(())
}

/// Look up each requested contig, failing on the first one that is absent
fn fetch(store: &dyn AceContigStore, ids: &[String]) -> anyhow::Result<Vec<Contig>> {
    let mut contigs = Vec::with_capacity(ids.len());
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        match store.get(id)? {
            Some(contig) => contigs.push(contig),
            None => bail!("Contig {id} not found"),
        }
    }
    Ok(contigs)
}
