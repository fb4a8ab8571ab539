use std::collections::HashSet;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::config::AceConfig;
use crate::core::contig::ContigSummary;
use crate::store::{AceContigStore, StoreHint};

#[derive(Args)]
pub struct StatsArgs {
    /// Input ACE file (.ace or .ace.gz)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Only report these contigs
    #[arg(long = "contig")]
    pub contigs: Vec<String>,

    /// Store strategy (overrides the config file)
    #[arg(long, value_enum)]
    pub store: Option<StoreHint>,
}

#[derive(Debug, Serialize)]
pub struct TagCounts {
    pub whole_assembly: usize,
    pub consensus: usize,
    pub read: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub num_contigs: usize,
    pub num_reads: u64,
    pub tags: TagCounts,
    pub contigs: Vec<ContigSummary>,
}

/// Summarize every contig of a store
///
/// # Errors
///
/// Returns the first store error.
pub fn summarize(store: &dyn AceContigStore) -> anyhow::Result<StatsReport> {
    let contigs = store
        .iter()?
        .map(|contig| contig.map(|c| ContigSummary::from(&c)))
        .collect::<Result<Vec<_>, _>>()?;
    let tags = store.tags()?;
    Ok(StatsReport {
        num_contigs: contigs.len(),
        num_reads: store.num_reads()?,
        tags: TagCounts {
            whole_assembly: tags.whole_assembly.len(),
            consensus: tags.consensus.len(),
            read: tags.read.len(),
        },
        contigs,
    })
}

/// Execute stats subcommand
///
/// # Errors
///
/// Returns an error if the input cannot be parsed.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: StatsArgs, format: OutputFormat, config: &AceConfig, verbose: bool) -> anyhow::Result<()> {
    let mut builder = config.store_builder_for(args.store.unwrap_or(config.store));
    if !args.contigs.is_empty() {
        let wanted: HashSet<String> = args.contigs.iter().cloned().collect();
        builder = builder.with_filter(move |id| wanted.contains(id));
    }
    let store = builder.build_from_path(&args.input)?;
    let report = summarize(store.as_ref())?;

    if verbose {
        eprintln!(
            "Read {} contigs from {}",
            report.num_contigs,
            args.input.display()
        );
    }

    match format {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Tsv => print_tsv(&report),
    }
    Ok(())
}

fn print_text(report: &StatsReport) {
    println!("Contigs: {}", report.num_contigs);
    println!("Reads:   {}", report.num_reads);
    println!(
        "Tags:    {} whole-assembly, {} consensus, {} read",
        report.tags.whole_assembly, report.tags.consensus, report.tags.read
    );
    if report.contigs.is_empty() {
        return;
    }

    let width = report
        .contigs
        .iter()
        .map(|c| c.id.len())
        .max()
        .unwrap_or(2)
        .max(2);
    println!();
    println!(
        "{:<width$}  {:>8}  {:>8}  {:>6}  {:>6}  {:>5}",
        "ID", "Gapped", "Ungapped", "Reads", "Strand", "MeanQ"
    );
    for c in &report.contigs {
        println!(
            "{:<width$}  {:>8}  {:>8}  {:>6}  {:>6}  {:>5}",
            c.id,
            c.gapped_length,
            c.ungapped_length,
            c.num_reads,
            if c.complemented { "C" } else { "U" },
            c.mean_consensus_quality
        );
    }
}

fn print_tsv(report: &StatsReport) {
    println!("id\tgapped_length\tungapped_length\tnum_reads\tcomplemented\tmean_consensus_quality");
    for c in &report.contigs {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            c.id, c.gapped_length, c.ungapped_length, c.num_reads, c.complemented, c.mean_consensus_quality
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_data::write_ace;
    use crate::store::StoreBuilder;

    #[test]
    fn test_summarize() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreBuilder::new(StoreHint::Streaming)
            .build_from_path(write_ace(&dir))
            .unwrap();
        let report = summarize(store.as_ref()).unwrap();
        assert_eq!(report.num_contigs, 3);
        assert_eq!(report.num_reads, 4);
        assert_eq!(report.tags.consensus, 1);
        let ctg2 = &report.contigs[1];
        assert_eq!(ctg2.id, "ctg2");
        assert_eq!(ctg2.gapped_length, 5);
        assert_eq!(ctg2.ungapped_length, 4);
        assert_eq!(ctg2.mean_consensus_quality, 30);
    }
}
