//! End-to-end tests: parse, build, write and parse again.

use std::io::Write;
use std::path::{Path, PathBuf};

use ace_assembly::parsing::section::ContigHeader;
use ace_assembly::visitor::collect::AssemblyCollector;
use ace_assembly::visitor::fanout::FanoutVisitor;
use ace_assembly::visitor::{ContigVisit, VisitDecision};
use ace_assembly::{
    AceContigStore, AceFileParser, AceFileVisitor, AceWriter, Direction, Memento, ParseCallback,
    ParseError, StoreBuilder, StoreHint,
};
use tempfile::TempDir;

const ASSEMBLY: &str = "AS 2 3

CO Contig1 10 2 2 U
ACGT*ACGTA

BQ
 40 40 40 40 40 40 40 40 40

AF read1 U 1
AF read2 C 3
BS 1 4 read1
BS 5 10 read2

RD read1 8 0 0
ACGT*ACG

QA 1 8 1 8
DS CHROMAT_FILE: read1 PHD_FILE: read1.phd.1 TIME: Thu Sep 23 10:48:44 2004

RD read2 8 0 0
GT*ACGTA

QA 1 8 1 8
DS CHROMAT_FILE: read2 PHD_FILE: read2.phd.1 TIME: Thu Sep 23 10:48:44 2004

CO Contig2 4 1 1 C
TTGA

BQ
 20 20 20 20

AF read3 U 1
BS 1 4 read3

RD read3 4 0 0
TTGA

QA 1 4 1 4
DS CHROMAT_FILE: read3 PHD_FILE: read3.phd.1 TIME: Thu Sep 23 10:48:44 2004

RT{
read1 comment consed 2 3 040923:104844
}

CT{
Contig1 comment consed 1 3 040923:104844
first line
COMMENT{
a comment
C}
}

WA{
phrap_params phrap 040923:104844
phrap reads.fasta -new_ace
}
";

fn write_fixture(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("assembly.ace");
    std::fs::write(&path, ASSEMBLY).unwrap();
    path
}

fn write_gzipped(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("assembly.ace.gz");
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(ASSEMBLY.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

fn collect(path: &Path) -> AssemblyCollector {
    let parser = AceFileParser::from_path(path).unwrap();
    let mut collector = AssemblyCollector::default();
    parser.accept(&mut collector).unwrap();
    collector
}

#[test]
fn test_parse_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collect(&write_fixture(&dir));
    assert!(collector.is_complete());

    let header = collector.header().unwrap();
    assert_eq!(header.num_contigs, 2);
    assert_eq!(header.num_reads, 3);

    let contigs = collector.contigs();
    assert_eq!(contigs.len(), 2);
    let contig1 = &contigs[0];
    assert_eq!(contig1.consensus().to_string(), "ACGT*ACGTA");
    assert_eq!(contig1.consensus_quality().len(), 9);
    let read2 = contig1.read("read2").unwrap();
    assert_eq!(read2.direction(), Direction::Reverse);
    assert_eq!(read2.offset(), 2);
    assert!(contigs[1].is_complemented());

    let tags = collector.tags();
    assert_eq!(tags.read.len(), 1);
    assert_eq!(tags.consensus[0].data, vec!["first line".to_string()]);
    assert_eq!(tags.consensus[0].comments, vec!["a comment".to_string()]);
    assert_eq!(tags.whole_assembly[0].data, "phrap reads.fasta -new_ace");
}

#[test]
fn test_write_then_parse_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let original = collect(&write_fixture(&dir));

    let mut writer = AceWriter::new(Vec::new()).unwrap().with_base_segments(true);
    for contig in original.contigs() {
        writer.write_contig(contig).unwrap();
    }
    writer.write_tags(original.tags());
    let bytes = writer.finish().unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.starts_with("AS 2 3\n\nCO Contig1 10 2 "));
    // Contig2 qualities are below the default threshold
    assert!(text.contains("\nttga\n"));

    let parser = AceFileParser::from_reader(std::io::Cursor::new(bytes));
    let mut reparsed = AssemblyCollector::default();
    parser.accept(&mut reparsed).unwrap();
    assert_eq!(reparsed.contigs(), original.contigs());
    assert_eq!(reparsed.tags(), original.tags());
}

/// Records each contig id and a memento for every contig
#[derive(Default)]
struct MementoRecorder {
    mementos: Vec<(String, Memento)>,
}

impl AceFileVisitor for MementoRecorder {
    fn visit_contig(
        &mut self,
        callback: &ParseCallback,
        header: &ContigHeader,
    ) -> Result<ContigVisit<'_>, ParseError> {
        assert!(callback.can_create_memento());
        self.mementos
            .push((header.id.clone(), callback.create_memento()?));
        Ok(VisitDecision::Skip)
    }
}

#[test]
fn test_memento_resume_matches_full_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir);
    let parser = AceFileParser::from_path(&path).unwrap();

    let mut full = AssemblyCollector::default();
    let mut recorder = MementoRecorder::default();
    let mut fanout = FanoutVisitor::new(vec![&mut full as &mut dyn AceFileVisitor, &mut recorder]);
    parser.accept(&mut fanout).unwrap();
    drop(fanout);
    assert_eq!(recorder.mementos.len(), 2);
    assert_eq!(full.contigs().len(), 2);

    let (id, memento) = &recorder.mementos[1];
    assert_eq!(id, "Contig2");
    let mut resumed = AssemblyCollector::default();
    parser.accept_from(memento, &mut resumed).unwrap();
    assert!(resumed.header().is_none());
    assert_eq!(resumed.contigs(), &full.contigs()[1..]);
    assert_eq!(resumed.tags(), full.tags());

    let other = AceFileParser::from_path(&path).unwrap();
    assert!(matches!(
        other.accept_from(memento, &mut AssemblyCollector::default()),
        Err(ParseError::ForeignMemento)
    ));
}

#[test]
fn test_gzip_matches_plain() {
    let dir = tempfile::tempdir().unwrap();
    let plain = collect(&write_fixture(&dir));
    let gzipped = collect(&write_gzipped(&dir));
    assert_eq!(gzipped.contigs(), plain.contigs());
    assert_eq!(gzipped.tags(), plain.tags());
}

#[test]
fn test_stores_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir);
    let stores: Vec<Box<dyn AceContigStore>> = [StoreHint::InMemory, StoreHint::Indexed, StoreHint::Streaming]
        .into_iter()
        .map(|hint| StoreBuilder::new(hint).build_from_path(&path).unwrap())
        .collect();

    let expected = collect(&path);
    for store in &stores {
        assert_eq!(store.num_contigs().unwrap(), 2);
        assert_eq!(store.num_reads().unwrap(), 3);
        let contigs: Vec<_> = store.iter().unwrap().map(Result::unwrap).collect();
        assert_eq!(contigs, expected.contigs());
        assert_eq!(&store.tags().unwrap(), expected.tags());
        assert_eq!(store.get("Contig2").unwrap().as_ref(), Some(&expected.contigs()[1]));
    }
}

#[test]
fn test_gzip_cannot_be_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gzipped(&dir);
    assert!(StoreBuilder::new(StoreHint::Indexed).build_from_path(&path).is_err());
    let store = StoreBuilder::new(StoreHint::Streaming).build_from_path(&path).unwrap();
    assert_eq!(store.ids().unwrap(), vec!["Contig1", "Contig2"]);
}
