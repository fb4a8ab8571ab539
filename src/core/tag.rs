//! Annotation tags carried by ACE files.
//!
//! | Block | Anchor | Coordinates |
//! |-------|--------|-------------|
//! | `WA{` | whole assembly | none |
//! | `CT{` | contig consensus | gapped consensus |
//! | `RT{` | read | gapped read |

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::core::types::Range;

/// `WA{}` tag, usually provenance of the program that produced the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WholeAssemblyTag {
    pub tag_type: String,
    pub creator: String,
    pub created: NaiveDateTime,
    /// Body lines joined with `\n`
    pub data: String,
}

/// `CT{}` tag anchored to a gapped consensus range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusTag {
    pub contig_id: String,
    pub tag_type: String,
    pub creator: String,
    pub range: Range,
    pub created: NaiveDateTime,
    /// `NoTrans` was present on the header line
    pub transient: bool,
    pub data: Vec<String>,
    pub comments: Vec<String>,
}

impl ConsensusTag {
    #[must_use]
    pub fn from_header(header: ConsensusTagHeader) -> Self {
        Self {
            contig_id: header.contig_id,
            tag_type: header.tag_type,
            creator: header.creator,
            range: header.range,
            created: header.created,
            transient: header.transient,
            data: Vec::new(),
            comments: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(&self) -> ConsensusTagHeader {
        ConsensusTagHeader {
            contig_id: self.contig_id.clone(),
            tag_type: self.tag_type.clone(),
            creator: self.creator.clone(),
            range: self.range,
            created: self.created,
            transient: self.transient,
        }
    }
}

/// First line of a `CT{}` block, handed to visitors before the body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusTagHeader {
    pub contig_id: String,
    pub tag_type: String,
    pub creator: String,
    pub range: Range,
    pub created: NaiveDateTime,
    pub transient: bool,
}

/// `RT{}` tag anchored to a gapped read range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadTag {
    pub read_id: String,
    pub tag_type: String,
    pub creator: String,
    pub range: Range,
    pub created: NaiveDateTime,
    pub transient: bool,
    /// Extra body lines joined with `\n`, usually empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
}

/// All tags found in one file, in file order per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub whole_assembly: Vec<WholeAssemblyTag>,
    pub consensus: Vec<ConsensusTag>,
    pub read: Vec<ReadTag>,
}

impl TagSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.whole_assembly.is_empty() && self.consensus.is_empty() && self.read.is_empty()
    }

    /// Consensus tags for one contig
    pub fn for_contig<'a>(&'a self, contig_id: &'a str) -> impl Iterator<Item = &'a ConsensusTag> + 'a {
        self.consensus.iter().filter(move |t| t.contig_id == contig_id)
    }
}
