
use serde::{Deserialize, Serialize};

/// Sentinel for "unknown / not constrained" in numeric annotation fields.
pub const UNSET: i64 = -1;

/// One read record travelling through the simulate/align pipeline.
/// Simulated reads carry their provenance; foreign reads may leave everything
/// except `name` and `sequence` at the defaults.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReadRecord {
    /// the read name
    pub name: String,
    /// base sequence, possibly with simulated errors applied
    pub sequence: String,
    /// the unmutated sequence; empty for foreign reads
    #[serde(default)]
    pub original: String,
    /// the subgraph label the read was simulated from (or targets)
    #[serde(default)]
    pub subgraph: String,
    /// 0-based position of the last base in the source graph
    #[serde(default = "unset")]
    pub end_pos: i64,
    /// haplotype index the read was drawn from; -1 if common to all
    #[serde(default = "unset")]
    pub indiv: i64,
    /// number of substitution errors introduced
    #[serde(default = "unset")]
    pub sub_errors: i64,
    /// number of insertion/deletion errors introduced
    #[serde(default = "unset")]
    pub indel_errors: i64,
    /// number of variant nodes the read traverses
    #[serde(default = "unset")]
    pub var_nodes: i64,
    /// number of bases drawn from variant nodes
    #[serde(default = "unset")]
    pub var_bases: i64
}

fn unset() -> i64 {
    UNSET
}

impl Default for ReadRecord {
    fn default() -> ReadRecord {
        ReadRecord {
            name: String::new(),
            sequence: String::new(),
            original: String::new(),
            subgraph: String::new(),
            end_pos: UNSET,
            indiv: UNSET,
            sub_errors: UNSET,
            indel_errors: UNSET,
            var_nodes: UNSET,
            var_bases: UNSET
        }
    }
}
