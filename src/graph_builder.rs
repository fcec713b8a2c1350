
use crate::data_types::population::Population;
use crate::graph::{Graph, Node};

#[allow(unused_imports)]
use log::{debug, info, trace, warn};
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    #[error("invalid source: {reason}")]
    InvalidSource { reason: String }
}

/// A genomic region on one contig. `upper <= 0` means "to the end of the contig".
/// Coordinates are 0-based; `lower` is inclusive and `upper` exclusive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Region {
    pub contig: String,
    pub lower: i64,
    pub upper: i64
}

impl Region {
    pub fn new(contig: &str, lower: i64, upper: i64) -> Region {
        Region {
            contig: contig.to_string(),
            lower,
            upper
        }
    }

    /// Parses the `chr:lo-hi` form.
    /// # Errors
    /// * if the string does not split into a contig and two integer bounds
    pub fn parse(region: &str) -> Result<Region, BuilderError> {
        let err = || BuilderError::InvalidSource {
            reason: format!("invalid region {region:?}, expected the form \"chr:lo-hi\"")
        };
        let (contig, range) = region.rsplit_once(':').ok_or_else(err)?;
        let (lo, hi) = range.split_once('-').ok_or_else(err)?;
        if contig.is_empty() {
            return Err(err());
        }
        let lower: i64 = lo.parse().map_err(|_| err())?;
        let upper: i64 = hi.parse().map_err(|_| err())?;
        Ok(Region::new(contig, lower, upper))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.lower, self.upper)
    }
}

/// Random access to reference sequence, by contig name.
pub trait ReferenceSource {
    /// The contig names, in file order.
    fn sequences(&self) -> Vec<String>;
    /// The length of one contig.
    fn seq_len(&self, contig: &str) -> Result<usize, Box<dyn std::error::Error>>;
    /// The subsequence over a 0-based inclusive range.
    fn subseq(&self, contig: &str, lo: usize, hi_inclusive: usize) -> Result<Vec<u8>, Box<dyn std::error::Error>>;
}

/// Forward iteration over a phased variant call-set, restricted to a region.
/// `alleles()[0]` is always the REF allele and `frequencies()` is parallel to it.
pub trait VariantSource {
    fn set_region(&mut self, region: &Region);
    /// Advances to the next record in the region; false when exhausted.
    fn next(&mut self) -> Result<bool, Box<dyn std::error::Error>>;
    /// 0-based position of the current record.
    fn pos(&self) -> i64;
    fn alleles(&self) -> &[Vec<u8>];
    fn frequencies(&self) -> &[f32];
    /// The haplotypes whose genotype selects allele `allele_index`, masked to the ingroup.
    fn allele_pop(&self, allele_index: usize) -> Population;
    fn samples(&self) -> &[String];
    fn num_samples(&self) -> usize {
        self.samples().len()
    }
    /// Restricts the exposed genotypes to a random `percent` of the samples.
    fn create_ingroup(&mut self, percent: u8);
    /// A printable description of the current ingroup.
    fn ingroup_str(&self) -> String;
}

/// Streams a reference contig and a phased variant stream, in positional order,
/// into a new `Graph`. Reference stretches between variant loci become chains of
/// nodes bounded by `max_node_len`; every variant locus becomes one REF node plus
/// one node per ALT allele, all connected bipartite to the pending graph tails.
pub struct GraphBuilder<R: ReferenceSource, V: VariantSource> {
    reference: R,
    variants: V,
    region: Option<Region>,
    /// percent of samples exposed by the variant stream, 0-100
    ingroup: u8,
    max_node_len: usize
}

impl<R: ReferenceSource, V: VariantSource> GraphBuilder<R, V> {
    pub fn new(reference: R, variants: V) -> GraphBuilder<R, V> {
        GraphBuilder {
            reference,
            variants,
            region: None,
            ingroup: 100,
            max_node_len: 1000000
        }
    }

    /// Restricts construction to a region. Without one, the first contig of the
    /// reference is used in full.
    pub fn region(&mut self, region: Region) -> &mut Self {
        self.region = Some(region);
        self
    }

    /// Sets the ingroup percentage; values above 100 are ignored.
    pub fn ingroup(&mut self, percent: u8) -> &mut Self {
        if percent > 100 {
            warn!("Ignoring out-of-range ingroup percentage: {percent}");
        } else {
            self.ingroup = percent;
        }
        self
    }

    /// Sets the maximum reference node length; must be >= 1.
    pub fn node_len(&mut self, max: usize) -> &mut Self {
        self.max_node_len = max.max(1);
        self
    }

    /// Applies the configured parameters and builds the graph.
    /// # Errors
    /// * `BuilderError::InvalidSource` for an empty reference or a region naming
    ///   an unknown contig
    /// * any error surfaced by the reference or variant collaborators
    pub fn build(&mut self) -> Result<Graph, Box<dyn std::error::Error>> {
        let region: Region = match self.region.clone() {
            Some(r) => r,
            None => {
                // default to the whole first contig
                let contigs: Vec<String> = self.reference.sequences();
                let first: &String = contigs.first().ok_or_else(|| BuilderError::InvalidSource {
                    reason: "reference contains no sequences".to_string()
                })?;
                Region::new(first, 0, 0)
            }
        };

        let contig_len: usize = self.reference.seq_len(&region.contig)
            .map_err(|e| BuilderError::InvalidSource {
                reason: format!("contig {:?} not found in reference: {e}", region.contig)
            })?;
        let target_upper: i64 = if region.upper <= 0 { contig_len as i64 } else { region.upper };

        self.variants.create_ingroup(self.ingroup);
        self.variants.set_region(&region);

        let num_haplotypes: usize = 2 * self.variants.num_samples();
        let mut g: Graph = Graph::new();
        g.set_pop_size(num_haplotypes);

        // the graph is complete up to this position, exclusive
        let mut cur: i64 = region.lower;
        // tails of the graph so far, and nodes added in the current round
        let mut prev_unconnected: Vec<u64> = vec![];
        let mut curr_unconnected: Vec<u64> = vec![];

        while self.variants.next()? {
            let pos: i64 = self.variants.pos();
            cur = self.build_linear_ref(&mut g, &mut prev_unconnected, &mut curr_unconnected,
                                        &region, cur, pos, num_haplotypes)?;

            let alleles: &[Vec<u8>] = self.variants.alleles();
            let frequencies: &[f32] = self.variants.frequencies();

            // alt positions are referenced to the REF allele they replace
            cur += alleles[0].len() as i64;

            let ref_node: Node = Node::new(
                cur - 1,
                &alleles[0],
                Population::with_width(num_haplotypes, true),
                true,
                frequencies.first().copied().unwrap_or(1.0)
            );
            if let Some(id) = g.add_node(ref_node) {
                curr_unconnected.push(id);
            }

            for (i, allele) in alleles.iter().enumerate().skip(1) {
                let alt_node: Node = Node::new(
                    cur - 1,
                    allele,
                    self.variants.allele_pop(i),
                    false,
                    frequencies.get(i).copied().unwrap_or(0.0)
                );
                if let Some(id) = g.add_node(alt_node) {
                    curr_unconnected.push(id);
                }
            }

            build_edges(&mut g, &mut prev_unconnected, &mut curr_unconnected);
        }

        // the reference tail after the last variant
        self.build_linear_ref(&mut g, &mut prev_unconnected, &mut curr_unconnected,
                              &region, cur, target_upper, num_haplotypes)?;

        g.finalize()?;
        g.set_desc(format!("region: {region}\ningroup: {}", self.variants.ingroup_str()));
        info!("Built graph over {region}: {} nodes, {} haplotypes", g.member_ids().len(), num_haplotypes);
        Ok(g)
    }

    /// Emits the reference span `[pos, target)` as a chain of nodes of length
    /// <= `max_node_len`. The first sub-node fans in from everything left in
    /// `prev`; each later sub-node only from its immediate predecessor.
    /// Returns the new cursor position.
    fn build_linear_ref(&self, g: &mut Graph, prev: &mut Vec<u64>, curr: &mut Vec<u64>,
                        region: &Region, pos: i64, target: i64,
                        num_haplotypes: usize) -> Result<i64, Box<dyn std::error::Error>> {
        let mut pos: i64 = pos;
        while pos < target {
            let node_end: i64 = target.min(pos + self.max_node_len as i64);
            let seq: Vec<u8> = self.reference.subseq(&region.contig, pos as usize, (node_end - 1) as usize)?;
            pos = node_end;

            let node: Node = Node::new(
                pos - 1,
                &seq,
                Population::with_width(num_haplotypes, true),
                true,
                1.0
            );
            if let Some(id) = g.add_node(node) {
                curr.push(id);
            }
            build_edges(g, prev, curr);
        }
        Ok(pos)
    }
}

/// Connects `prev x curr` as a complete bipartite edge set, then shifts `curr`
/// into `prev` for the next round.
fn build_edges(g: &mut Graph, prev: &mut Vec<u64>, curr: &mut Vec<u64>) {
    for &p in prev.iter() {
        for &c in curr.iter() {
            g.add_edge(p, c);
        }
    }
    std::mem::swap(prev, curr);
    curr.clear();
}
