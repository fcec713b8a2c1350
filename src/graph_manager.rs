
use crate::data_types::population::{Population, PopulationError};
use crate::data_types::reference_genome::ReferenceGenome;
use crate::graph::Graph;
use crate::graph_builder::{GraphBuilder, Region};
use crate::variant_file::VcfFile;

#[allow(unused_imports)]
use log::{debug, info, trace, warn};
use rand::Rng;
use rand::seq::index::sample;
use rustc_hash::FxHashMap as HashMap;
use std::fmt::Write as _;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// First line of every graph definition file.
const GDEF_MAGIC: &str = "@gdef";
/// Separates assignments in the header line and in user definition blobs.
const GDEF_DELIM: char = ';';
const GDEF_ASSIGN: char = '=';
/// Separates label path components.
const GDEF_SCOPE: char = '/';
/// Marks the auto-generated complement of a sibling population.
const GDEF_NEGATE: char = '~';
/// The root label holding the all-ones population.
const GDEF_BASE: &str = "B";

const GDEF_TAG_REF: &str = "ref";
const GDEF_TAG_VCF: &str = "vcf";
const GDEF_TAG_REGION: &str = "region";
const GDEF_TAG_NODELEN: &str = "nodelen";

#[derive(thiserror::Error, Debug)]
pub enum GdefError {
    #[error("not a graph definition file (bad magic line)")]
    BadMagic,
    #[error("invalid header token {token:?}")]
    InvalidHeader { token: String },
    #[error("invalid definition {def:?}")]
    InvalidDefinition { def: String },
    #[error("duplicate label {label:?}")]
    DuplicateLabel { label: String },
    #[error("population of {label:?} has width {found}, expected {expected}")]
    PopulationMismatch { label: String, expected: usize, found: usize },
    #[error("negation labels are generated automatically and cannot be defined: {label:?}")]
    ReservedName { label: String },
    #[error("cannot draw {requested} haplotypes from {label:?} (population {available})")]
    InsufficientPopulation { label: String, requested: usize, available: usize },
    #[error("parent {label:?} is not defined yet")]
    UndefinedParent { label: String },
    #[error("unknown subgraph {label:?}")]
    UnknownSubgraph { label: String },
    #[error("no base graph was built")]
    NoBaseGraph,
    #[error(transparent)]
    Population(#[from] PopulationError)
}

/// Persists the recipe for a base graph plus a tree of named population
/// filters, and lazily materializes the corresponding subgraphs.
///
/// Labels are `/`-separated paths rooted at `B`; every explicitly defined
/// child has an auto-generated `~`-prefixed sibling holding the complement
/// of its population within the parent.
#[derive(Debug)]
pub struct GraphManager {
    ref_file: String,
    vcf_file: String,
    region: String,
    node_len: usize,
    /// label -> population filter, including the all-ones entry for `B`
    filters: HashMap<String, Population>,
    /// label creation order, `B` first; keeps written files deterministic
    filter_order: Vec<String>,
    base: Option<Arc<Graph>>,
    /// materialized subgraphs; the lock guards only this map
    subgraphs: Mutex<HashMap<String, Arc<Graph>>>
}

impl GraphManager {
    /// Opens a graph definition file.
    /// # Arguments
    /// * `filename` - the GDEF file to load
    /// * `build_base` - if true, the header's reference + VCF are opened and the
    ///   base graph is constructed immediately
    /// # Errors
    /// * any `GdefError` from parsing
    /// * any error from loading the reference/VCF when `build_base` is set
    pub fn open(filename: &Path, build_base: bool) -> Result<GraphManager, Box<dyn std::error::Error>> {
        let file = std::fs::File::open(filename)?;
        Self::from_reader(BufReader::new(file), build_base)
    }

    /// Parses a graph definition from any buffered reader.
    pub fn from_reader(reader: impl BufRead, build_base: bool) -> Result<GraphManager, Box<dyn std::error::Error>> {
        let mut lines = reader.lines();
        match lines.next() {
            Some(line) => {
                if line? != GDEF_MAGIC {
                    return Err(GdefError::BadMagic.into());
                }
            },
            None => return Err(GdefError::BadMagic.into())
        };
        let header: String = match lines.next() {
            Some(line) => line?,
            None => return Err(GdefError::BadMagic.into())
        };

        let mut ref_file: String = String::new();
        let mut vcf_file: String = String::new();
        let mut region: String = String::new();
        let mut node_len: usize = 0;
        for token in header.split(GDEF_DELIM).filter(|t| !t.is_empty()) {
            let (tag, value) = token.split_once(GDEF_ASSIGN)
                .ok_or_else(|| GdefError::InvalidHeader { token: token.to_string() })?;
            match tag {
                GDEF_TAG_REF => ref_file = value.to_string(),
                GDEF_TAG_VCF => vcf_file = value.to_string(),
                GDEF_TAG_REGION => region = value.to_string(),
                GDEF_TAG_NODELEN => {
                    node_len = value.parse()
                        .map_err(|_| GdefError::InvalidHeader { token: token.to_string() })?;
                },
                // unknown tags are ignored for forward compatibility
                _ => {}
            };
        }

        // collect the raw label lines before validating widths, so the
        // expected width can come from the B entry regardless of line order
        let mut raw: Vec<(String, String)> = vec![];
        for line in lines {
            let line: String = line?;
            if line.is_empty() {
                continue;
            }
            let (label, bits) = line.split_once(GDEF_ASSIGN)
                .ok_or_else(|| GdefError::InvalidDefinition { def: line.to_string() })?;
            raw.push((label.to_string(), bits.to_string()));
        }

        let expected_width: usize = raw.iter()
            .find(|(label, _)| label == GDEF_BASE)
            .or_else(|| raw.first())
            .map(|(_, bits)| bits.len())
            .unwrap_or(0);

        let mut filters: HashMap<String, Population> = Default::default();
        let mut filter_order: Vec<String> = vec![];
        for (label, bits) in raw {
            if label != GDEF_BASE && !label.starts_with(&base_scope()) {
                return Err(GdefError::InvalidDefinition { def: label }.into());
            }
            if bits.len() != expected_width {
                return Err(GdefError::PopulationMismatch {
                    label,
                    expected: expected_width,
                    found: bits.len()
                }.into());
            }
            if filters.contains_key(&label) {
                return Err(GdefError::DuplicateLabel { label }.into());
            }
            let pop: Population = Population::from_bitstring(&bits).map_err(GdefError::from)?;
            filter_order.push(label.clone());
            filters.insert(label, pop);
        }

        let mut manager = GraphManager {
            ref_file,
            vcf_file,
            region,
            node_len,
            filters,
            filter_order,
            base: None,
            subgraphs: Mutex::new(Default::default())
        };
        if build_base {
            manager.build_base()?;
        }
        Ok(manager)
    }

    /// Generates a new definition file: seeds `B` with the all-ones population,
    /// resolves each `name=count[%]` assignment against its parent, writes the
    /// result to `out`, and returns the manager parsed back from that output.
    /// # Arguments
    /// * `ref_file` / `vcf_file` / `region` / `node_len` - header fields
    /// * `defs` - `;`- or newline-separated assignments under the implicit `B/`
    /// * `num_haplotypes` - population width; None reads `2 * num_samples` from the VCF
    /// * `out` - destination for the serialized file
    /// * `build_base` - forwarded to the re-open
    pub fn write_definitions(ref_file: &str, vcf_file: &str, region: &str, node_len: usize,
                             defs: &str, num_haplotypes: Option<usize>,
                             out: &mut dyn Write, build_base: bool) -> Result<GraphManager, Box<dyn std::error::Error>> {
        let width: usize = match num_haplotypes {
            Some(n) => n,
            None => VcfFile::open(Path::new(vcf_file))?.num_haplotypes()
        };

        let (filters, order) = define_populations(defs, width, &mut rand::thread_rng())?;

        let mut serialized: String = String::new();
        let _ = writeln!(serialized, "{GDEF_MAGIC}");
        let _ = writeln!(serialized, "{GDEF_TAG_REF}{GDEF_ASSIGN}{ref_file}{GDEF_DELIM}\
                                      {GDEF_TAG_VCF}{GDEF_ASSIGN}{vcf_file}{GDEF_DELIM}\
                                      {GDEF_TAG_REGION}{GDEF_ASSIGN}{region}{GDEF_DELIM}\
                                      {GDEF_TAG_NODELEN}{GDEF_ASSIGN}{node_len}");
        for label in order.iter() {
            let _ = writeln!(serialized, "{label}{GDEF_ASSIGN}{}", filters[label]);
        }

        out.write_all(serialized.as_bytes())?;
        out.flush()?;

        Self::from_reader(serialized.as_bytes(), build_base)
    }

    /// Builds the base graph from the header's reference and VCF.
    pub fn build_base(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let reference: ReferenceGenome = ReferenceGenome::from_fasta(Path::new(&self.ref_file))?;
        let variants: VcfFile = VcfFile::open(Path::new(&self.vcf_file))?;

        // the stored filters must match the call-set we are building against
        let width: usize = variants.num_haplotypes();
        for (label, pop) in self.filters.iter() {
            if pop.width() != width {
                return Err(GdefError::PopulationMismatch {
                    label: label.clone(),
                    expected: width,
                    found: pop.width()
                }.into());
            }
        }

        let mut builder: GraphBuilder<ReferenceGenome, VcfFile> = GraphBuilder::new(reference, variants);
        builder.region(Region::parse(&self.region)?);
        if self.node_len > 0 {
            builder.node_len(self.node_len);
        }
        self.base = Some(Arc::new(builder.build()?));
        Ok(())
    }

    pub fn base(&self) -> Result<Arc<Graph>, GdefError> {
        self.base.clone().ok_or(GdefError::NoBaseGraph)
    }

    pub fn node_len(&self) -> usize {
        self.node_len
    }

    pub fn region_str(&self) -> &str {
        &self.region
    }

    /// Every stored label, `B` first, then creation order.
    pub fn labels(&self) -> &[String] {
        &self.filter_order
    }

    /// The stored population filter for a label.
    pub fn filter(&self, label: &str) -> Result<&Population, GdefError> {
        let full: String = qualify(label);
        self.filters.get(&full).ok_or(GdefError::UnknownSubgraph { label: full })
    }

    /// Materializes (or fetches) the subgraph for `label`, deriving it from the
    /// base graph by haplotype filter. The derivation itself runs without any
    /// lock on the shared read-only base; only the cache insertion is guarded.
    /// Racing callers may derive twice, but the cache converges to one entry.
    pub fn make_subgraph(&self, label: &str) -> Result<Arc<Graph>, Box<dyn std::error::Error>> {
        let base: Arc<Graph> = self.base()?;
        if label == GDEF_BASE {
            return Ok(base);
        }
        let full: String = qualify(label);

        {
            let cache = self.subgraphs.lock().expect("subgraph cache mutex poisoned");
            if let Some(cached) = cache.get(&full) {
                return Ok(cached.clone());
            }
        }

        let filter: &Population = self.filters.get(&full)
            .ok_or(GdefError::UnknownSubgraph { label: full.clone() })?;
        debug!("Deriving subgraph {full:?} ({} haplotypes)", filter.count_ones());
        let derived: Arc<Graph> = Arc::new(base.derive(filter)?);

        let mut cache = self.subgraphs.lock().expect("subgraph cache mutex poisoned");
        let entry: &Arc<Graph> = cache.entry(full).or_insert(derived);
        Ok(entry.clone())
    }

    /// Returns an already-materialized subgraph without building anything.
    pub fn subgraph(&self, label: &str) -> Result<Arc<Graph>, GdefError> {
        if label == GDEF_BASE {
            return self.base();
        }
        let full: String = qualify(label);
        let cache = self.subgraphs.lock().expect("subgraph cache mutex poisoned");
        cache.get(&full)
            .cloned()
            .ok_or(GdefError::UnknownSubgraph { label: full })
    }

    /// Drops a materialized subgraph from the cache.
    pub fn destroy_subgraph(&self, label: &str) {
        if label == GDEF_BASE {
            return;
        }
        let full: String = qualify(label);
        let mut cache = self.subgraphs.lock().expect("subgraph cache mutex poisoned");
        cache.remove(&full);
    }

    /// Renders the definition tree in DOT format; negation labels get a dotted
    /// outline.
    pub fn definition_dot(&self, name: &str) -> String {
        let mut dot: String = String::new();
        let _ = writeln!(dot, "digraph {name} {{");
        let mut ids: HashMap<&str, usize> = Default::default();
        for (i, label) in self.filter_order.iter().enumerate() {
            let leaf: &str = leaf_of(label);
            let style: &str = if leaf.starts_with(GDEF_NEGATE) { " style=dotted" } else { "" };
            let _ = writeln!(dot, "{}[label=\"{} : {}\"{}];", i + 1, leaf, self.filters[label].count_ones(), style);
            ids.insert(label.as_str(), i + 1);
        }
        for label in self.filter_order.iter() {
            if let Some(parent) = label.rfind(GDEF_SCOPE).map(|at| &label[..at]) {
                if let (Some(&from), Some(&to)) = (ids.get(parent), ids.get(label.as_str())) {
                    let _ = writeln!(dot, "{from} -> {to};");
                }
            }
        }
        let _ = writeln!(dot, "labelloc=\"t\";\nlabel=\"Subgraph Name : Population Size\";\n}}");
        dot
    }
}

/// Prefixes a user-facing label with the base scope; `B` itself passes through.
fn qualify(label: &str) -> String {
    if label == GDEF_BASE || label.starts_with(&base_scope()) {
        label.to_string()
    } else {
        format!("{GDEF_BASE}{GDEF_SCOPE}{label}")
    }
}

fn base_scope() -> String {
    format!("{GDEF_BASE}{GDEF_SCOPE}")
}

fn leaf_of(label: &str) -> &str {
    match label.rfind(GDEF_SCOPE) {
        Some(at) => &label[at + 1..],
        None => label
    }
}

/// Resolves the user definition blob into a full filter tree.
/// Every assignment draws `count` haplotypes uniformly without replacement from
/// its parent's population (percentages resolve against the parent's popcount,
/// floored) and also creates the `~` complement sibling.
fn define_populations<R: Rng>(defs: &str, num_haplotypes: usize, rng: &mut R)
    -> Result<(HashMap<String, Population>, Vec<String>), GdefError> {
    let mut filters: HashMap<String, Population> = Default::default();
    let mut order: Vec<String> = vec![];

    filters.insert(GDEF_BASE.to_string(), Population::with_width(num_haplotypes, true));
    order.push(GDEF_BASE.to_string());

    let cleaned: String = defs.replace('\n', &GDEF_DELIM.to_string());
    for def in cleaned.split(GDEF_DELIM) {
        let def: String = def.chars().filter(|c| !c.is_whitespace()).collect();
        if def.is_empty() {
            continue;
        }
        let (name, value) = def.split_once(GDEF_ASSIGN)
            .ok_or_else(|| GdefError::InvalidDefinition { def: def.clone() })?;

        let full: String = qualify(name);
        let split_at: usize = full.rfind(GDEF_SCOPE)
            .ok_or_else(|| GdefError::InvalidDefinition { def: def.clone() })?;
        let parent_label: &str = &full[..split_at];
        let leaf: &str = &full[split_at + 1..];
        if leaf.starts_with(GDEF_NEGATE) {
            return Err(GdefError::ReservedName { label: full });
        }

        let parent: Population = filters.get(parent_label)
            .cloned()
            .ok_or_else(|| GdefError::UndefinedParent { label: parent_label.to_string() })?;
        let available: usize = parent.count_ones();

        let count: usize = match value.strip_suffix('%') {
            Some(percent) => {
                let percent: usize = percent.parse()
                    .map_err(|_| GdefError::InvalidDefinition { def: def.clone() })?;
                available * percent / 100
            },
            None => value.parse()
                .map_err(|_| GdefError::InvalidDefinition { def: def.clone() })?
        };
        if count > available {
            return Err(GdefError::InsufficientPopulation {
                label: full,
                requested: count,
                available
            });
        }

        if filters.contains_key(&full) {
            return Err(GdefError::DuplicateLabel { label: full });
        }

        // draw without replacement from the parent's set bits
        let parent_bits: Vec<usize> = parent.set_indices();
        let mut child: Population = Population::with_width(num_haplotypes, false);
        for picked in sample(rng, parent_bits.len(), count) {
            child.set(parent_bits[picked], true);
        }
        let negation: Population = child.complement_within(&parent)?;
        let negation_label: String = format!("{parent_label}{GDEF_SCOPE}{GDEF_NEGATE}{leaf}");

        order.push(full.clone());
        filters.insert(full, child);
        order.push(negation_label.clone());
        filters.insert(negation_label, negation);
    }

    Ok((filters, order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::population::Population;
    use crate::graph::Node;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn write_gdef(defs: &str, width: usize) -> (Vec<u8>, GraphManager) {
        let mut out: Vec<u8> = vec![];
        let manager = GraphManager::write_definitions(
            "ref.fa", "vars.vcf", "x:0-0", 1000, defs, Some(width), &mut out, false
        ).unwrap();
        (out, manager)
    }

    #[test]
    fn test_round_trip() {
        // three samples -> population width 6
        let (serialized, manager) = write_gdef("sub1=2;sub1/leaf=50%", 6);

        let text: String = String::from_utf8(serialized).unwrap();
        assert!(text.starts_with("@gdef\n"));
        assert!(text.contains("nodelen=1000"));

        assert_eq!(manager.labels(), &[
            "B".to_string(),
            "B/sub1".to_string(),
            "B/~sub1".to_string(),
            "B/sub1/leaf".to_string(),
            "B/sub1/~leaf".to_string()
        ]);

        let base: &Population = manager.filter("B").unwrap();
        let sub1: &Population = manager.filter("sub1").unwrap();
        let not_sub1: &Population = manager.filter("~sub1").unwrap();
        let leaf: &Population = manager.filter("sub1/leaf").unwrap();
        let not_leaf: &Population = manager.filter("sub1/~leaf").unwrap();

        assert_eq!(base.count_ones(), 6);
        assert_eq!(sub1.count_ones(), 2);
        assert_eq!(not_sub1.count_ones(), 4);
        // 50% of 2, floored
        assert_eq!(leaf.count_ones(), 1);
        assert_eq!(not_leaf.count_ones(), 1);

        // the negation rejoins its sibling into the parent
        let mut rejoined: Population = leaf.clone();
        rejoined.union_with(not_leaf).unwrap();
        assert_eq!(&rejoined, sub1);

        let mut whole: Population = sub1.clone();
        whole.union_with(not_sub1).unwrap();
        assert_eq!(&whole, base);
    }

    #[test]
    fn test_reparse_written_file() {
        let (serialized, first) = write_gdef("sub1=2", 6);
        let reparsed = GraphManager::from_reader(serialized.as_slice(), false).unwrap();
        assert_eq!(reparsed.labels(), first.labels());
        assert_eq!(reparsed.filter("sub1").unwrap(), first.filter("sub1").unwrap());
        assert_eq!(reparsed.node_len(), 1000);
        assert_eq!(reparsed.region_str(), "x:0-0");
    }

    #[test]
    fn test_bad_magic() {
        let err = GraphManager::from_reader("@notgdef\nref=a;vcf=b\n".as_bytes(), false).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_duplicate_label() {
        let text = "@gdef\nref=a;vcf=b;region=x:0-0;nodelen=5\nB=1111\nB/a=1100\nB/a=0011\n";
        let err = GraphManager::from_reader(text.as_bytes(), false).unwrap_err();
        assert!(err.to_string().contains("duplicate label"));
    }

    #[test]
    fn test_population_mismatch() {
        let text = "@gdef\nref=a;vcf=b;region=x:0-0;nodelen=5\nB=1111\nB/a=110\n";
        let err = GraphManager::from_reader(text.as_bytes(), false).unwrap_err();
        assert!(err.to_string().contains("width 3, expected 4"));
    }

    #[test]
    fn test_unknown_header_tags_ignored() {
        let text = "@gdef\nref=a;future=tag;vcf=b;region=x:0-0;nodelen=5\nB=11\n";
        let manager = GraphManager::from_reader(text.as_bytes(), false).unwrap();
        assert_eq!(manager.node_len(), 5);
    }

    #[test]
    fn test_reserved_name() {
        let mut out: Vec<u8> = vec![];
        let err = GraphManager::write_definitions(
            "r", "v", "x:0-0", 10, "~bad=2", Some(4), &mut out, false
        ).unwrap_err();
        assert!(err.to_string().contains("generated automatically"));
    }

    #[test]
    fn test_insufficient_population() {
        let mut out: Vec<u8> = vec![];
        let err = GraphManager::write_definitions(
            "r", "v", "x:0-0", 10, "big=5", Some(4), &mut out, false
        ).unwrap_err();
        assert!(err.to_string().contains("cannot draw 5"));
    }

    #[test]
    fn test_undefined_parent() {
        let mut out: Vec<u8> = vec![];
        let err = GraphManager::write_definitions(
            "r", "v", "x:0-0", 10, "missing/child=1", Some(4), &mut out, false
        ).unwrap_err();
        assert!(err.to_string().contains("not defined yet"));
    }

    #[test]
    fn test_define_populations_draw_without_replacement() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _trial in 0..20 {
            let (filters, _order) = define_populations("a=3;a/b=2", 8, &mut rng).unwrap();
            let a: &Population = &filters["B/a"];
            let b: &Population = &filters["B/a/b"];
            assert_eq!(a.count_ones(), 3);
            assert_eq!(b.count_ones(), 2);
            // children only ever draw bits their parent holds
            for i in b.set_indices() {
                assert!(a.get(i));
            }
        }
    }

    fn manual_base() -> Arc<Graph> {
        let mut g: Graph = Graph::new();
        let all = Population::with_width(2, true);
        let alt_pop = Population::from_bitstring("01").unwrap();
        let a = g.add_node(Node::new(2, b"AAA", all.clone(), true, 1.0)).unwrap();
        let r = g.add_node(Node::new(3, b"A", all.clone(), true, 0.6)).unwrap();
        let c = g.add_node(Node::new(3, b"C", alt_pop, false, 0.4)).unwrap();
        let t = g.add_node(Node::new(5, b"TT", all, true, 1.0)).unwrap();
        g.add_edge(a, r);
        g.add_edge(a, c);
        g.add_edge(r, t);
        g.add_edge(c, t);
        g.set_pop_size(2);
        g.finalize().unwrap();
        Arc::new(g)
    }

    #[test]
    fn test_make_subgraph_caching() {
        let (_serialized, mut manager) = write_gdef("sub1=1", 2);
        manager.base = Some(manual_base());

        // before materialization, subgraph() refuses to build
        assert!(matches!(manager.subgraph("sub1"), Err(GdefError::UnknownSubgraph { .. })));

        let first: Arc<Graph> = manager.make_subgraph("sub1").unwrap();
        let second: Arc<Graph> = manager.make_subgraph("sub1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &manager.subgraph("sub1").unwrap()));

        // the reference path always survives a haplotype filter
        assert!(first.member_ids().len() >= 3);

        // B is the base itself
        let base: Arc<Graph> = manager.make_subgraph("B").unwrap();
        assert!(Arc::ptr_eq(&base, &manager.base().unwrap()));

        assert!(manager.make_subgraph("nope").is_err());

        manager.destroy_subgraph("sub1");
        assert!(matches!(manager.subgraph("sub1"), Err(GdefError::UnknownSubgraph { .. })));
    }

    #[test]
    fn test_definition_dot() {
        let (_serialized, manager) = write_gdef("sub1=1", 2);
        let dot: String = manager.definition_dot("defs");
        assert!(dot.contains("digraph defs {"));
        assert!(dot.contains("\"B : 2\""));
        assert!(dot.contains("\"sub1 : 1\""));
        // negations are rendered dotted
        assert!(dot.contains("\"~sub1 : 1\" style=dotted"));
    }

    #[test]
    fn test_end_to_end_with_real_files() {
        // reference AAATTT with one phased SNV A>C at 0-based position 3
        let mut fasta = tempfile::Builder::new().suffix(".fa").tempfile().unwrap();
        writeln!(fasta, ">x\nAAATTT").unwrap();
        fasta.flush().unwrap();

        let mut vcf = tempfile::Builder::new().suffix(".vcf").tempfile().unwrap();
        write!(vcf, "##fileformat=VCFv4.2\n\
                     ##contig=<ID=x>\n\
                     ##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">\n\
                     ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
                     #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ts1\n\
                     x\t4\t.\tA\tC\t99\tPASS\tAF=0.4\tGT\t0|1\n").unwrap();
        vcf.flush().unwrap();

        let gdef_path = tempfile::Builder::new().suffix(".gdef").tempfile().unwrap();
        let mut gdef_out = std::fs::File::create(gdef_path.path()).unwrap();
        let manager = GraphManager::write_definitions(
            fasta.path().to_str().unwrap(),
            vcf.path().to_str().unwrap(),
            "x:0-0",
            3,
            "sub1=1",
            None,
            &mut gdef_out,
            true
        ).unwrap();

        let base: Arc<Graph> = manager.base().unwrap();
        let seqs: Vec<String> = base.begin().unwrap().map(|n| n.seq_str()).collect();
        assert_eq!(seqs, vec!["AAA", "A", "C", "TT"]);
        assert_eq!(base.pop_size(), 2);

        let alt = base.begin().unwrap().find(|n| !n.is_ref()).unwrap();
        assert!((alt.freq() - 0.4).abs() < 1e-6);
        assert_eq!(alt.population().to_string(), "01");

        // reopening the written file reproduces the same filters
        let reopened = GraphManager::open(gdef_path.path(), false).unwrap();
        assert_eq!(reopened.labels(), manager.labels());
        assert_eq!(reopened.filter("sub1").unwrap(), manager.filter("sub1").unwrap());

        // and the subgraph derivation runs off the freshly built base
        let sub: Arc<Graph> = manager.make_subgraph("sub1").unwrap();
        assert!(sub.member_ids().len() == 3 || sub.member_ids().len() == 4);
    }
}
