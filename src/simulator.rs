
use crate::data_types::population::Population;
use crate::data_types::reads::{ReadRecord, UNSET};
use crate::graph::{Graph, Node};
use crate::sequence::num_to_seq;

#[allow(unused_imports)]
use log::{debug, trace, warn};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use std::sync::Arc;

/// Give up on a profile after this many rejected walks.
const ABORT_AFTER: usize = 1000000;

#[derive(thiserror::Error, Debug)]
pub enum SimulatorError {
    #[error("conflicting profile: var_nodes = 0 but var_bases > 0")]
    ProfileConflict,
    #[error("invalid profile token {token:?}")]
    InvalidProfile { token: String },
    #[error("graph has no sequence to sample reads from")]
    EmptyGraph
}

/// Controls the reads a simulator produces. `None` constraints accept anything.
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    /// nominal read length
    pub read_len: usize,
    /// interpret `mutations`/`indels` as per-base rates instead of exact counts
    pub use_rate: bool,
    /// substitution errors to introduce (count, or rate when `use_rate`)
    pub mutations: f32,
    /// indel errors to introduce (count, or rate when `use_rate`)
    pub indels: f32,
    /// required number of variant nodes traversed
    pub var_nodes: Option<usize>,
    /// required number of bases drawn from variant nodes
    pub var_bases: Option<usize>
}

impl Default for Profile {
    fn default() -> Profile {
        Profile {
            read_len: 50,
            use_rate: false,
            mutations: 0.0,
            indels: 0.0,
            var_nodes: None,
            var_bases: None
        }
    }
}

impl Profile {
    /// Rejects profiles that can never be satisfied.
    pub fn validate(&self) -> Result<(), SimulatorError> {
        if self.var_nodes == Some(0) && self.var_bases.unwrap_or(0) > 0 {
            return Err(SimulatorError::ProfileConflict);
        }
        Ok(())
    }

    /// Parses the `len=N;mut=N;indel=N;vnode=N;vbase=N;rand=B` form.
    /// Unlisted fields keep their defaults; -1 means unconstrained.
    pub fn parse(text: &str) -> Result<Profile, SimulatorError> {
        let mut profile: Profile = Default::default();
        for token in text.split(';').filter(|t| !t.is_empty()) {
            let err = || SimulatorError::InvalidProfile { token: token.to_string() };
            let (tag, value) = token.split_once('=').ok_or_else(err)?;
            match tag.trim() {
                "len" => profile.read_len = value.parse().map_err(|_| err())?,
                "mut" => profile.mutations = value.parse().map_err(|_| err())?,
                "indel" => profile.indels = value.parse().map_err(|_| err())?,
                "vnode" => profile.var_nodes = parse_constraint(value).ok_or_else(err)?,
                "vbase" => profile.var_bases = parse_constraint(value).ok_or_else(err)?,
                "rand" => profile.use_rate = value.parse().map_err(|_| err())?,
                _ => return Err(err())
            };
        }
        profile.validate()?;
        Ok(profile)
    }
}

/// -1 decodes as "any"; anything else must be a non-negative count.
fn parse_constraint(value: &str) -> Option<Option<usize>> {
    if value.trim() == "-1" {
        Some(None)
    } else {
        value.trim().parse().ok().map(Some)
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let constraint = |c: Option<usize>| match c {
            Some(v) => v as i64,
            None => UNSET
        };
        write!(f, "len={};mut={};indel={};vnode={};vbase={};rand={}",
               self.read_len, self.mutations, self.indels,
               constraint(self.var_nodes), constraint(self.var_bases), self.use_rate)
    }
}

/// Samples reads from a finalized graph. A starting node is drawn weighted by
/// sequence length, the walk continues along uniformly-random successors until
/// the read is full, and the result is kept only if it satisfies the profile.
pub struct ReadSimulator<'a> {
    graph: &'a Graph,
    profile: Profile,
    /// stamped onto every produced record
    subgraph_label: String,
    /// ids of the sampleable (non-empty) member nodes
    node_ids: Vec<u64>,
    /// running total of sequence lengths, parallel to `node_ids`
    cumulative: Vec<u64>,
    total_bases: u64,
    rng: StdRng,
    /// names reads sequentially per simulator
    produced: usize
}

impl<'a> ReadSimulator<'a> {
    /// Creates a simulator over a finalized graph.
    /// # Arguments
    /// * `graph` - the (sub)graph to sample from
    /// * `profile` - the constraints every emitted read must satisfy
    /// * `subgraph_label` - origin label stamped on each record
    /// * `seed` - RNG seed; None derives one from the OS
    /// # Errors
    /// * `ProfileConflict` for unsatisfiable profiles
    /// * `EmptyGraph` when there is no sequence to sample
    pub fn new(graph: &'a Graph, profile: Profile, subgraph_label: &str, seed: Option<u64>)
        -> Result<ReadSimulator<'a>, SimulatorError> {
        profile.validate()?;

        let mut node_ids: Vec<u64> = vec![];
        let mut cumulative: Vec<u64> = vec![];
        let mut total_bases: u64 = 0;
        for &id in graph.member_ids() {
            let length: u64 = match graph.node(id) {
                Some(node) => node.length() as u64,
                None => 0
            };
            if length == 0 {
                continue;
            }
            total_bases += length;
            node_ids.push(id);
            cumulative.push(total_bases);
        }
        if total_bases == 0 {
            return Err(SimulatorError::EmptyGraph);
        }

        let rng: StdRng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy()
        };
        Ok(ReadSimulator {
            graph,
            profile,
            subgraph_label: subgraph_label.to_string(),
            node_ids,
            cumulative,
            total_bases,
            rng,
            produced: 0
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Generates the next read, or None once the attempt budget is exhausted
    /// without satisfying the profile.
    pub fn update_read(&mut self) -> Option<ReadRecord> {
        for _attempt in 0..ABORT_AFTER {
            if let Some(read) = self.try_walk() {
                self.produced += 1;
                return Some(read);
            }
        }
        warn!("Gave up on profile [{}] after {ABORT_AFTER} attempts", self.profile);
        None
    }

    /// Generates up to `size` reads; the batch may come up short if the profile
    /// is hard to satisfy on this graph.
    pub fn get_batch(&mut self, size: usize) -> Vec<ReadRecord> {
        let mut batch: Vec<ReadRecord> = Vec::with_capacity(size);
        for _ in 0..size {
            match self.update_read() {
                Some(read) => batch.push(read),
                None => break
            };
        }
        batch
    }

    /// A node id drawn weighted by sequence length.
    fn random_node(&mut self) -> u64 {
        let point: u64 = self.rng.gen_range(0..self.total_bases);
        let index: usize = self.cumulative.partition_point(|&c| c <= point);
        self.node_ids[index]
    }

    /// One walk attempt; None when the walk dies early or misses the profile.
    fn try_walk(&mut self) -> Option<ReadRecord> {
        let read_len: usize = self.profile.read_len;
        let start_id: u64 = self.random_node();
        let start: &Arc<Node> = self.graph.node(start_id)?;
        let mut offset: usize = self.rng.gen_range(0..start.length());

        let mut sequence: Vec<u8> = Vec::with_capacity(read_len);
        let mut var_nodes: usize = 0;
        let mut var_bases: usize = 0;
        let mut carriers: Option<Population> = None;
        let mut current: &Arc<Node> = start;
        let mut end_pos: i64;

        loop {
            let take: usize = (read_len - sequence.len()).min(current.length() - offset);
            sequence.extend_from_slice(&current.seq()[offset..offset + take]);
            end_pos = current.end_pos() - (current.length() as i64 - 1 - (offset + take - 1) as i64);

            if !current.is_ref() {
                var_nodes += 1;
                var_bases += take;
                match carriers {
                    None => carriers = Some(current.population().clone()),
                    Some(ref mut c) => {
                        if c.intersect_with(current.population()).is_err() {
                            return None;
                        }
                    }
                };
            }

            if sequence.len() == read_len {
                break;
            }

            // walk into a uniformly-random successor
            let successors: &Vec<u64> = self.graph.next_map().get(&current.id())?;
            let next_id: u64 = successors[self.rng.gen_range(0..successors.len())];
            current = self.graph.node(next_id)?;
            offset = 0;
        }

        // enforce the profile before spending effort on errors
        if let Some(required) = self.profile.var_nodes {
            if var_nodes != required {
                return None;
            }
        }
        if let Some(required) = self.profile.var_bases {
            if var_bases != required {
                return None;
            }
        }

        // a read through variant nodes must name a haplotype that carries all of them
        let indiv: i64 = match carriers {
            None => UNSET,
            Some(c) => {
                let set: Vec<usize> = c.set_indices();
                if set.is_empty() {
                    return None;
                }
                set[self.rng.gen_range(0..set.len())] as i64
            }
        };

        let original: String = num_to_seq(&sequence);
        let (mutated, sub_errors, indel_errors) = self.apply_errors(sequence);

        Some(ReadRecord {
            name: format!("sim{}", self.produced),
            sequence: num_to_seq(&mutated),
            original,
            subgraph: self.subgraph_label.clone(),
            end_pos,
            indiv,
            sub_errors: sub_errors as i64,
            indel_errors: indel_errors as i64,
            var_nodes: var_nodes as i64,
            var_bases: var_bases as i64
        })
    }

    /// Introduces substitution and indel errors per the profile, returning the
    /// mutated sequence and the actual error counts.
    fn apply_errors(&mut self, mut sequence: Vec<u8>) -> (Vec<u8>, usize, usize) {
        let mut sub_errors: usize = 0;
        let mut indel_errors: usize = 0;

        if self.profile.use_rate {
            // per-base coin flips
            for i in 0..sequence.len() {
                if self.rng.gen::<f32>() < self.profile.mutations {
                    sequence[i] = self.substitute(sequence[i]);
                    sub_errors += 1;
                }
            }
            let mut i: usize = 0;
            while i < sequence.len() {
                if self.rng.gen::<f32>() < self.profile.indels {
                    indel_errors += 1;
                    if self.rng.gen_bool(0.5) {
                        sequence.insert(i, self.rng.gen_range(0..4));
                        i += 1;
                    } else {
                        sequence.remove(i);
                        continue;
                    }
                }
                i += 1;
            }
        } else {
            // exact counts at distinct positions
            let num_subs: usize = (self.profile.mutations as usize).min(sequence.len());
            for picked in sample(&mut self.rng, sequence.len(), num_subs) {
                sequence[picked] = self.substitute(sequence[picked]);
                sub_errors += 1;
            }
            for _ in 0..self.profile.indels as usize {
                indel_errors += 1;
                if sequence.is_empty() || self.rng.gen_bool(0.5) {
                    let at: usize = self.rng.gen_range(0..=sequence.len());
                    sequence.insert(at, self.rng.gen_range(0..4));
                } else {
                    let at: usize = self.rng.gen_range(0..sequence.len());
                    sequence.remove(at);
                }
            }
        }

        (sequence, sub_errors, indel_errors)
    }

    /// A uniformly random base different from `base`.
    fn substitute(&mut self, base: u8) -> u8 {
        loop {
            let candidate: u8 = self.rng.gen_range(0..4);
            if candidate != base {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn pop(bits: &str) -> Population {
        Population::from_bitstring(bits).unwrap()
    }

    /// AAA -> { A(ref) | C(alt, hap 1) } -> TT, the usual SNV graph.
    fn snv_graph() -> Graph {
        let mut g: Graph = Graph::new();
        let a = g.add_node(Node::new(2, b"AAA", pop("11"), true, 1.0)).unwrap();
        let r = g.add_node(Node::new(3, b"A", pop("11"), true, 0.6)).unwrap();
        let c = g.add_node(Node::new(3, b"C", pop("01"), false, 0.4)).unwrap();
        let t = g.add_node(Node::new(5, b"TT", pop("11"), true, 1.0)).unwrap();
        g.add_edge(a, r);
        g.add_edge(a, c);
        g.add_edge(r, t);
        g.add_edge(c, t);
        g.set_pop_size(2);
        g.finalize().unwrap();
        g
    }

    #[test]
    fn test_profile_conflict() {
        let profile = Profile {
            var_nodes: Some(0),
            var_bases: Some(2),
            ..Default::default()
        };
        assert!(matches!(profile.validate(), Err(SimulatorError::ProfileConflict)));

        let g: Graph = snv_graph();
        assert!(matches!(
            ReadSimulator::new(&g, profile, "B", Some(0)),
            Err(SimulatorError::ProfileConflict)
        ));
    }

    #[test]
    fn test_profile_round_trip() {
        let profile = Profile {
            read_len: 100,
            use_rate: true,
            mutations: 0.02,
            indels: 0.01,
            var_nodes: Some(2),
            var_bases: None
        };
        let text: String = profile.to_string();
        assert_eq!(text, "len=100;mut=0.02;indel=0.01;vnode=2;vbase=-1;rand=true");
        assert_eq!(Profile::parse(&text).unwrap(), profile);

        assert!(Profile::parse("len=abc").is_err());
        assert!(Profile::parse("len=5;bogus=1").is_err());
        // the conflict is also caught at parse time
        assert!(Profile::parse("vnode=0;vbase=3").is_err());
    }

    #[test]
    fn test_empty_graph() {
        let mut g: Graph = Graph::new();
        g.finalize().unwrap();
        let result = ReadSimulator::new(&g, Default::default(), "B", Some(0));
        assert!(matches!(result, Err(SimulatorError::EmptyGraph)));
    }

    #[test]
    fn test_error_free_reads_lie_on_the_graph() {
        let g: Graph = snv_graph();
        let profile = Profile {
            read_len: 4,
            ..Default::default()
        };
        let mut sim = ReadSimulator::new(&g, profile, "B", Some(42)).unwrap();

        // every error-free read is a substring of one of the two path spellings
        let ref_path: &str = "AAAATT";
        let alt_path: &str = "AAACTT";
        for read in sim.get_batch(50) {
            assert_eq!(read.sequence.len(), 4);
            assert_eq!(read.sequence, read.original);
            assert_eq!(read.sub_errors, 0);
            assert_eq!(read.indel_errors, 0);
            assert_eq!(read.subgraph, "B");
            assert!(ref_path.contains(&read.sequence) || alt_path.contains(&read.sequence),
                    "read {:?} is not a walk of the graph", read.sequence);

            if read.sequence.contains('C') {
                assert_eq!(read.var_nodes, 1);
                assert_eq!(read.var_bases, 1);
                // only haplotype 1 carries the alt
                assert_eq!(read.indiv, 1);
            } else if read.var_nodes == 0 {
                assert_eq!(read.indiv, UNSET);
            }
        }
    }

    #[test]
    fn test_var_node_constraint() {
        let g: Graph = snv_graph();
        let profile = Profile {
            read_len: 3,
            var_nodes: Some(1),
            ..Default::default()
        };
        let mut sim = ReadSimulator::new(&g, profile, "B", Some(7)).unwrap();
        for read in sim.get_batch(25) {
            assert_eq!(read.var_nodes, 1);
            assert!(read.sequence.contains('C'));
        }
    }

    #[test]
    fn test_exact_substitution_count() {
        let g: Graph = snv_graph();
        let profile = Profile {
            read_len: 5,
            mutations: 2.0,
            ..Default::default()
        };
        let mut sim = ReadSimulator::new(&g, profile, "B", Some(99)).unwrap();
        for read in sim.get_batch(25) {
            assert_eq!(read.sub_errors, 2);
            assert_eq!(read.sequence.len(), read.original.len());
            let hamming: usize = read.sequence.bytes()
                .zip(read.original.bytes())
                .filter(|(a, b)| a != b)
                .count();
            assert_eq!(hamming, 2);
        }
    }

    #[test]
    fn test_exact_indel_count() {
        let g: Graph = snv_graph();
        let profile = Profile {
            read_len: 5,
            indels: 1.0,
            ..Default::default()
        };
        let mut sim = ReadSimulator::new(&g, profile, "B", Some(11)).unwrap();
        for read in sim.get_batch(25) {
            assert_eq!(read.indel_errors, 1);
            let diff: i64 = read.sequence.len() as i64 - read.original.len() as i64;
            assert_eq!(diff.abs(), 1);
        }
    }

    #[test]
    fn test_end_pos_matches_read() {
        let g: Graph = snv_graph();
        let profile = Profile {
            read_len: 2,
            var_nodes: Some(0),
            ..Default::default()
        };
        let mut sim = ReadSimulator::new(&g, profile, "B", Some(3)).unwrap();

        // reference-only reads must spell the reference at their claimed position
        let reference: &str = "AAAATT";
        for read in sim.get_batch(25) {
            let end: usize = read.end_pos as usize;
            assert!(end >= 1 && end < reference.len());
            assert_eq!(&reference[end - 1..=end], read.sequence.as_str());
        }
    }
}
