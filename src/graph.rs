
use crate::data_types::population::Population;
use crate::sequence::{num_to_seq, seq_to_num};

#[allow(unused_imports)]
use log::{debug, trace};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id source so that every node, across every graph, gets a unique id.
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// The node storage map shared between a base graph and everything derived from it.
pub type NodeMap = HashMap<u64, Arc<Node>>;

#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("graph contains a cycle")]
    CycleDetected,
    #[error("graph must be finalized before iteration")]
    NotFinalized,
    #[error("the derivation does not include the parent graph's root")]
    InvalidDerivation
}

/// Answer to a per-haplotype membership query.
/// Reference nodes answer `Always` without consulting their bitset.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Membership {
    /// Reference nodes belong to every haplotype
    Always,
    /// The haplotype carries this allele
    Present,
    /// The haplotype does not carry this allele
    Absent
}

/// A single node of the genome graph: a numerically-coded sequence fragment
/// plus the provenance needed to filter and place it.
#[derive(Clone, Debug)]
pub struct Node {
    /// process-unique id, allocated monotonically
    id: u64,
    /// the sequence in numeric form (see crate::sequence)
    seq: Vec<u8>,
    /// 0-based inclusive reference position of the last base; for alt nodes this is
    /// the end of the REF allele they replace
    end_pos: i64,
    /// true if this node lies on the reference path
    is_ref: bool,
    /// allele frequency in [0, 1]
    af: f32,
    /// per-haplotype membership bits; all-ones for reference nodes
    population: Population
}

impl Default for Node {
    fn default() -> Node {
        Node {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::SeqCst),
            seq: vec![],
            end_pos: -1,
            is_ref: false,
            af: 1.0,
            population: Population::with_width(0, false)
        }
    }
}

impl Node {
    /// Creates a fully-specified node with a freshly allocated id.
    /// # Arguments
    /// * `end_pos` - 0-based inclusive reference position of the last base
    /// * `seq` - the ASCII sequence, converted to numeric form internally
    /// * `population` - haplotype membership bits
    /// * `is_ref` - true if the node is on the reference path
    /// * `af` - allele frequency
    pub fn new(end_pos: i64, seq: &[u8], population: Population, is_ref: bool, af: f32) -> Node {
        Node {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::SeqCst),
            seq: seq_to_num(seq),
            end_pos,
            is_ref,
            af,
            population
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Length of the stored sequence.
    pub fn length(&self) -> usize {
        self.seq.len()
    }

    pub fn end_pos(&self) -> i64 {
        self.end_pos
    }

    /// Sequence in numeric form.
    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    /// Sequence re-rendered as an upper-case base string.
    pub fn seq_str(&self) -> String {
        num_to_seq(&self.seq)
    }

    pub fn is_ref(&self) -> bool {
        self.is_ref
    }

    pub fn freq(&self) -> f32 {
        self.af
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Number of haplotypes represented by this node's bitset.
    pub fn pop_size(&self) -> usize {
        self.population.width()
    }

    /// Membership query for haplotype `index`; reference nodes answer `Always`.
    pub fn belongs(&self, index: usize) -> Membership {
        if self.is_ref {
            Membership::Always
        } else if self.population.get(index) {
            Membership::Present
        } else {
            Membership::Absent
        }
    }

    /// Overrides this node's id. Only takes effect when `id` is at least the
    /// process-wide next id, in which case the allocator is bumped past it so
    /// monotonicity is preserved.
    pub fn set_id(&mut self, id: u64) {
        let mut current = NEXT_NODE_ID.load(Ordering::SeqCst);
        while id >= current {
            match NEXT_NODE_ID.compare_exchange(current, id + 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => {
                    self.id = id;
                    return;
                },
                Err(observed) => {
                    current = observed;
                }
            };
        }
    }

    pub fn set_end_pos(&mut self, end_pos: i64) {
        self.end_pos = end_pos;
    }

    /// Replaces the sequence from an ASCII string.
    pub fn set_seq(&mut self, seq: &[u8]) {
        self.seq = seq_to_num(seq);
    }

    /// Replaces the sequence with an already-coded numeric form.
    pub fn set_seq_num(&mut self, seq: Vec<u8>) {
        self.seq = seq;
    }

    pub fn set_population(&mut self, population: Population) {
        self.population = population;
    }

    pub fn set_as_ref(&mut self) {
        self.is_ref = true;
    }

    pub fn set_not_ref(&mut self) {
        self.is_ref = false;
    }

    pub fn set_af(&mut self, af: f32) {
        self.af = af;
    }
}

/// A DAG over the genome. Nodes live in a storage map that derived graphs share
/// by handle; each graph owns its own adjacency maps and topological order.
#[derive(Clone, Default, Debug)]
pub struct Graph {
    /// root node id; the first node added unless overridden
    root: Option<u64>,
    /// shared node storage, keyed by id
    nodes: Arc<NodeMap>,
    /// maps a node id to the ids it points to
    next_map: HashMap<u64, Vec<u64>>,
    /// maps a node id to the ids that point to it
    prev_map: HashMap<u64, Vec<u64>>,
    /// cached topological order; empty means not finalized
    toposort: Vec<u64>,
    /// the order nodes were added, which is also the membership list for derived graphs
    add_order: Vec<u64>,
    /// free-form construction provenance, carried into DOT output
    desc: String,
    /// number of haplotypes in the population this graph was built from
    pop_size: usize
}

impl Graph {
    pub fn new() -> Graph {
        Default::default()
    }

    /// Adds a node to the graph, taking ownership. The first node added becomes
    /// the root. Returns `None` if a node with the same id is already present,
    /// in which case the graph is unchanged.
    pub fn add_node(&mut self, node: Node) -> Option<u64> {
        let id: u64 = node.id();
        if self.nodes.contains_key(&id) {
            return None;
        }
        if self.root.is_none() {
            self.root = Some(id);
        }
        Arc::make_mut(&mut self.nodes).insert(id, Arc::new(node));
        self.add_order.push(id);
        Some(id)
    }

    /// Creates a forward and a reverse edge between two nodes already in the graph.
    /// Returns false (and changes nothing) if either endpoint is absent.
    /// Any cached topological order is invalidated.
    pub fn add_edge(&mut self, from: u64, to: u64) -> bool {
        if !self.nodes.contains_key(&from) || !self.nodes.contains_key(&to) {
            return false;
        }
        self.next_map.entry(from).or_default().push(to);
        self.prev_map.entry(to).or_default().push(from);
        self.toposort.clear();
        true
    }

    /// Overrides the root node.
    /// # Panics
    /// * if `id` is not in the node map; that is a caller error
    pub fn set_root(&mut self, id: u64) {
        assert!(self.nodes.contains_key(&id), "root {id} is not in the node map");
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<u64> {
        self.root
    }

    pub fn node_map(&self) -> &NodeMap {
        &self.nodes
    }

    pub fn next_map(&self) -> &HashMap<u64, Vec<u64>> {
        &self.next_map
    }

    pub fn prev_map(&self) -> &HashMap<u64, Vec<u64>> {
        &self.prev_map
    }

    pub fn node(&self, id: u64) -> Option<&Arc<Node>> {
        self.nodes.get(&id)
    }

    /// Ids of the nodes that are members of *this* graph, in insertion order.
    /// For derived graphs this is a subset of the shared storage map.
    pub fn member_ids(&self) -> &[u64] {
        &self.add_order
    }

    pub fn set_desc(&mut self, desc: String) {
        self.desc = desc;
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn set_pop_size(&mut self, pop_size: usize) {
        self.pop_size = pop_size;
    }

    pub fn pop_size(&self) -> usize {
        self.pop_size
    }

    /// Total bases across this graph's member nodes.
    pub fn total_seq_len(&self) -> usize {
        self.add_order.iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| n.length())
            .sum()
    }

    /// Publishes the topological order used for iteration.
    ///
    /// Insertion order is adopted whenever it already satisfies every edge
    /// (always true for builder-produced and derived graphs). Otherwise a
    /// three-colour depth-first sort runs, starting from the root and then from
    /// any still-unvisited node in insertion order.
    /// # Errors
    /// * `CycleDetected` if the edge set admits no topological order; the graph
    ///   is left unfinalized but otherwise unchanged
    pub fn finalize(&mut self) -> Result<(), GraphError> {
        if self.insertion_order_valid() {
            self.toposort = self.add_order.clone();
            return Ok(());
        }

        debug!("Insertion order is not topological, falling back to DFS sort");
        let mut order: Vec<u64> = Vec::with_capacity(self.add_order.len());
        let mut colors: HashMap<u64, Color> = Default::default();

        let mut starts: Vec<u64> = Vec::with_capacity(self.add_order.len() + 1);
        if let Some(root) = self.root {
            starts.push(root);
        }
        starts.extend_from_slice(&self.add_order);

        for start in starts {
            self.visit(start, &mut colors, &mut order)?;
        }

        // post-order emission, so reversing yields the topological order
        order.reverse();
        self.toposort = order;
        Ok(())
    }

    /// Checks that every edge goes forward in insertion order.
    fn insertion_order_valid(&self) -> bool {
        let mut position: HashMap<u64, usize> = Default::default();
        for (i, &id) in self.add_order.iter().enumerate() {
            position.insert(id, i);
        }
        for (from, targets) in self.next_map.iter() {
            let from_pos = match position.get(from) {
                Some(&p) => p,
                None => return false
            };
            for to in targets.iter() {
                match position.get(to) {
                    Some(&to_pos) if from_pos < to_pos => {},
                    _ => return false
                };
            }
        }
        true
    }

    /// Iterative three-colour DFS from `start`. Re-entering an in-progress node
    /// means a back edge, i.e. a cycle.
    fn visit(&self, start: u64, colors: &mut HashMap<u64, Color>, order: &mut Vec<u64>) -> Result<(), GraphError> {
        if colors.get(&start).is_some() {
            return Ok(());
        }

        // explicit stack; recursion depth would be the graph length otherwise
        let mut stack: Vec<(u64, usize)> = vec![(start, 0)];
        colors.insert(start, Color::Temporary);
        while let Some(top) = stack.last_mut() {
            let node: u64 = top.0;
            let child_index: usize = top.1;
            top.1 += 1;

            let child: Option<u64> = self.next_map.get(&node)
                .and_then(|c| c.get(child_index).copied());
            match child {
                Some(c) => {
                    match colors.get(&c) {
                        None => {
                            colors.insert(c, Color::Temporary);
                            stack.push((c, 0));
                        },
                        Some(Color::Temporary) => {
                            return Err(GraphError::CycleDetected);
                        },
                        Some(Color::Permanent) => {}
                    };
                },
                None => {
                    colors.insert(node, Color::Permanent);
                    order.push(node);
                    stack.pop();
                }
            };
        }
        Ok(())
    }

    /// Starts a topological traversal.
    /// # Errors
    /// * `NotFinalized` if nodes exist but no order has been published
    pub fn begin(&self) -> Result<TopologicalIter<'_>, GraphError> {
        if self.toposort.is_empty() && !self.nodes.is_empty() {
            return Err(GraphError::NotFinalized);
        }
        Ok(TopologicalIter { graph: self, index: 0 })
    }

    /// The end-of-traversal sentinel iterator.
    pub fn end(&self) -> TopologicalIter<'_> {
        TopologicalIter { graph: self, index: self.toposort.len() }
    }

    /// Derives a subgraph containing every reference node plus every node whose
    /// haplotype bitset intersects `filter`. Edges are rebuilt over the
    /// included set; relative insertion order is preserved.
    /// # Errors
    /// * `InvalidDerivation` if the parent root is filtered out
    pub fn derive(&self, filter: &Population) -> Result<Graph, GraphError> {
        let included: Vec<u64> = self.add_order.iter()
            .copied()
            .filter(|id| {
                let node = &self.nodes[id];
                node.is_ref() || node.population().intersects(filter)
            })
            .collect();

        let mut desc: String = format!("{}\nfilter: {}", self.desc, filter);
        desc = desc.trim_start().to_string();
        self.derive_from_included(included, desc)
    }

    /// Derives the linear reference-only subgraph.
    pub fn derive_ref(&self) -> Result<Graph, GraphError> {
        let included: Vec<u64> = self.add_order.iter()
            .copied()
            .filter(|id| self.nodes[id].is_ref())
            .collect();

        let desc: String = format!("{}\nfilter: REF", self.desc).trim_start().to_string();
        self.derive_from_included(included, desc)
    }

    /// Derives the linear maximum-allele-frequency subgraph: from the root,
    /// always follow the successor with the greatest frequency. Ties keep the
    /// first successor in adjacency order, which is construction-deterministic.
    pub fn derive_maxaf(&self) -> Result<Graph, GraphError> {
        let mut included: Vec<u64> = vec![];
        if let Some(root) = self.root {
            let mut current: u64 = root;
            loop {
                included.push(current);
                let successors: &[u64] = match self.next_map.get(&current) {
                    Some(s) if !s.is_empty() => s,
                    _ => break
                };
                let mut best: u64 = successors[0];
                for &candidate in successors[1..].iter() {
                    if self.nodes[&candidate].freq() > self.nodes[&best].freq() {
                        best = candidate;
                    }
                }
                current = best;
            }
        }

        // restore insertion order for the membership list
        let member_set: HashSet<u64> = included.iter().copied().collect();
        let ordered: Vec<u64> = self.add_order.iter()
            .copied()
            .filter(|id| member_set.contains(id))
            .collect();

        let desc: String = format!("{}\nfilter: MAXAF", self.desc).trim_start().to_string();
        self.derive_from_included(ordered, desc)
    }

    /// Shared tail of all derivations: copy the storage handle, rebuild edges
    /// over the included set, keep the parent root, finalize.
    fn derive_from_included(&self, included: Vec<u64>, desc: String) -> Result<Graph, GraphError> {
        let root: u64 = match self.root {
            Some(r) if included.contains(&r) => r,
            _ => return Err(GraphError::InvalidDerivation)
        };

        let mut derived = Graph {
            root: Some(root),
            nodes: self.nodes.clone(),
            next_map: Default::default(),
            prev_map: Default::default(),
            toposort: vec![],
            add_order: included,
            desc,
            pop_size: self.pop_size
        };

        let member_set: HashSet<u64> = derived.add_order.iter().copied().collect();
        for from in derived.add_order.clone() {
            let successors: &[u64] = match self.next_map.get(&from) {
                Some(s) => s,
                None => continue
            };
            for &to in successors.iter() {
                if member_set.contains(&to) {
                    derived.next_map.entry(from).or_default().push(to);
                    derived.prev_map.entry(to).or_default().push(from);
                }
            }
        }

        derived.finalize()?;
        Ok(derived)
    }

    /// Renders the graph in DOT format for inspection.
    /// # Arguments
    /// * `name` - the digraph name
    pub fn to_dot(&self, name: &str) -> String {
        let mut dot: String = String::new();
        let _ = writeln!(dot, "// Each node is labeled with sequence, end_pos, allele_freq");
        let _ = writeln!(dot, "digraph {name} {{");
        for id in self.add_order.iter() {
            let node = &self.nodes[id];
            let _ = writeln!(dot, "{}[label=\"{}\\n{},{}\"];", id, node.seq_str(), node.end_pos(), node.freq());
        }
        for (from, targets) in self.next_map.iter() {
            for to in targets.iter() {
                let _ = writeln!(dot, "{from} -> {to};");
            }
        }
        let _ = writeln!(dot, "}}");
        dot
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Color {
    Temporary,
    Permanent
}

/// A read-only, index-based iterator over a graph's cached topological order.
/// `advance`/`retreat` saturate at the ends; equality only holds between
/// iterators bound to the same graph instance.
#[derive(Clone, Copy)]
pub struct TopologicalIter<'a> {
    graph: &'a Graph,
    index: usize
}

impl<'a> TopologicalIter<'a> {
    /// Moves one step forward, stopping at the end position.
    pub fn advance(&mut self) {
        if self.index < self.graph.toposort.len() {
            self.index += 1;
        }
    }

    /// Moves one step back, stopping at the start.
    pub fn retreat(&mut self) {
        if self.index > 0 {
            self.index -= 1;
        }
    }

    /// The node at the current position, or None at the end.
    pub fn node(&self) -> Option<&'a Arc<Node>> {
        self.graph.toposort.get(self.index)
            .and_then(|id| self.graph.nodes.get(id))
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<'a> PartialEq for TopologicalIter<'a> {
    fn eq(&self, other: &Self) -> bool {
        // iterators over different orders never compare equal
        std::ptr::eq(self.graph, other.graph) && self.index == other.index
    }
}

impl<'a> Iterator for TopologicalIter<'a> {
    type Item = &'a Arc<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.node();
        if current.is_some() {
            self.index += 1;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pop(bits: &str) -> Population {
        Population::from_bitstring(bits).unwrap()
    }

    /// The four-node diamond used throughout:
    /// ```text
    ///      CCC(ref, af 0.4)
    ///     /                \
    /// AAA                   TTT
    ///     \                /
    ///      GGG(alt, af 0.6)
    /// ```
    fn diamond() -> (Graph, Vec<u64>) {
        let mut g: Graph = Graph::new();
        let mut ids: Vec<u64> = vec![];

        ids.push(g.add_node(Node::new(2, b"AAA", pop("011"), true, 1.0)).unwrap());
        ids.push(g.add_node(Node::new(5, b"CCC", pop("001"), true, 0.4)).unwrap());
        ids.push(g.add_node(Node::new(5, b"GGG", pop("010"), false, 0.6)).unwrap());
        ids.push(g.add_node(Node::new(8, b"TTT", pop("011"), true, 1.0)).unwrap());

        assert!(g.add_edge(ids[0], ids[1]));
        assert!(g.add_edge(ids[0], ids[2]));
        assert!(g.add_edge(ids[1], ids[3]));
        assert!(g.add_edge(ids[2], ids[3]));
        (g, ids)
    }

    #[test]
    fn test_node_ids_monotone() {
        let n1: Node = Default::default();
        let n2: Node = Default::default();
        assert!(n2.id() > n1.id());
    }

    #[test]
    fn test_set_id() {
        let mut n1: Node = Default::default();
        let original: u64 = n1.id();

        // ids below the allocator are ignored
        n1.set_id(0);
        assert_eq!(n1.id(), original);

        // ids at/above the allocator take effect and bump it
        n1.set_id(original + 100);
        assert_eq!(n1.id(), original + 100);
        let n2: Node = Default::default();
        assert!(n2.id() > original + 100);
    }

    #[test]
    fn test_node_setup() {
        let mut n: Node = Default::default();
        n.set_seq(b"ACGTN");
        n.set_population(pop("001"));
        n.set_end_pos(100);

        assert_eq!(n.seq(), &[0, 1, 2, 3, 4]);
        assert_eq!(n.seq_str(), "ACGTN");
        assert_eq!(n.end_pos(), 100);
        assert!(!n.is_ref());
        assert_eq!(n.belongs(0), Membership::Absent);
        assert_eq!(n.belongs(1), Membership::Absent);
        assert_eq!(n.belongs(2), Membership::Present);

        // ref nodes answer Always regardless of their bits
        n.set_as_ref();
        for i in 0..3 {
            assert_eq!(n.belongs(i), Membership::Always);
        }
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut g: Graph = Graph::new();
        let node: Node = Node::new(0, b"A", pop("1"), true, 1.0);
        let copy: Node = node.clone();
        let id = g.add_node(node).unwrap();
        assert_eq!(g.add_node(copy), None);
        assert_eq!(g.node_map().len(), 1);
        assert_eq!(g.root(), Some(id));
    }

    #[test]
    fn test_add_edge_missing_endpoint() {
        let mut g: Graph = Graph::new();
        let id = g.add_node(Node::new(0, b"A", pop("1"), true, 1.0)).unwrap();
        assert!(!g.add_edge(id, id + 1000));
        assert!(g.next_map().is_empty());
        assert!(g.prev_map().is_empty());
    }

    #[test]
    fn test_graph_structure() {
        let (mut g, ids) = diamond();

        // iteration before finalize is an error
        assert!(matches!(g.begin(), Err(GraphError::NotFinalized)));

        g.finalize().unwrap();
        assert_eq!(g.node_map().len(), 4);
        assert_eq!(g.next_map().len(), 3);
        assert_eq!(g.prev_map().len(), 3);
        assert_eq!(g.next_map()[&ids[0]].len(), 2);
        assert_eq!(g.prev_map()[&ids[3]].len(), 2);
        assert!(!g.next_map().contains_key(&ids[3]));
        assert!(!g.prev_map().contains_key(&ids[0]));
        assert_eq!(g.root(), Some(ids[0]));
    }

    #[test]
    fn test_edge_invalidates_order() {
        let (mut g, ids) = diamond();
        g.finalize().unwrap();
        assert!(g.begin().is_ok());

        // CCC -> GGG still admits the insertion order, but requires a fresh finalize
        g.add_edge(ids[1], ids[2]);
        assert!(matches!(g.begin(), Err(GraphError::NotFinalized)));
        g.finalize().unwrap();
        assert!(g.begin().is_ok());
    }

    #[test]
    fn test_iterator_order_and_saturation() {
        let (mut g, _ids) = diamond();
        g.finalize().unwrap();

        let mut iter = g.begin().unwrap();
        assert_eq!(iter.node().unwrap().seq_str(), "AAA");
        iter.advance();
        assert!(matches!(iter.node().unwrap().seq_str().as_str(), "CCC" | "GGG"));
        iter.advance();
        assert!(matches!(iter.node().unwrap().seq_str().as_str(), "CCC" | "GGG"));
        iter.advance();
        assert_eq!(iter.node().unwrap().seq_str(), "TTT");
        iter.advance();
        assert!(iter == g.end());

        // advancing past the end saturates
        iter.advance();
        assert!(iter == g.end());
        assert!(iter.node().is_none());

        // retreating is symmetric and saturates at zero
        let mut back = g.begin().unwrap();
        back.retreat();
        assert_eq!(back.index(), 0);

        // for-loop traversal visits every node exactly once
        let visited: Vec<String> = g.begin().unwrap().map(|n| n.seq_str()).collect();
        assert_eq!(visited.len(), 4);
        assert_eq!(visited[0], "AAA");
        assert_eq!(visited[3], "TTT");
    }

    #[test]
    fn test_iterators_from_different_graphs() {
        let (mut g1, _) = diamond();
        let (mut g2, _) = diamond();
        g1.finalize().unwrap();
        g2.finalize().unwrap();
        assert!(g1.begin().unwrap() != g2.begin().unwrap());
    }

    #[test]
    fn test_derive_by_filter() {
        let (mut g, ids) = diamond();
        g.finalize().unwrap();

        // haplotype 2 only: GGG (bits 010) drops out, reference path survives
        let derived: Graph = g.derive(&pop("001")).unwrap();
        assert_eq!(derived.member_ids(), &[ids[0], ids[1], ids[3]]);
        assert_eq!(derived.node_map().len(), 4); // storage is shared, membership is not
        assert!(std::ptr::eq(derived.node_map(), g.node_map()));
        assert_eq!(derived.next_map()[&ids[0]], vec![ids[1]]);
        assert_eq!(derived.next_map()[&ids[1]], vec![ids[3]]);
        assert!(!derived.next_map().contains_key(&ids[2]));

        // every derived edge exists in the parent
        for (from, targets) in derived.next_map().iter() {
            for to in targets.iter() {
                assert!(g.next_map()[from].contains(to));
            }
        }
    }

    #[test]
    fn test_derive_keeps_intersecting_alt() {
        let (mut g, ids) = diamond();
        g.finalize().unwrap();

        // haplotype 1 carries the alt, so all four nodes survive
        let derived: Graph = g.derive(&pop("010")).unwrap();
        assert_eq!(derived.member_ids(), ids.as_slice());
        assert_eq!(derived.next_map()[&ids[0]].len(), 2);
    }

    #[test]
    fn test_derive_ref() {
        let (mut g, ids) = diamond();
        g.finalize().unwrap();

        let derived: Graph = g.derive_ref().unwrap();
        let seqs: Vec<String> = derived.begin().unwrap().map(|n| n.seq_str()).collect();
        assert_eq!(seqs, vec!["AAA", "CCC", "TTT"]);
        assert_eq!(derived.next_map()[&ids[0]], vec![ids[1]]);
    }

    #[test]
    fn test_derive_maxaf() {
        let (mut g, _ids) = diamond();
        g.finalize().unwrap();

        let derived: Graph = g.derive_maxaf().unwrap();
        let seqs: Vec<String> = derived.begin().unwrap().map(|n| n.seq_str()).collect();
        assert_eq!(seqs, vec!["AAA", "GGG", "TTT"]);

        // the result is a simple path
        for (_from, targets) in derived.next_map().iter() {
            assert_eq!(targets.len(), 1);
        }
    }

    #[test]
    fn test_maxaf_tie_break() {
        let mut g: Graph = Graph::new();
        let a = g.add_node(Node::new(0, b"A", pop("11"), true, 1.0)).unwrap();
        let b = g.add_node(Node::new(1, b"C", pop("10"), false, 0.5)).unwrap();
        let c = g.add_node(Node::new(1, b"G", pop("01"), false, 0.5)).unwrap();
        let d = g.add_node(Node::new(2, b"T", pop("11"), true, 1.0)).unwrap();
        g.add_edge(a, b);
        g.add_edge(a, c);
        g.add_edge(b, d);
        g.add_edge(c, d);
        g.finalize().unwrap();

        // equal frequencies keep the first successor in adjacency order
        let derived: Graph = g.derive_maxaf().unwrap();
        assert_eq!(derived.member_ids(), &[a, b, d]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut g: Graph = Graph::new();
        let a = g.add_node(Node::new(0, b"A", pop("1"), true, 1.0)).unwrap();
        let b = g.add_node(Node::new(1, b"C", pop("1"), true, 1.0)).unwrap();
        let c = g.add_node(Node::new(2, b"G", pop("1"), true, 1.0)).unwrap();
        g.add_edge(a, b);
        g.add_edge(b, c);
        g.add_edge(c, a);
        assert!(matches!(g.finalize(), Err(GraphError::CycleDetected)));
        assert!(matches!(g.begin(), Err(GraphError::NotFinalized)));
    }

    #[test]
    fn test_dfs_sort_out_of_order_insertion() {
        // insert nodes backwards so insertion order cannot be adopted
        let mut g: Graph = Graph::new();
        let c = g.add_node(Node::new(2, b"G", pop("1"), true, 1.0)).unwrap();
        let b = g.add_node(Node::new(1, b"C", pop("1"), true, 1.0)).unwrap();
        let a = g.add_node(Node::new(0, b"A", pop("1"), true, 1.0)).unwrap();
        g.set_root(a);
        g.add_edge(a, b);
        g.add_edge(b, c);
        g.finalize().unwrap();

        let visited: Vec<u64> = g.begin().unwrap().map(|n| n.id()).collect();
        assert_eq!(visited, vec![a, b, c]);
    }

    #[test]
    fn test_derivation_filters_root_out() {
        let mut g: Graph = Graph::new();
        let a = g.add_node(Node::new(0, b"A", pop("10"), false, 0.5)).unwrap();
        let b = g.add_node(Node::new(1, b"C", pop("01"), false, 0.5)).unwrap();
        g.add_edge(a, b);
        g.finalize().unwrap();

        // the filter keeps b but drops the root a
        assert!(matches!(g.derive(&pop("01")), Err(GraphError::InvalidDerivation)));
    }

    #[test]
    fn test_random_filters_subset_property() {
        use rand::{Rng, SeedableRng};
        use rand::rngs::StdRng;

        let (mut g, _ids) = diamond();
        g.finalize().unwrap();
        let mut rng = StdRng::seed_from_u64(0xbead);

        for _trial in 0..50 {
            // widths both narrower and wider than the node bitsets
            let width: usize = rng.gen_range(1..6);
            let mut filter: Population = Population::with_width(width, false);
            for i in 0..width {
                filter.set(i, rng.gen_bool(0.5));
            }
            let derived: Graph = match g.derive(&filter) {
                Ok(d) => d,
                Err(GraphError::InvalidDerivation) => continue,
                Err(e) => panic!("unexpected error: {e}")
            };

            // membership matches the defining predicate
            for id in g.member_ids() {
                let node = &g.node_map()[id];
                let expected: bool = node.is_ref() || node.population().intersects(&filter);
                assert_eq!(derived.member_ids().contains(id), expected);
            }

            // adjacency is a subset of the parent's
            for (from, targets) in derived.next_map().iter() {
                for to in targets.iter() {
                    assert!(g.next_map()[from].contains(to));
                    assert!(derived.member_ids().contains(from));
                    assert!(derived.member_ids().contains(to));
                }
            }
        }
    }

    #[test]
    fn test_to_dot() {
        let (mut g, ids) = diamond();
        g.finalize().unwrap();
        let dot: String = g.to_dot("g");
        assert!(dot.starts_with("// Each node"));
        assert!(dot.contains("digraph g {"));
        assert!(dot.contains(&format!("{} -> {};", ids[0], ids[1])));
        assert!(dot.contains("GGG"));
    }
}
