
/// Scalar affine-gap read-to-graph aligner
pub mod aligner;
/// CLI functionality and checks
pub mod cli;
/// Contains multiple wrappers for useful data types in vargraph
pub mod data_types;
/// The variant-aware genome graph: nodes, edges, derivations, and iteration
pub mod graph;
/// Streams a reference and a phased variant call-set into a graph
pub mod graph_builder;
/// Graph definition files and lazy subgraph materialization
pub mod graph_manager;
/// Components for loading read records from delimited files
pub mod read_parsing;
/// Codec between base characters and the compact numeric alphabet
pub mod sequence;
/// Profile-constrained read simulation from a graph
pub mod simulator;
/// VCF/BCF decoding into the builder's variant stream interface
pub mod variant_file;
/// Contains all the various output writer functionality
pub mod writers;
