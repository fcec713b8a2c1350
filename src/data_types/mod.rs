/// Fixed-width haplotype bitset used for population filters
pub mod population;
/// Contains the ReadRecord annotation type shared by the simulator and aligner
pub mod reads;
/// Wrapper for an in-memory reference genome
pub mod reference_genome;
