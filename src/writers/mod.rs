/// Contains the writer for annotated alignment records
pub mod alignment_writer;
/// Contains the writer for simulated reads
pub mod read_writer;
