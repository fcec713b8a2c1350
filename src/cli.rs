
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

#[derive(Clone, Parser)]
#[clap(author, version, about)]
pub struct Settings {
    #[clap(subcommand)]
    pub command: Command,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(global = true)]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

#[derive(Clone, Subcommand)]
pub enum Command {
    /// Write a graph definition file describing a base graph and named subgraph filters
    Define(DefineSettings),
    /// Simulate reads from subgraphs of a graph definition
    Sim(SimSettings),
    /// Align reads to a subgraph of a graph definition
    Align(AlignSettings)
}

#[derive(Args, Clone)]
pub struct DefineSettings {
    /// Reference FASTA file
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reference")]
    #[clap(value_name = "FASTA")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reference_filename: PathBuf,

    /// Input variant file in VCF/BCF format
    #[clap(required = true)]
    #[clap(short = 'c')]
    #[clap(long = "vcf")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub vcf_filename: PathBuf,

    /// Output graph definition file
    #[clap(required = true)]
    #[clap(short = 't')]
    #[clap(long = "out")]
    #[clap(value_name = "GDEF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_filename: PathBuf,

    /// Region to build over, 0-based half-open; hi=0 means end of contig
    #[clap(required = true)]
    #[clap(short = 'g')]
    #[clap(long = "region")]
    #[clap(value_name = "CHR:LO-HI")]
    #[clap(help_heading = Some("Graph Construction"))]
    pub region: String,

    /// Maximum reference node length
    #[clap(short = 'l')]
    #[clap(long = "node-len")]
    #[clap(value_name = "LENGTH")]
    #[clap(default_value = "1000000")]
    #[clap(help_heading = Some("Graph Construction"))]
    pub node_len: usize,

    /// Subgraph definitions, e.g. "sub1=10;sub1/x=50%" (';' or newline separated)
    #[clap(short = 'd')]
    #[clap(long = "defs")]
    #[clap(value_name = "DEFS")]
    #[clap(default_value = "")]
    #[clap(help_heading = Some("Graph Construction"))]
    pub definitions: String,

    /// Write the definition tree in DOT format to this file (optional)
    #[clap(long = "dot")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub dot_filename: Option<PathBuf>
}

#[derive(Args, Clone)]
pub struct SimSettings {
    /// Input graph definition file
    #[clap(required = true)]
    #[clap(short = 'g')]
    #[clap(long = "gdef")]
    #[clap(value_name = "GDEF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub gdef_filename: PathBuf,

    /// Output read file (.csv for comma, anything else for tab)
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "out")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_filename: PathBuf,

    /// Number of reads to simulate per subgraph
    #[clap(short = 'n')]
    #[clap(long = "num-reads")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "1000")]
    pub num_reads: usize,

    /// Subgraph labels to simulate from, comma separated
    #[clap(short = 's')]
    #[clap(long = "subgraphs")]
    #[clap(value_name = "LABELS")]
    #[clap(default_value = "B")]
    #[clap(value_delimiter = ',')]
    pub subgraphs: Vec<String>,

    /// Read length
    #[clap(short = 'l')]
    #[clap(long = "rlen")]
    #[clap(value_name = "LENGTH")]
    #[clap(default_value = "50")]
    #[clap(help_heading = Some("Read Profile"))]
    pub read_len: usize,

    /// Substitution errors per read (count, or rate with --rate)
    #[clap(short = 'm')]
    #[clap(long = "mut")]
    #[clap(value_name = "N")]
    #[clap(default_value = "0")]
    #[clap(help_heading = Some("Read Profile"))]
    pub mutations: f32,

    /// Indel errors per read (count, or rate with --rate)
    #[clap(short = 'i')]
    #[clap(long = "indel")]
    #[clap(value_name = "N")]
    #[clap(default_value = "0")]
    #[clap(help_heading = Some("Read Profile"))]
    pub indels: f32,

    /// Interpret --mut and --indel as per-base rates
    #[clap(long = "rate")]
    #[clap(help_heading = Some("Read Profile"))]
    pub use_rate: bool,

    /// Required variant nodes per read; -1 for any
    #[clap(long = "vnodes")]
    #[clap(value_name = "N")]
    #[clap(default_value = "-1")]
    #[clap(allow_hyphen_values = true)]
    #[clap(help_heading = Some("Read Profile"))]
    pub var_nodes: i64,

    /// Required variant bases per read; -1 for any
    #[clap(long = "vbases")]
    #[clap(value_name = "N")]
    #[clap(default_value = "-1")]
    #[clap(allow_hyphen_values = true)]
    #[clap(help_heading = Some("Read Profile"))]
    pub var_bases: i64,

    /// RNG seed for reproducible read sets
    #[clap(long = "seed")]
    #[clap(value_name = "SEED")]
    pub seed: Option<u64>
}

#[derive(Args, Clone)]
pub struct AlignSettings {
    /// Input graph definition file
    #[clap(required = true)]
    #[clap(short = 'g')]
    #[clap(long = "gdef")]
    #[clap(value_name = "GDEF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub gdef_filename: PathBuf,

    /// Input read file with a header row (.csv for comma, anything else for tab)
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reads")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reads_filename: PathBuf,

    /// Output alignment file (.csv for comma, anything else for tab)
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "out")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_filename: PathBuf,

    /// Target subgraph label
    #[clap(short = 's')]
    #[clap(long = "subgraph")]
    #[clap(value_name = "LABEL")]
    #[clap(default_value = "B")]
    pub subgraph: String,

    /// Maximum read length
    #[clap(short = 'l')]
    #[clap(long = "rlen")]
    #[clap(value_name = "LENGTH")]
    #[clap(default_value = "50")]
    #[clap(help_heading = Some("Scoring"))]
    pub read_len: usize,

    /// Match score
    #[clap(short = 'm')]
    #[clap(long = "match")]
    #[clap(value_name = "N")]
    #[clap(default_value = "2")]
    #[clap(help_heading = Some("Scoring"))]
    pub match_score: i32,

    /// Mismatch penalty
    #[clap(short = 'n')]
    #[clap(long = "mismatch")]
    #[clap(value_name = "N")]
    #[clap(default_value = "2")]
    #[clap(help_heading = Some("Scoring"))]
    pub mismatch: i32,

    /// Gap opening penalty
    #[clap(short = 'p')]
    #[clap(long = "gap-open")]
    #[clap(value_name = "N")]
    #[clap(default_value = "3")]
    #[clap(help_heading = Some("Scoring"))]
    pub gap_open: i32,

    /// Gap extension penalty
    #[clap(short = 'e')]
    #[clap(long = "gap-extend")]
    #[clap(value_name = "N")]
    #[clap(default_value = "1")]
    #[clap(help_heading = Some("Scoring"))]
    pub gap_extend: i32,

    /// Perform end-to-end alignment instead of local
    #[clap(short = 'x')]
    #[clap(long = "endtoend")]
    #[clap(help_heading = Some("Scoring"))]
    pub end_to_end: bool,

    /// Count a hit as correct if within read_len/N of the target
    #[clap(short = 'c')]
    #[clap(long = "tolerance")]
    #[clap(value_name = "N")]
    #[clap(default_value = "5")]
    #[clap(help_heading = Some("Scoring"))]
    pub tolerance: usize,

    /// Partition reads into chunks with max size N
    #[clap(short = 'u')]
    #[clap(long = "chunk")]
    #[clap(value_name = "N")]
    #[clap(default_value = "2048")]
    pub chunk_size: usize,

    /// Number of alignment threads
    #[clap(short = 'j')]
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
fn check_required_filename(filename: &Path, label: &str) {
    if !filename.exists() {
        error!("{} does not exist: \"{}\"", label, filename.display());
        std::process::exit(exitcode::NOINPUT);
    } else {
        info!("{}: \"{}\"", label, filename.display());
    }
}

pub fn get_raw_settings() -> Settings {
    Settings::parse()
}

/// Validates the define inputs and logs the effective settings.
pub fn check_define_settings(settings: DefineSettings) -> DefineSettings {
    check_required_filename(&settings.reference_filename, "Reference file");
    check_required_filename(&settings.vcf_filename, "Variant file");

    if settings.node_len == 0 {
        error!("Maximum node length must be >= 1");
        std::process::exit(exitcode::USAGE);
    }

    info!("Region: {}", settings.region);
    info!("Maximum node length: {}", settings.node_len);
    if settings.definitions.is_empty() {
        info!("Subgraph definitions: none (base graph only)");
    } else {
        info!("Subgraph definitions: {}", settings.definitions);
    }
    settings
}

/// Validates the sim inputs and logs the effective settings.
pub fn check_sim_settings(settings: SimSettings) -> SimSettings {
    check_required_filename(&settings.gdef_filename, "Graph definition file");

    if settings.read_len == 0 {
        error!("Read length must be >= 1");
        std::process::exit(exitcode::USAGE);
    }
    if settings.var_nodes == 0 && settings.var_bases > 0 {
        error!("Conflicting profile: --vnodes 0 with --vbases > 0");
        std::process::exit(exitcode::USAGE);
    }

    info!("Reads per subgraph: {}", settings.num_reads);
    info!("Subgraphs: {:?}", settings.subgraphs);
    info!("Read length: {}", settings.read_len);
    if settings.use_rate {
        info!("Substitution rate: {}", settings.mutations);
        info!("Indel rate: {}", settings.indels);
    } else {
        info!("Substitutions per read: {}", settings.mutations);
        info!("Indels per read: {}", settings.indels);
    }
    match settings.seed {
        Some(seed) => info!("RNG seed: {}", seed),
        None => info!("RNG seed: from entropy")
    };
    settings
}

/// Validates the align inputs and logs the effective settings.
pub fn check_align_settings(mut settings: AlignSettings) -> AlignSettings {
    check_required_filename(&settings.gdef_filename, "Graph definition file");
    check_required_filename(&settings.reads_filename, "Read file");

    // the aligner itself re-checks this, but failing before the graph is built saves minutes
    if settings.read_len as i64 * settings.match_score as i64 > 255 {
        error!("Score accumulator overflow: read length {} * match score {} > 255",
               settings.read_len, settings.match_score);
        std::process::exit(exitcode::USAGE);
    }
    if settings.tolerance == 0 {
        warn!("Tolerance 0 requires exact position hits");
        settings.tolerance = 1;
    }
    if settings.chunk_size == 0 {
        settings.chunk_size = 1;
    }
    if settings.threads == 0 {
        settings.threads = 1;
    }

    info!("Target subgraph: {}", settings.subgraph);
    info!("Match={} Mismatch={} GapOpen={} GapExtend={} MaxReadLen={} CorrectnessTol={}",
          settings.match_score, settings.mismatch, settings.gap_open, settings.gap_extend,
          settings.read_len, settings.tolerance);
    info!("Alignment mode: {}", if settings.end_to_end { "end-to-end" } else { "local" });
    info!("Chunk size: {}", settings.chunk_size);
    info!("Alignment threads: {}", settings.threads);
    settings
}
