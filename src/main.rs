
use vargraph::aligner::{Aligner, Alignment, ScoreParams, ScoringMode};
use vargraph::cli::{AlignSettings, Command, DefineSettings, Settings, SimSettings,
                    check_align_settings, check_define_settings, check_sim_settings, get_raw_settings};
use vargraph::data_types::reads::ReadRecord;
use vargraph::graph_manager::GraphManager;
use vargraph::read_parsing::read_records;
use vargraph::simulator::{Profile, ReadSimulator};
use vargraph::writers::alignment_writer::AlignmentWriter;
use vargraph::writers::read_writer::ReadWriter;

use log::{LevelFilter, debug, error, info, warn};
use std::sync::{Arc, mpsc};
use std::time::Instant;
use threadpool::ThreadPool;

fn main() {
    // get the settings
    let settings: Settings = get_raw_settings();
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };

    // immediately setup logging first
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    match settings.command {
        Command::Define(define_settings) => run_define(check_define_settings(define_settings)),
        Command::Sim(sim_settings) => run_sim(check_sim_settings(sim_settings)),
        Command::Align(align_settings) => run_align(check_align_settings(align_settings))
    };
}

/// Builds the filter tree and writes the graph definition file.
fn run_define(settings: DefineSettings) {
    let mut out_file: std::fs::File = match std::fs::File::create(&settings.output_filename) {
        Ok(f) => f,
        Err(e) => {
            error!("Error while creating {:?}: {}", settings.output_filename, e);
            std::process::exit(exitcode::IOERR);
        }
    };

    let manager: GraphManager = match GraphManager::write_definitions(
        &settings.reference_filename.to_string_lossy(),
        &settings.vcf_filename.to_string_lossy(),
        &settings.region,
        settings.node_len,
        &settings.definitions,
        None,
        &mut out_file,
        false
    ) {
        Ok(m) => m,
        Err(e) => {
            error!("Error while writing graph definition: {}", e);
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    info!("Wrote {} filters to {:?}", manager.labels().len(), settings.output_filename);

    if let Some(ref dot_filename) = settings.dot_filename {
        match std::fs::write(dot_filename, manager.definition_dot("definitions")) {
            Ok(()) => info!("Wrote definition tree to {:?}", dot_filename),
            Err(e) => {
                error!("Error while writing {:?}: {}", dot_filename, e);
                std::process::exit(exitcode::IOERR);
            }
        };
    }
}

/// Builds the base graph and simulates reads from each requested subgraph.
fn run_sim(settings: SimSettings) {
    let start_time: Instant = Instant::now();
    info!("Loading graphs...");
    let manager: GraphManager = match GraphManager::open(&settings.gdef_filename, true) {
        Ok(m) => m,
        Err(e) => {
            error!("Error while loading graph definition: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    match manager.base() {
        Ok(base) => info!("Loaded base graph ({} nodes, {} bp) in {:.3}s",
                          base.member_ids().len(), base.total_seq_len(), start_time.elapsed().as_secs_f64()),
        Err(e) => {
            error!("Error while loading graph definition: {}", e);
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    let profile: Profile = Profile {
        read_len: settings.read_len,
        use_rate: settings.use_rate,
        mutations: settings.mutations,
        indels: settings.indels,
        var_nodes: usize::try_from(settings.var_nodes).ok(),
        var_bases: usize::try_from(settings.var_bases).ok()
    };
    info!("Read profile: [{}]", profile);

    let mut writer: ReadWriter = match ReadWriter::new(&settings.output_filename) {
        Ok(w) => w,
        Err(e) => {
            error!("Error during read writer creation: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    let mut total_reads: usize = 0;
    for (subgraph_index, label) in settings.subgraphs.iter().enumerate() {
        let subgraph = match manager.make_subgraph(label) {
            Ok(s) => s,
            Err(e) => {
                error!("Error while materializing subgraph {:?}: {}", label, e);
                std::process::exit(exitcode::SOFTWARE);
            }
        };
        debug!("Subgraph {:?}: {} nodes", label, subgraph.member_ids().len());

        // each subgraph gets its own deterministic stream when seeded
        let seed: Option<u64> = settings.seed.map(|s| s.wrapping_add(subgraph_index as u64));
        let mut simulator = match ReadSimulator::new(&subgraph, profile.clone(), label, seed) {
            Ok(s) => s,
            Err(e) => {
                error!("Error during simulator creation for {:?}: {}", label, e);
                std::process::exit(exitcode::SOFTWARE);
            }
        };

        let batch: Vec<ReadRecord> = simulator.get_batch(settings.num_reads);
        if batch.len() < settings.num_reads {
            warn!("Only generated {} of {} reads for {:?}; the profile may be unsatisfiable on this subgraph",
                  batch.len(), settings.num_reads, label);
        }
        for read in batch.iter() {
            if let Err(e) = writer.write_read(read) {
                error!("Error while writing read: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        }
        total_reads += batch.len();
    }

    if let Err(e) = writer.finish() {
        error!("Error while finishing read file: {}", e);
        std::process::exit(exitcode::IOERR);
    }
    info!("Simulated {} reads in {:.3}s", total_reads, start_time.elapsed().as_secs_f64());
}

/// Aligns a read file against one subgraph, fanning chunks out to worker threads.
fn run_align(settings: AlignSettings) {
    info!("Loading reads...");
    let records: Vec<ReadRecord> = match read_records(&settings.reads_filename) {
        Ok(r) => r,
        Err(e) => {
            error!("Error while loading reads: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    for record in records.iter() {
        if record.sequence.len() > settings.read_len {
            error!("Expected reads of length <= {}, got {} ({:?})",
                   settings.read_len, record.sequence.len(), record.name);
            std::process::exit(exitcode::USAGE);
        }
    }

    info!("Loading graphs...");
    let start_time: Instant = Instant::now();
    let manager: Arc<GraphManager> = match GraphManager::open(&settings.gdef_filename, true) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            error!("Error while loading graph definition: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    // materialize the target once so workers only ever hit the cache
    match manager.make_subgraph(&settings.subgraph) {
        Ok(subgraph) => info!("Loaded subgraph {:?} ({} nodes) in {:.3}s",
                              settings.subgraph, subgraph.member_ids().len(), start_time.elapsed().as_secs_f64()),
        Err(e) => {
            error!("Error while materializing subgraph {:?}: {}", settings.subgraph, e);
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    let params: ScoreParams = ScoreParams {
        match_score: settings.match_score,
        mismatch: settings.mismatch,
        gap_open: settings.gap_open,
        gap_extend: settings.gap_extend
    };
    let mode: ScoringMode = if settings.end_to_end { ScoringMode::EndToEnd } else { ScoringMode::Local };
    let aligner: Arc<Aligner> = match Aligner::new(params, mode, settings.read_len, settings.tolerance) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            error!("Error during aligner creation: {}", e);
            std::process::exit(exitcode::USAGE);
        }
    };

    let chunks: Vec<Vec<ReadRecord>> = records.chunks(settings.chunk_size)
        .map(|c| c.to_vec())
        .collect();
    let num_chunks: usize = chunks.len();
    info!("{} reads in {} tasks", records.len(), num_chunks);

    info!("Aligning with {} thread(s)...", settings.threads);
    let align_start: Instant = Instant::now();
    let mut collected: Vec<Option<Vec<(ReadRecord, Alignment)>>> = vec![None; num_chunks];

    if settings.threads <= 1 {
        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            collected[chunk_index] = Some(align_chunk(chunk, &manager, &aligner, &settings.subgraph));
        }
    } else {
        let pool: ThreadPool = ThreadPool::new(settings.threads);
        let (tx, rx) = mpsc::channel();
        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let tx = tx.clone();
            let manager = manager.clone();
            let aligner = aligner.clone();
            let label: String = settings.subgraph.clone();
            pool.execute(move || {
                let results = align_chunk(chunk, &manager, &aligner, &label);
                tx.send((chunk_index, results)).expect("channel will be there waiting for the pool");
            });
        }
        drop(tx);

        for (chunk_index, results) in rx.iter() {
            if pool.panic_count() > 0 {
                error!("Panic detected in ThreadPool, check above for details.");
                std::process::exit(exitcode::SOFTWARE);
            }
            collected[chunk_index] = Some(results);
        }
        pool.join();
    }
    info!("Alignment finished in {:.3}s", align_start.elapsed().as_secs_f64());

    // output is emitted single-threaded, in input order
    let mut writer: AlignmentWriter = match AlignmentWriter::new(&settings.output_filename) {
        Ok(w) => w,
        Err(e) => {
            error!("Error during alignment writer creation: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    let mut total: usize = 0;
    let mut correct: usize = 0;
    for results in collected.into_iter().flatten() {
        for (record, alignment) in results.iter() {
            total += 1;
            if alignment.correct == 1 {
                correct += 1;
            }
            if let Err(e) = writer.write_alignment(record, &settings.subgraph, alignment, settings.end_to_end) {
                error!("Error while writing alignment: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        }
    }
    if let Err(e) = writer.finish() {
        error!("Error while finishing alignment file: {}", e);
        std::process::exit(exitcode::IOERR);
    }
    info!("Wrote {} alignments ({} hit their target) to {:?}", total, correct, settings.output_filename);
}

/// Aligns one chunk of reads against the target subgraph.
/// Dynamic errors cannot be sent over the channel, so failures exit here.
fn align_chunk(chunk: Vec<ReadRecord>, manager: &GraphManager, aligner: &Aligner,
               label: &str) -> Vec<(ReadRecord, Alignment)> {
    let subgraph = match manager.make_subgraph(label) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while fetching subgraph {:?}: {}", label, e);
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    let mut results: Vec<(ReadRecord, Alignment)> = Vec::with_capacity(chunk.len());
    for record in chunk {
        let target: Option<i64> = if record.end_pos >= 0 { Some(record.end_pos) } else { None };
        let alignment: Alignment = match aligner.align(record.sequence.as_bytes(), target, &subgraph) {
            Ok(a) => a,
            Err(e) => {
                error!("Error while aligning {:?}: {}", record.name, e);
                std::process::exit(exitcode::SOFTWARE);
            }
        };
        results.push((record, alignment));
    }
    results
}
