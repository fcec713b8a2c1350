
use crate::graph::{Graph, Node};
use crate::sequence::{BASE_N, seq_to_num};

#[allow(unused_imports)]
use log::{debug, trace};
use rustc_hash::FxHashMap as HashMap;

/// Effective negative infinity that survives additions without wrapping.
const NEG: i32 = i32::MIN / 2;

#[derive(thiserror::Error, Debug)]
pub enum AlignerError {
    #[error("score accumulator overflow: read length {read_len} * match score {match_score} > 255")]
    ScoreOverflow { read_len: usize, match_score: i32 },
    #[error("read of length {found} exceeds the configured maximum {max}")]
    ReadTooLong { found: usize, max: usize }
}

/// Local alignment clips the read for free; end-to-end must consume all of it.
/// The graph side is always free on both ends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScoringMode {
    Local,
    EndToEnd
}

/// Affine-gap scoring values. Penalties are stored positive and subtracted.
#[derive(Clone, Copy, Debug)]
pub struct ScoreParams {
    pub match_score: i32,
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_extend: i32
}

impl Default for ScoreParams {
    fn default() -> ScoreParams {
        ScoreParams {
            match_score: 2,
            mismatch: 2,
            gap_open: 3,
            gap_extend: 1
        }
    }
}

/// The best and second-best placements of one read on one graph.
#[derive(Clone, Debug, Default)]
pub struct Alignment {
    pub max_score: i32,
    /// 0-based position of the last aligned graph base for the best score
    pub max_pos: i64,
    /// how many end positions attain the best score
    pub max_count: usize,
    pub sub_score: i32,
    pub sub_pos: i64,
    pub sub_count: usize,
    /// 1 if `max_pos` hit the expected target, 2 if only `sub_pos` did, else 0
    pub correct: u8
}

/// Scalar affine-gap aligner over a graph's topological order.
/// Columns advance one graph base at a time; at node boundaries the incoming
/// column is the elementwise maximum over all predecessor final columns.
pub struct Aligner {
    params: ScoreParams,
    mode: ScoringMode,
    max_read_len: usize,
    /// correctness accepts positions within read_len / tolerance of the target
    tolerance: usize
}

impl Aligner {
    pub fn default_tolerance() -> usize {
        5
    }

    /// Creates an aligner, guarding the score accumulator width.
    /// # Errors
    /// * `ScoreOverflow` when `max_read_len * match_score` exceeds 255
    pub fn new(params: ScoreParams, mode: ScoringMode, max_read_len: usize, tolerance: usize)
        -> Result<Aligner, AlignerError> {
        if max_read_len as i64 * params.match_score as i64 > 255 {
            return Err(AlignerError::ScoreOverflow {
                read_len: max_read_len,
                match_score: params.match_score
            });
        }
        Aligner::new_unchecked(params, mode, max_read_len, tolerance)
    }

    fn new_unchecked(params: ScoreParams, mode: ScoringMode, max_read_len: usize, tolerance: usize)
        -> Result<Aligner, AlignerError> {
        Ok(Aligner {
            params,
            mode,
            max_read_len,
            tolerance: tolerance.max(1)
        })
    }

    /// Aligns one read against a finalized graph.
    /// # Arguments
    /// * `read` - the ASCII read sequence
    /// * `target` - expected 0-based end position, for the correctness flag
    /// * `graph` - the target graph
    /// # Errors
    /// * `ReadTooLong` when the read exceeds the configured maximum
    /// * `NotFinalized` passed through from graph iteration
    pub fn align(&self, read: &[u8], target: Option<i64>, graph: &Graph)
        -> Result<Alignment, Box<dyn std::error::Error>> {
        if read.len() > self.max_read_len {
            return Err(AlignerError::ReadTooLong {
                found: read.len(),
                max: self.max_read_len
            }.into());
        }
        let read: Vec<u8> = seq_to_num(read);
        let length: usize = read.len();
        let open_cost: i32 = self.params.gap_open + self.params.gap_extend;

        // boundary columns for nodes with no predecessors
        let mut boundary_h: Vec<i32> = vec![0; length + 1];
        let boundary_f: Vec<i32> = vec![NEG; length + 1];
        if self.mode == ScoringMode::EndToEnd {
            // leading read bases may only be consumed as a penalized insertion
            for i in 1..=length {
                boundary_h[i] = -(self.params.gap_open + self.params.gap_extend * i as i32);
            }
        }

        // per-node final columns, (H, F)
        let mut finals: HashMap<u64, (Vec<i32>, Vec<i32>)> = Default::default();
        // per-column best score and its graph position
        let mut candidates: Vec<(i32, i64)> = vec![];

        for node in graph.begin()? {
            let (mut h, mut f) = self.incoming_columns(node, graph, &finals, &boundary_h, &boundary_f);

            for (j, &base) in node.seq().iter().enumerate() {
                let pos: i64 = node.end_pos() - (node.length() as i64 - 1 - j as i64);
                let mut new_h: Vec<i32> = vec![0; length + 1];
                let mut new_f: Vec<i32> = vec![NEG; length + 1];
                let mut column_best: i32 = NEG;

                new_h[0] = 0;
                let mut e: i32 = NEG;
                for i in 1..=length {
                    new_f[i] = (h[i] - open_cost).max(f[i] - self.params.gap_extend);
                    e = (new_h[i - 1] - open_cost).max(e - self.params.gap_extend);

                    let diagonal: i32 = h[i - 1] + self.substitution(read[i - 1], base);
                    let mut score: i32 = diagonal.max(new_f[i]).max(e);
                    if self.mode == ScoringMode::Local {
                        score = score.max(0);
                    }
                    new_h[i] = score;

                    let tracked: bool = match self.mode {
                        ScoringMode::Local => true,
                        ScoringMode::EndToEnd => i == length
                    };
                    if tracked {
                        column_best = column_best.max(score);
                    }
                }
                if length == 0 {
                    column_best = 0;
                }
                candidates.push((column_best, pos));
                h = new_h;
                f = new_f;
            }

            finals.insert(node.id(), (h, f));
        }

        Ok(self.summarize(candidates, read.len(), target))
    }

    /// The elementwise maximum over all predecessor final columns, or the
    /// boundary columns for nodes without predecessors.
    fn incoming_columns(&self, node: &Node, graph: &Graph,
                        finals: &HashMap<u64, (Vec<i32>, Vec<i32>)>,
                        boundary_h: &[i32], boundary_f: &[i32]) -> (Vec<i32>, Vec<i32>) {
        let predecessors: Option<&Vec<u64>> = graph.prev_map().get(&node.id());
        let mut merged: Option<(Vec<i32>, Vec<i32>)> = None;
        if let Some(predecessors) = predecessors {
            for prev_id in predecessors.iter() {
                let (prev_h, prev_f) = match finals.get(prev_id) {
                    Some(cols) => cols,
                    None => continue
                };
                match merged {
                    None => merged = Some((prev_h.clone(), prev_f.clone())),
                    Some((ref mut h, ref mut f)) => {
                        for i in 0..h.len() {
                            h[i] = h[i].max(prev_h[i]);
                            f[i] = f[i].max(prev_f[i]);
                        }
                    }
                };
            }
        }
        merged.unwrap_or_else(|| (boundary_h.to_vec(), boundary_f.to_vec()))
    }

    fn substitution(&self, read_base: u8, graph_base: u8) -> i32 {
        if read_base == graph_base && read_base != BASE_N {
            self.params.match_score
        } else {
            -self.params.mismatch
        }
    }

    /// Reduces per-column bests into max/second-best placements plus the
    /// correctness flag against `target`.
    fn summarize(&self, candidates: Vec<(i32, i64)>, read_len: usize, target: Option<i64>) -> Alignment {
        let mut result: Alignment = Alignment {
            max_score: NEG,
            sub_score: NEG,
            ..Default::default()
        };

        for &(score, pos) in candidates.iter() {
            if score > result.max_score {
                result.max_score = score;
                result.max_pos = pos;
                result.max_count = 1;
            } else if score == result.max_score {
                result.max_count += 1;
                result.max_pos = pos;
            }
        }
        for &(score, pos) in candidates.iter() {
            if score >= result.max_score {
                continue;
            }
            if score > result.sub_score {
                result.sub_score = score;
                result.sub_pos = pos;
                result.sub_count = 1;
            } else if score == result.sub_score {
                result.sub_count += 1;
                result.sub_pos = pos;
            }
        }

        if let Some(target) = target {
            let window: i64 = (read_len / self.tolerance) as i64;
            if (result.max_pos - target).abs() <= window && result.max_count > 0 {
                result.correct = 1;
            } else if (result.sub_pos - target).abs() <= window && result.sub_count > 0 {
                result.correct = 2;
            }
        }
        result
    }
}
