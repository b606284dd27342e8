use std::cmp::Ordering;

use crate::error::DecodeError;
use crate::lm::{LanguageModel, LmScore};
use crate::search::node::{PrefixArena, ROOT};
use crate::search::{log_sum_exp, log_sum_exp64};
use crate::types::Output;

/// Per-sequence search knobs, with the probability cutoff already in
/// natural log.
#[derive(Debug, Clone)]
pub(crate) struct SearchParams {
    pub blank_id: usize,
    pub beam_size: usize,
    pub log_cutoff_prob: f64,
    pub cutoff_top_n: usize,
}

/// Live beam of one sequence: the prefix arena, the indices of the
/// current top hypotheses, and the timestep counter.
#[derive(Debug)]
pub struct DecoderState<S> {
    arena: PrefixArena<S>,
    beam: Vec<usize>,
    timestep: usize,
    class_dim: usize,
}

impl<S> DecoderState<S> {
    /// Number of timesteps consumed so far.
    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn class_dim(&self) -> usize {
        self.class_dim
    }
}

pub(crate) fn init_state<L: LanguageModel>(lm: &L, class_dim: usize) -> DecoderState<L::State> {
    DecoderState {
        arena: PrefixArena::with_root(lm.start(false)),
        beam: vec![ROOT],
        timestep: 0,
        class_dim,
    }
}

/// Advances the beam by `log_probs.len() / class_dim` timesteps. Rows
/// are treated as (possibly unnormalized) log-distributions.
pub(crate) fn advance<L: LanguageModel>(
    state: &mut DecoderState<L::State>,
    lm: &L,
    params: &SearchParams,
    log_probs: &[f32],
) -> Result<(), DecodeError> {
    if log_probs.len() % state.class_dim != 0 {
        return Err(DecodeError::invalid_argument(format!(
            "log_probs length {} is not a multiple of class_dim {}",
            log_probs.len(),
            state.class_dim
        )));
    }
    for row_start in (0..log_probs.len()).step_by(state.class_dim) {
        let row = &log_probs[row_start..row_start + state.class_dim];
        step(state, lm, params, row)?;
    }
    Ok(())
}

fn step<L: LanguageModel>(
    state: &mut DecoderState<L::State>,
    lm: &L,
    params: &SearchParams,
    row: &[f32],
) -> Result<(), DecodeError> {
    let t = state.timestep;
    let stamp = t;

    if row.iter().all(|&v| v == f32::NEG_INFINITY) {
        tracing::warn!(
            timestep = t,
            "decoder: timestep row is entirely -inf, beam mass collapses"
        );
    }
    let candidates = prune_candidates(row, params);

    // Blank is always a candidate, so every live prefix is re-ranked.
    let mut touched: Vec<usize> = Vec::with_capacity(state.beam.len() * (candidates.len() + 1));
    for i in 0..state.beam.len() {
        let idx = state.beam[i];
        state.arena.node_mut(idx).touched_at = stamp;
        touched.push(idx);
    }

    for i in 0..state.beam.len() {
        let p_idx = state.beam[i];
        let (p_lp_blank, p_lp_nonblank, p_token) = {
            let n = state.arena.node(p_idx);
            (n.lp_blank, n.lp_nonblank, n.token)
        };
        let p_total = log_sum_exp(p_lp_blank, p_lp_nonblank);

        for &(class, class_lp) in &candidates {
            if class == params.blank_id {
                let n = state.arena.node_mut(p_idx);
                n.lp_blank_step = log_sum_exp(n.lp_blank_step, p_total + class_lp);
            } else if Some(class) == p_token {
                // Held emission: the token continues without producing a
                // new output symbol, fed only by the nonblank mass.
                {
                    let n = state.arena.node_mut(p_idx);
                    n.lp_nonblank_step =
                        log_sum_exp(n.lp_nonblank_step, p_lp_nonblank + class_lp);
                }
                // The same token counts as a fresh emission only out of
                // the blank-separated mass.
                extend(
                    &mut state.arena,
                    &mut touched,
                    lm,
                    p_idx,
                    class,
                    t,
                    p_lp_blank + class_lp,
                    stamp,
                );
            } else {
                extend(
                    &mut state.arena,
                    &mut touched,
                    lm,
                    p_idx,
                    class,
                    t,
                    p_total + class_lp,
                    stamp,
                );
            }
        }
    }

    let mut ranked: Vec<(usize, f32)> = touched
        .iter()
        .map(|&idx| {
            let n = state.arena.node(idx);
            let score =
                n.step_log_prob() + lm.alpha() * n.lm_score + lm.beta() * n.word_count as f32;
            (idx, score)
        })
        .collect();
    ranked.sort_by(|a, b| rank(&state.arena, lm, a, b));
    let keep = ranked.len().min(params.beam_size);

    state.beam.clear();
    for (pos, &(idx, _)) in ranked.iter().enumerate() {
        let n = state.arena.node_mut(idx);
        if pos < keep {
            n.lp_blank = n.lp_blank_step;
            n.lp_nonblank = n.lp_nonblank_step;
            state.beam.push(idx);
        }
        n.lp_blank_step = f32::NEG_INFINITY;
        n.lp_nonblank_step = f32::NEG_INFINITY;
    }

    if state.beam.is_empty() {
        return Err(DecodeError::internal(format!(
            "beam underflow at timestep {t}"
        )));
    }
    state.timestep += 1;
    Ok(())
}

/// Routes probability mass into the child representing `parent` extended
/// by `token`, creating it (and consulting the LM) on first use.
#[allow(clippy::too_many_arguments)]
fn extend<L: LanguageModel>(
    arena: &mut PrefixArena<L::State>,
    touched: &mut Vec<usize>,
    lm: &L,
    parent: usize,
    token: usize,
    timestep: usize,
    mass: f32,
    stamp: usize,
) {
    if mass == f32::NEG_INFINITY {
        return;
    }
    let child = match arena.child_of(parent, token) {
        Some(existing) => existing,
        None => {
            let (lm_state, scored) = {
                let p = arena.node(parent);
                if !lm.is_valid_extension(&p.lm_state, token) {
                    return;
                }
                lm.score(&p.lm_state, token)
            };
            let (lm_score, word_count) = {
                let p = arena.node(parent);
                match scored {
                    LmScore::Ready(delta) => (p.lm_score + delta, p.word_count + 1),
                    LmScore::Pending => (p.lm_score, p.word_count),
                }
            };
            arena.push_child(parent, token, timestep, lm_state, lm_score, word_count)
        }
    };
    let n = arena.node_mut(child);
    n.lp_nonblank_step = log_sum_exp(n.lp_nonblank_step, mass);
    if n.touched_at != stamp {
        n.touched_at = stamp;
        touched.push(child);
    }
}

/// Candidate classes for one timestep: the highest-probability prefix of
/// the sorted class list whose cumulative mass reaches the cutoff,
/// capped at `cutoff_top_n`, with the blank always included.
fn prune_candidates(row: &[f32], params: &SearchParams) -> Vec<(usize, f32)> {
    let mut order: Vec<usize> = (0..row.len()).collect();
    order.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then_with(|| a.cmp(&b)));

    let limit = params.cutoff_top_n.min(row.len());
    let mut kept = Vec::with_capacity(limit + 1);
    let mut cumulative = f64::NEG_INFINITY;
    for &class in &order {
        if kept.len() >= limit {
            break;
        }
        kept.push((class, row[class]));
        cumulative = log_sum_exp64(cumulative, row[class] as f64);
        if cumulative >= params.log_cutoff_prob {
            break;
        }
    }
    if !kept.iter().any(|&(class, _)| class == params.blank_id) {
        kept.push((params.blank_id, row[params.blank_id]));
    }
    kept
}

/// Descending score, then LM state, then token sequence. Total order so
/// results are bit-identical across runs and worker counts.
fn rank<L: LanguageModel>(
    arena: &PrefixArena<L::State>,
    lm: &L,
    a: &(usize, f32),
    b: &(usize, f32),
) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| lm.compare(&arena.node(a.0).lm_state, &arena.node(b.0).lm_state))
        .then_with(|| arena.compare_sequences(a.0, b.0))
}

/// Final ranking: applies the LM end-of-sentence contribution, sorts,
/// and walks parent links to materialize up to `beam_size` hypotheses.
pub(crate) fn decode<L: LanguageModel>(
    state: &DecoderState<L::State>,
    lm: &L,
    beam_size: usize,
) -> Vec<Output> {
    let mut ranked: Vec<(usize, f32)> = state
        .beam
        .iter()
        .map(|&idx| {
            let n = state.arena.node(idx);
            let (_, eos_delta) = lm.finish(&n.lm_state);
            let score = n.total_log_prob()
                + lm.alpha() * (n.lm_score + eos_delta)
                + lm.beta() * n.word_count as f32;
            (idx, score)
        })
        .collect();
    ranked.sort_by(|a, b| rank(&state.arena, lm, a, b));
    ranked.truncate(beam_size);

    ranked
        .into_iter()
        .map(|(idx, score)| {
            let sequence = state.arena.token_sequence(idx);
            Output {
                tokens: sequence.iter().map(|&(token, _)| token as i32).collect(),
                timesteps: sequence.iter().map(|&(_, ts)| ts as i32).collect(),
                probability: score,
            }
        })
        .collect()
}
