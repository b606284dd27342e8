use rayon::prelude::*;

use crate::error::DecodeError;
use crate::lm::LanguageModel;
use crate::search::beam::{self, SearchParams};
use crate::types::{BatchDecodeOutput, Output};

/// Decodes `batch_size` independent sequences from a dense row-major
/// `[batch, max_time, class_dim]` log-probability buffer and packs the
/// per-sequence hypotheses into rectangular output tensors.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_batch<L: LanguageModel>(
    lm: &L,
    params: &SearchParams,
    num_threads: usize,
    log_probs: &[f32],
    batch_size: usize,
    max_time: usize,
    class_dim: usize,
    seq_lengths: &[usize],
) -> Result<BatchDecodeOutput, DecodeError> {
    validate_batch(
        params,
        log_probs,
        batch_size,
        max_time,
        class_dim,
        seq_lengths,
    )?;

    let workers = effective_workers(num_threads, batch_size, lm);
    tracing::debug!(
        batch_size,
        max_time,
        class_dim,
        workers,
        beam_size = params.beam_size,
        "batch decode"
    );

    let decode_one = |batch: usize| -> Result<Vec<Output>, DecodeError> {
        let mut state = beam::init_state(lm, class_dim);
        let steps = seq_lengths[batch];
        let slice = &log_probs[batch * max_time * class_dim..][..steps * class_dim];
        beam::advance(&mut state, lm, params, slice)?;
        Ok(beam::decode(&state, lm, params.beam_size))
    };

    let results: Vec<Vec<Output>> = if workers <= 1 {
        (0..batch_size).map(decode_one).collect::<Result<_, _>>()?
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| DecodeError::internal(format!("failed to build worker pool: {e}")))?;
        pool.install(|| {
            (0..batch_size)
                .into_par_iter()
                .map(decode_one)
                .collect::<Result<_, _>>()
        })?
    };

    Ok(pack(results, batch_size, params.beam_size, max_time))
}

fn validate_batch(
    params: &SearchParams,
    log_probs: &[f32],
    batch_size: usize,
    max_time: usize,
    class_dim: usize,
    seq_lengths: &[usize],
) -> Result<(), DecodeError> {
    if class_dim == 0 {
        return Err(DecodeError::invalid_argument("class_dim must be >= 1"));
    }
    if params.blank_id >= class_dim {
        return Err(DecodeError::invalid_argument(format!(
            "blank_id {} out of range for {class_dim} classes",
            params.blank_id
        )));
    }
    let expected = batch_size * max_time * class_dim;
    if log_probs.len() != expected {
        return Err(DecodeError::invalid_argument(format!(
            "log_probs has {} values, expected {batch_size}x{max_time}x{class_dim} = {expected}",
            log_probs.len()
        )));
    }
    if seq_lengths.len() != batch_size {
        return Err(DecodeError::invalid_argument(format!(
            "seq_lengths has {} entries for batch of {batch_size}",
            seq_lengths.len()
        )));
    }
    if let Some((batch, &len)) = seq_lengths
        .iter()
        .enumerate()
        .find(|&(_, &len)| len > max_time)
    {
        return Err(DecodeError::invalid_argument(format!(
            "seq_lengths[{batch}] = {len} exceeds max_time {max_time}"
        )));
    }
    Ok(())
}

/// Worker count: 0 means one worker, never more workers than sequences,
/// and a non-reentrant LM pins decoding to a single worker.
fn effective_workers<L: LanguageModel>(num_threads: usize, batch_size: usize, lm: &L) -> usize {
    let requested = num_threads.max(1).min(batch_size.max(1));
    if requested > 1 && !lm.parallel_safe() {
        tracing::warn!(
            requested,
            "scorer is not reentrant, decoding batch on a single worker"
        );
        return 1;
    }
    requested
}

fn pack(
    results: Vec<Vec<Output>>,
    batch_size: usize,
    beam_size: usize,
    max_time: usize,
) -> BatchDecodeOutput {
    let mut out = BatchDecodeOutput::zeroed(batch_size, beam_size, max_time);
    for (batch, hypotheses) in results.into_iter().enumerate() {
        for (slot, hypothesis) in hypotheses.into_iter().take(beam_size).enumerate() {
            let row = (batch * beam_size + slot) * max_time;
            let len = hypothesis.tokens.len();
            debug_assert!(len <= max_time);
            out.tokens[row..row + len].copy_from_slice(&hypothesis.tokens);
            out.timesteps[row..row + len].copy_from_slice(&hypothesis.timesteps);
            out.scores[batch * beam_size + slot] = hypothesis.probability;
            out.output_lengths[batch * beam_size + slot] = len as i32;
        }
    }
    out
}
