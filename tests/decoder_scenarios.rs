use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ctc_beam::{
    Alphabet, CtcDecoder, CtcDecoderBuilder, CtcDecoderConfig, DynLm, LanguageModel, LmScore,
    LmUnit, NgramLm, NgramModel, Scorer, ScorerState,
};

const NEG_INF: f32 = f32::NEG_INFINITY;

fn config(beam_size: usize, num_threads: usize) -> CtcDecoderConfig {
    CtcDecoderConfig {
        blank_id: 0,
        beam_size,
        cutoff_prob: 1.0,
        cutoff_top_n: 40,
        num_threads,
    }
}

/// Random normalized log-probability rows.
fn random_log_probs(rng: &mut StdRng, time: usize, classes: usize) -> Vec<f32> {
    let mut rows = Vec::with_capacity(time * classes);
    for _ in 0..time {
        let weights: Vec<f64> = (0..classes).map(|_| rng.gen_range(0.05..1.0)).collect();
        let total: f64 = weights.iter().sum();
        rows.extend(weights.iter().map(|w| (w / total).ln() as f32));
    }
    rows
}

/// Greedy CTC decoding: argmax per frame, collapse runs, drop blanks.
fn greedy_reference(log_probs: &[f32], classes: usize, blank: i32) -> Vec<i32> {
    let mut collapsed = Vec::new();
    let mut last = blank;
    for row in log_probs.chunks_exact(classes) {
        let argmax = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, _)| i as i32)
            .unwrap();
        if argmax != blank && argmax != last {
            collapsed.push(argmax);
        }
        last = argmax;
    }
    collapsed
}

/// Exact per-hypothesis CTC marginals by enumerating every alignment.
fn exact_marginals(log_probs: &[f32], time: usize, classes: usize, blank: usize) -> HashMap<Vec<i32>, f64> {
    let mut totals: HashMap<Vec<i32>, f64> = HashMap::new();
    let mut alignment = vec![0usize; time];
    loop {
        let mut log_p = 0.0f64;
        for (t, &class) in alignment.iter().enumerate() {
            log_p += log_probs[t * classes + class] as f64;
        }
        if log_p > f64::NEG_INFINITY {
            let mut collapsed = Vec::new();
            let mut last = blank;
            for &class in &alignment {
                if class != blank && class != last {
                    collapsed.push(class as i32);
                }
                last = class;
            }
            *totals.entry(collapsed).or_insert(0.0) += log_p.exp();
        }

        // Next alignment in odometer order.
        let mut position = 0;
        loop {
            if position == time {
                return totals
                    .into_iter()
                    .map(|(tokens, p)| (tokens, p.ln()))
                    .collect();
            }
            alignment[position] += 1;
            if alignment[position] < classes {
                break;
            }
            alignment[position] = 0;
            position += 1;
        }
    }
}

#[test]
fn beam_scores_match_exact_marginals_without_lm() {
    let mut rng = StdRng::seed_from_u64(7);
    let time = 4;
    let classes = 3;
    let log_probs = random_log_probs(&mut rng, time, classes);

    let decoder = CtcDecoder::new(config(64, 1)).unwrap();
    let mut state = decoder.begin(classes).unwrap();
    decoder.advance(&mut state, &log_probs).unwrap();
    let outputs = decoder.decode(&state);

    let reference = exact_marginals(&log_probs, time, classes, 0);
    assert!(!outputs.is_empty());
    for output in &outputs {
        let expected = reference
            .get(&output.tokens)
            .unwrap_or_else(|| panic!("hypothesis {:?} not reachable", output.tokens));
        assert!(
            (output.probability as f64 - expected).abs() < 1e-4,
            "tokens {:?}: beam {} vs exact {}",
            output.tokens,
            output.probability,
            expected
        );
    }
}

#[test]
fn beam_one_on_peaked_input_is_greedy() {
    let mut rng = StdRng::seed_from_u64(11);
    let classes = 4;
    let time = 24;
    let mut log_probs = vec![-30.0f32; time * classes];
    for t in 0..time {
        let winner = rng.gen_range(0..classes);
        log_probs[t * classes + winner] = 0.0;
    }

    let decoder = CtcDecoder::new(config(1, 1)).unwrap();
    let mut state = decoder.begin(classes).unwrap();
    decoder.advance(&mut state, &log_probs).unwrap();
    let outputs = decoder.decode(&state);

    assert_eq!(outputs[0].tokens, greedy_reference(&log_probs, classes, 0));
    assert_eq!(outputs[0].tokens.len(), outputs[0].timesteps.len());
    for pair in outputs[0].timesteps.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[test]
fn output_invariants_hold_on_random_input() {
    let mut rng = StdRng::seed_from_u64(23);
    let classes = 5;
    let time = 12;
    let log_probs = random_log_probs(&mut rng, time, classes);

    let decoder = CtcDecoder::new(config(8, 1)).unwrap();
    let out = decoder
        .decode_batch(&log_probs, 1, time, classes, &[time])
        .unwrap();

    assert!(out.output_length(0, 0) > 0);
    for slot in 0..8 {
        let len = out.output_length(0, slot);
        assert!(len <= time);
        for &token in out.tokens(0, slot) {
            assert!(token > 0 && (token as usize) < classes, "blank or range escape");
        }
        for &ts in out.timesteps(0, slot) {
            assert!((ts as usize) < time);
        }
    }
    for slot in 1..8 {
        if out.output_length(0, slot) > 0 {
            assert!(out.score(0, slot - 1) >= out.score(0, slot));
        }
    }
}

#[test]
fn wide_cutoff_equals_no_pruning() {
    let mut rng = StdRng::seed_from_u64(31);
    let classes = 6;
    let time = 10;
    let log_probs = random_log_probs(&mut rng, time, classes);

    let run = |cutoff_top_n: usize| {
        let decoder = CtcDecoder::new(CtcDecoderConfig {
            cutoff_top_n,
            ..config(6, 1)
        })
        .unwrap();
        decoder
            .decode_batch(&log_probs, 1, time, classes, &[time])
            .unwrap()
    };

    assert_eq!(run(classes), run(1000));
}

/// Constant per-token penalty, applied through the LM interface.
struct ConstLm {
    delta: f32,
    alpha: f32,
}

impl LanguageModel for ConstLm {
    type State = ();

    fn start(&self, _start_with_nothing: bool) -> Self::State {}

    fn score(&self, _state: &Self::State, _token: usize) -> (Self::State, LmScore) {
        ((), LmScore::Ready(self.delta))
    }

    fn finish(&self, _state: &Self::State) -> (Self::State, f32) {
        ((), 0.0)
    }

    fn compare(&self, _a: &Self::State, _b: &Self::State) -> Ordering {
        Ordering::Equal
    }

    fn alpha(&self) -> f32 {
        self.alpha
    }

    fn beta(&self) -> f32 {
        0.0
    }
}

#[test]
fn constant_lm_shifts_scores_by_length() {
    let mut rng = StdRng::seed_from_u64(41);
    let classes = 3;
    let time = 3;
    let log_probs = random_log_probs(&mut rng, time, classes);

    let plain = CtcDecoder::new(config(64, 1)).unwrap();
    let mut state = plain.begin(classes).unwrap();
    plain.advance(&mut state, &log_probs).unwrap();
    let baseline: HashMap<Vec<i32>, f32> = plain
        .decode(&state)
        .into_iter()
        .map(|o| (o.tokens, o.probability))
        .collect();

    let decoder = CtcDecoderBuilder::new(config(64, 1))
        .with_lm(ConstLm {
            delta: -5.0,
            alpha: 1.0,
        })
        .build()
        .unwrap();
    let mut state = decoder.begin(classes).unwrap();
    decoder.advance(&mut state, &log_probs).unwrap();

    for output in decoder.decode(&state) {
        let expected = baseline[&output.tokens] - 5.0 * output.tokens.len() as f32;
        assert!(
            (output.probability - expected).abs() < 1e-4,
            "tokens {:?}: {} vs {}",
            output.tokens,
            output.probability,
            expected
        );
    }
}

#[test]
fn identical_batch_items_decode_identically() {
    let mut rng = StdRng::seed_from_u64(53);
    let classes = 4;
    let time = 8;
    let item = random_log_probs(&mut rng, time, classes);
    let mut log_probs = item.clone();
    log_probs.extend_from_slice(&item);

    let decoder = CtcDecoder::new(config(4, 2)).unwrap();
    let out = decoder
        .decode_batch(&log_probs, 2, time, classes, &[time, time])
        .unwrap();

    for slot in 0..4 {
        assert_eq!(out.tokens(0, slot), out.tokens(1, slot));
        assert_eq!(out.timesteps(0, slot), out.timesteps(1, slot));
        assert_eq!(out.score(0, slot), out.score(1, slot));
        assert_eq!(out.output_length(0, slot), out.output_length(1, slot));
    }
}

#[test]
fn batch_decoding_is_deterministic_across_runs() {
    let mut rng = StdRng::seed_from_u64(61);
    let classes = 5;
    let time = 9;
    let batch = 3;
    let log_probs = random_log_probs(&mut rng, batch * time, classes);
    let lengths = [time, time - 2, 0];

    let decoder = CtcDecoder::new(config(4, 3)).unwrap();
    let first = decoder
        .decode_batch(&log_probs, batch, time, classes, &lengths)
        .unwrap();
    let second = decoder
        .decode_batch(&log_probs, batch, time, classes, &lengths)
        .unwrap();
    assert_eq!(first, second);

    // The empty item produced the single empty hypothesis.
    assert_eq!(first.output_length(2, 0), 0);
    assert_eq!(first.score(2, 0), 0.0);
}

#[test]
fn short_sequences_only_consume_their_prefix() {
    let classes = 3;
    let time = 4;
    // Valid part is certain "1"; the padding rows would decode to "2".
    let log_probs = [
        NEG_INF, 0.0, NEG_INF, //
        NEG_INF, NEG_INF, 0.0, //
        NEG_INF, NEG_INF, 0.0, //
        NEG_INF, NEG_INF, 0.0,
    ];
    let decoder = CtcDecoder::new(config(2, 1)).unwrap();
    let out = decoder
        .decode_batch(&log_probs, 1, time, classes, &[1])
        .unwrap();
    assert_eq!(out.tokens(0, 0), &[1]);
    assert_eq!(out.output_length(0, 0), 1);
}

/// The same constant penalty behind the object-safe scorer interface.
struct ConstScorer;

impl Scorer for ConstScorer {
    fn start(&self, _start_with_nothing: bool) -> ScorerState {
        Arc::new(())
    }

    fn score(&self, _state: &ScorerState, _token: usize) -> (ScorerState, LmScore) {
        (Arc::new(()), LmScore::Ready(-5.0))
    }

    fn finish(&self, state: &ScorerState) -> (ScorerState, f32) {
        (state.clone(), 0.0)
    }

    fn compare(&self, _a: &ScorerState, _b: &ScorerState) -> Ordering {
        Ordering::Equal
    }

    fn alpha(&self) -> f32 {
        1.0
    }

    fn beta(&self) -> f32 {
        0.0
    }
}

#[test]
fn dynamic_scorer_matches_monomorphic_lm() {
    let mut rng = StdRng::seed_from_u64(71);
    let classes = 3;
    let time = 5;
    let item = random_log_probs(&mut rng, time, classes);
    let mut log_probs = item.clone();
    log_probs.extend_from_slice(&item);
    let lengths = [time, time];

    let typed = CtcDecoderBuilder::new(config(4, 2))
        .with_lm(ConstLm {
            delta: -5.0,
            alpha: 1.0,
        })
        .build()
        .unwrap();
    let expected = typed
        .decode_batch(&log_probs, 2, time, classes, &lengths)
        .unwrap();

    // ConstScorer is not reentrant by default, so the driver falls back
    // to one worker; results must not change.
    let boxed = CtcDecoderBuilder::new(config(4, 2))
        .with_lm(DynLm::new(Box::new(ConstScorer)))
        .build()
        .unwrap();
    let actual = boxed
        .decode_batch(&log_probs, 2, time, classes, &lengths)
        .unwrap();

    assert_eq!(expected, actual);
}

/// Uniform in-memory n-gram backend: every known word scores
/// log10(0.1), states are word histories.
struct UniformModel {
    vocab: HashMap<String, u32>,
}

impl UniformModel {
    fn new(words: &[&str]) -> Self {
        Self {
            vocab: words
                .iter()
                .enumerate()
                .map(|(i, w)| (w.to_string(), i as u32 + 1))
                .collect(),
        }
    }
}

impl NgramModel for UniformModel {
    type State = Vec<u32>;

    fn null_context_state(&self) -> Self::State {
        Vec::new()
    }

    fn begin_sentence_state(&self) -> Self::State {
        vec![u32::MAX]
    }

    fn base_score(&self, state: &Self::State, vocab_index: u32) -> (Self::State, f32) {
        let mut next = state.clone();
        next.push(vocab_index);
        (next, -1.0)
    }

    fn vocab_index(&self, entry: &str) -> u32 {
        self.vocab.get(entry).copied().unwrap_or(0)
    }

    fn end_sentence_index(&self) -> u32 {
        9999
    }

    fn compare_states(&self, a: &Self::State, b: &Self::State) -> Ordering {
        a.cmp(b)
    }
}

#[test]
fn word_unit_lm_scores_completed_words_and_eos() {
    // 0 blank, 1 space, 2 "a", 3 "b".
    let alphabet = Arc::new(
        Alphabet::new(
            ["_", " ", "a", "b"].iter().map(|s| s.to_string()).collect(),
            0,
            1,
        )
        .unwrap(),
    );
    let mut lm = NgramLm::new(UniformModel::new(&["ab"]), alphabet, LmUnit::Word);
    lm.set_alpha(1.0);

    let decoder = CtcDecoderBuilder::new(config(4, 1)).with_lm(lm).build().unwrap();

    // Certain "a b <space>".
    let log_probs = [
        NEG_INF, NEG_INF, 0.0, NEG_INF, //
        NEG_INF, NEG_INF, NEG_INF, 0.0, //
        NEG_INF, 0.0, NEG_INF, NEG_INF,
    ];
    let mut state = decoder.begin(4).unwrap();
    decoder.advance(&mut state, &log_probs).unwrap();
    let outputs = decoder.decode(&state);

    assert_eq!(outputs[0].tokens, vec![2, 3, 1]);
    // CTC mass is certain; the score is the word "ab" plus end-of-sentence,
    // each ln(0.1).
    let expected = 2.0 * (0.1f32).ln();
    assert!(
        (outputs[0].probability - expected).abs() < 1e-4,
        "{} vs {expected}",
        outputs[0].probability
    );
}
