use std::any::Any;
use std::cmp::Ordering;
use std::sync::Arc;

pub mod ngram;
pub mod trie;

/// Scoring granularity of the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmUnit {
    /// Every emitted token is scored against the LM.
    Character,
    /// Tokens accumulate on the LM state; scoring happens when the space
    /// token completes a word.
    Word,
}

/// Result of scoring one token extension.
///
/// `Pending` means the LM buffered the token without producing a
/// probability yet (word-unit mode, mid-word); the controller adds
/// nothing to the prefix score in that case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LmScore {
    Ready(f32),
    Pending,
}

/// Stateful scorer consulted by the beam controller.
///
/// `score` and `finish` must be pure functions of the input state and
/// token: the same handle is shared read-only across batch workers.
/// Implementations that cannot guarantee that return `false` from
/// `parallel_safe` and the batch driver decodes on a single worker.
pub trait LanguageModel: Send + Sync {
    type State: Clone + Send + Sync;

    /// Initial context: begin-of-sentence conditioned, or empty when
    /// `start_with_nothing` is set.
    fn start(&self, start_with_nothing: bool) -> Self::State;

    /// Scores extending `state` by one token, returning the successor
    /// state and the natural-log contribution.
    fn score(&self, state: &Self::State, token: usize) -> (Self::State, LmScore);

    /// Applies end-of-sentence, flushing any buffered partial word first.
    fn finish(&self, state: &Self::State) -> (Self::State, f32);

    /// Three-way state comparison; equal states represent the same LM
    /// context. Also used as a deterministic tie-break.
    fn compare(&self, a: &Self::State, b: &Self::State) -> Ordering;

    /// LM weight in the combined prefix score.
    fn alpha(&self) -> f32;

    /// Word-insertion bonus added per scored unit.
    fn beta(&self) -> f32;

    /// Hard filter consulted before a prefix is extended with `token`.
    /// The default accepts everything; vocabulary-trie backed models
    /// reject extensions that cannot continue any known word.
    fn is_valid_extension(&self, _state: &Self::State, _token: usize) -> bool {
        true
    }

    fn parallel_safe(&self) -> bool {
        true
    }
}

/// No-op scorer used when decoding without a language model. Scores are
/// pure CTC marginals.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroLm;

impl LanguageModel for ZeroLm {
    type State = ();

    fn start(&self, _start_with_nothing: bool) -> Self::State {}

    fn score(&self, _state: &Self::State, _token: usize) -> (Self::State, LmScore) {
        ((), LmScore::Ready(0.0))
    }

    fn finish(&self, _state: &Self::State) -> (Self::State, f32) {
        ((), 0.0)
    }

    fn compare(&self, _a: &Self::State, _b: &Self::State) -> Ordering {
        Ordering::Equal
    }

    fn alpha(&self) -> f32 {
        0.0
    }

    fn beta(&self) -> f32 {
        0.0
    }
}

/// Opaque state handle for dynamically-dispatched scorers.
pub type ScorerState = Arc<dyn Any + Send + Sync>;

/// Object-safe variant of [`LanguageModel`] for user-supplied scorers
/// that cannot be monomorphized into the decoder. State is an opaque
/// shared handle; the implementation downcasts it back.
pub trait Scorer: Send + Sync {
    fn start(&self, start_with_nothing: bool) -> ScorerState;
    fn score(&self, state: &ScorerState, token: usize) -> (ScorerState, LmScore);
    fn finish(&self, state: &ScorerState) -> (ScorerState, f32);
    fn compare(&self, a: &ScorerState, b: &ScorerState) -> Ordering;
    fn alpha(&self) -> f32;
    fn beta(&self) -> f32;

    fn is_valid_extension(&self, _state: &ScorerState, _token: usize) -> bool {
        true
    }

    /// Scorers backed by host-language callbacks are frequently bound to
    /// one thread, so the conservative default forces a single worker.
    fn parallel_safe(&self) -> bool {
        false
    }
}

/// Adapter running a boxed [`Scorer`] behind the monomorphic
/// [`LanguageModel`] interface the controller consumes.
pub struct DynLm {
    scorer: Box<dyn Scorer>,
}

impl DynLm {
    pub fn new(scorer: Box<dyn Scorer>) -> Self {
        Self { scorer }
    }
}

impl LanguageModel for DynLm {
    type State = ScorerState;

    fn start(&self, start_with_nothing: bool) -> Self::State {
        self.scorer.start(start_with_nothing)
    }

    fn score(&self, state: &Self::State, token: usize) -> (Self::State, LmScore) {
        self.scorer.score(state, token)
    }

    fn finish(&self, state: &Self::State) -> (Self::State, f32) {
        self.scorer.finish(state)
    }

    fn compare(&self, a: &Self::State, b: &Self::State) -> Ordering {
        self.scorer.compare(a, b)
    }

    fn alpha(&self) -> f32 {
        self.scorer.alpha()
    }

    fn beta(&self) -> f32 {
        self.scorer.beta()
    }

    fn is_valid_extension(&self, state: &Self::State, token: usize) -> bool {
        self.scorer.is_valid_extension(state, token)
    }

    fn parallel_safe(&self) -> bool {
        self.scorer.parallel_safe()
    }
}
