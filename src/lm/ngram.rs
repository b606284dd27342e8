use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use crate::alphabet::Alphabet;
use crate::config::{LOG10_E, OOV_SCORE};
use crate::error::DecodeError;
use crate::lm::trie::VocabTrie;
use crate::lm::{LanguageModel, LmScore, LmUnit};

/// Loaded n-gram model handle. Loading and file-format concerns live
/// behind this trait; the decoder only queries states and scores.
///
/// `base_score` returns log-base-10 probabilities, the native unit of
/// n-gram model files; [`NgramLm`] converts to natural log. Vocabulary
/// index 0 is the unknown word.
pub trait NgramModel: Send + Sync {
    type State: Clone + Send + Sync;

    fn null_context_state(&self) -> Self::State;

    fn begin_sentence_state(&self) -> Self::State;

    /// Probability of `vocab_index` following `state`, with the successor
    /// state, in log base 10.
    fn base_score(&self, state: &Self::State, vocab_index: u32) -> (Self::State, f32);

    /// Model vocabulary index for an entry; 0 when unknown.
    fn vocab_index(&self, entry: &str) -> u32;

    fn end_sentence_index(&self) -> u32;

    fn compare_states(&self, a: &Self::State, b: &Self::State) -> Ordering;

    /// Model vocabulary for trie construction, when the backend can
    /// enumerate it.
    fn vocabulary(&self) -> Option<Vec<String>> {
        None
    }
}

/// LM context for a prefix: the model state plus, in word-unit mode,
/// the token indices of the current unfinished word.
#[derive(Debug, Clone)]
pub struct NgramState<S> {
    context: S,
    pending: Vec<usize>,
}

/// N-gram language model adapter implementing [`LanguageModel`] on top
/// of a loaded model handle, with optional vocabulary-trie filtering.
pub struct NgramLm<M: NgramModel> {
    model: M,
    alphabet: Arc<Alphabet>,
    unit: LmUnit,
    trie: Option<VocabTrie>,
    alpha: f32,
    beta: f32,
}

impl<M: NgramModel> NgramLm<M> {
    pub fn new(model: M, alphabet: Arc<Alphabet>, unit: LmUnit) -> Self {
        Self {
            model,
            alphabet,
            unit,
            trie: None,
            alpha: 0.0,
            beta: 0.0,
        }
    }

    /// Like [`NgramLm::new`], with a vocabulary trie restored from
    /// `trie_path`. When the file is absent and `build_if_missing` is
    /// set, the trie is built from the model vocabulary and saved there.
    /// Load, build, and save failures abort construction.
    pub fn with_trie(
        model: M,
        alphabet: Arc<Alphabet>,
        unit: LmUnit,
        trie_path: &Path,
        build_if_missing: bool,
    ) -> Result<Self, DecodeError> {
        let trie = if trie_path.exists() {
            VocabTrie::load(trie_path)?
        } else if build_if_missing {
            let words = model.vocabulary().ok_or_else(|| {
                DecodeError::invalid_argument(
                    "model cannot enumerate its vocabulary; provide a prebuilt trie",
                )
            })?;
            let trie = VocabTrie::from_words(&words, &alphabet);
            trie.save(trie_path)?;
            tracing::debug!(
                path = %trie_path.display(),
                nodes = trie.node_count(),
                "trie: built vocabulary trie from model"
            );
            trie
        } else {
            return Err(DecodeError::io(
                "open trie file",
                std::io::Error::new(std::io::ErrorKind::NotFound, trie_path.display().to_string()),
            ));
        };
        let mut lm = Self::new(model, alphabet, unit);
        lm.trie = Some(trie);
        Ok(lm)
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha;
    }

    pub fn set_beta(&mut self, beta: f32) {
        self.beta = beta;
    }

    pub fn unit(&self) -> LmUnit {
        self.unit
    }

    fn scored_entry(&self, state: &NgramState<M::State>, token: usize) -> String {
        match self.unit {
            LmUnit::Word => state
                .pending
                .iter()
                .map(|&t| self.alphabet.entry(t))
                .collect(),
            LmUnit::Character => self.alphabet.entry(token).to_string(),
        }
    }
}

impl<M: NgramModel> LanguageModel for NgramLm<M> {
    type State = NgramState<M::State>;

    fn start(&self, start_with_nothing: bool) -> Self::State {
        let context = if start_with_nothing {
            self.model.null_context_state()
        } else {
            self.model.begin_sentence_state()
        };
        NgramState {
            context,
            pending: Vec::new(),
        }
    }

    fn score(&self, state: &Self::State, token: usize) -> (Self::State, LmScore) {
        if self.unit == LmUnit::Word && token != self.alphabet.space_index() {
            let mut out = state.clone();
            out.pending.push(token);
            return (out, LmScore::Pending);
        }

        let entry = self.scored_entry(state, token);
        let vocab_index = self.model.vocab_index(&entry);
        if vocab_index == 0 {
            // Unknown word: fixed penalty, model context unchanged.
            let out = NgramState {
                context: state.context.clone(),
                pending: Vec::new(),
            };
            return (out, LmScore::Ready(OOV_SCORE));
        }

        let (context, log10_score) = self.model.base_score(&state.context, vocab_index);
        let out = NgramState {
            context,
            pending: Vec::new(),
        };
        (out, LmScore::Ready(log10_score / LOG10_E))
    }

    fn finish(&self, state: &Self::State) -> (Self::State, f32) {
        let mut total = 0.0f32;
        let mut current = state.clone();

        if self.unit == LmUnit::Word && !current.pending.is_empty() {
            let (flushed, score) = self.score(&current, self.alphabet.space_index());
            if let LmScore::Ready(delta) = score {
                total += delta;
            }
            current = flushed;
        }

        let (context, log10_eos) = self
            .model
            .base_score(&current.context, self.model.end_sentence_index());
        total += log10_eos / LOG10_E;
        (
            NgramState {
                context,
                pending: Vec::new(),
            },
            total,
        )
    }

    fn compare(&self, a: &Self::State, b: &Self::State) -> Ordering {
        self.model
            .compare_states(&a.context, &b.context)
            .then_with(|| a.pending.cmp(&b.pending))
    }

    fn alpha(&self) -> f32 {
        self.alpha
    }

    fn beta(&self) -> f32 {
        self.beta
    }

    fn is_valid_extension(&self, state: &Self::State, token: usize) -> bool {
        let Some(trie) = &self.trie else {
            return true;
        };
        if self.unit != LmUnit::Word {
            return true;
        }
        if token == self.alphabet.space_index() {
            // A word may end here only if the buffered spelling is known.
            state.pending.is_empty() || trie.is_word(&state.pending)
        } else {
            trie.accepts(&state.pending, token)
        }
    }
}
