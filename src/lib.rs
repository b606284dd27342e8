pub mod alphabet;
pub mod config;
mod decoder;
pub mod error;
pub mod lm;
pub mod search;
pub mod types;

pub use alphabet::Alphabet;
pub use config::{CtcDecoderConfig, OOV_SCORE};
pub use decoder::{CtcDecoder, CtcDecoderBuilder};
pub use error::DecodeError;
pub use lm::ngram::{NgramLm, NgramModel, NgramState};
pub use lm::trie::VocabTrie;
pub use lm::{DynLm, LanguageModel, LmScore, LmUnit, Scorer, ScorerState, ZeroLm};
pub use search::beam::DecoderState;
pub use types::{BatchDecodeOutput, Output};
