use crate::error::DecodeError;

/// Penalty applied to tokens the language model has no vocabulary entry
/// for. The LM context is not advanced on such tokens.
pub const OOV_SCORE: f32 = -1000.0;

/// N-gram backends report log-base-10 probabilities; dividing by this
/// constant converts them to natural log.
pub(crate) const LOG10_E: f32 = std::f32::consts::LOG10_E;

/// First four bytes of a serialized vocabulary trie.
pub(crate) const TRIE_MAGIC: [u8; 4] = *b"TRIE";

/// Trie file version accepted by the loader. Anything else is rejected.
pub(crate) const TRIE_FILE_VERSION: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct CtcDecoderConfig {
    /// Alphabet index of the CTC blank symbol.
    pub blank_id: usize,
    /// Number of hypotheses kept after each timestep and returned by decode.
    pub beam_size: usize,
    /// Linear cumulative-probability cutoff for per-timestep candidate
    /// pruning. Must lie in (0, 1]; 1.0 disables the probability cutoff.
    pub cutoff_prob: f64,
    /// Maximum number of candidate classes considered per timestep.
    pub cutoff_top_n: usize,
    /// Worker count for batch decoding. 0 means a single worker; values
    /// larger than the batch are clamped.
    pub num_threads: usize,
}

impl CtcDecoderConfig {
    pub const DEFAULT_BEAM_SIZE: usize = 100;
    pub const DEFAULT_CUTOFF_TOP_N: usize = 40;
    pub const DEFAULT_NUM_THREADS: usize = 4;

    pub(crate) fn validate(&self) -> Result<(), DecodeError> {
        if self.beam_size < 1 {
            return Err(DecodeError::invalid_argument("beam_size must be >= 1"));
        }
        if self.cutoff_top_n < 1 {
            return Err(DecodeError::invalid_argument("cutoff_top_n must be >= 1"));
        }
        if !(self.cutoff_prob > 0.0 && self.cutoff_prob <= 1.0) {
            return Err(DecodeError::invalid_argument(format!(
                "cutoff_prob must lie in (0, 1], got {}",
                self.cutoff_prob
            )));
        }
        Ok(())
    }
}

impl Default for CtcDecoderConfig {
    fn default() -> Self {
        Self {
            blank_id: 0,
            beam_size: Self::DEFAULT_BEAM_SIZE,
            cutoff_prob: 1.0,
            cutoff_top_n: Self::DEFAULT_CUTOFF_TOP_N,
            num_threads: Self::DEFAULT_NUM_THREADS,
        }
    }
}
