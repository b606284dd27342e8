use crate::config::CtcDecoderConfig;
use crate::error::DecodeError;
use crate::lm::{LanguageModel, ZeroLm};
use crate::search::beam::{self, DecoderState, SearchParams};
use crate::search::batch;
use crate::types::{BatchDecodeOutput, Output};

/// CTC prefix beam-search decoder. Holds the search configuration and
/// the language model; one instance decodes any number of sequences,
/// streaming or batched, and is shareable across threads.
pub struct CtcDecoder<L: LanguageModel = ZeroLm> {
    config: CtcDecoderConfig,
    lm: L,
}

impl CtcDecoder<ZeroLm> {
    /// Decoder without a language model: scores are pure CTC marginals.
    pub fn new(config: CtcDecoderConfig) -> Result<Self, DecodeError> {
        Self::with_lm(config, ZeroLm)
    }
}

impl<L: LanguageModel> CtcDecoder<L> {
    pub fn with_lm(config: CtcDecoderConfig, lm: L) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self { config, lm })
    }

    pub fn config(&self) -> &CtcDecoderConfig {
        &self.config
    }

    pub fn lm(&self) -> &L {
        &self.lm
    }

    fn params(&self) -> SearchParams {
        SearchParams {
            blank_id: self.config.blank_id,
            beam_size: self.config.beam_size,
            // Linear at the public boundary, natural log inside.
            log_cutoff_prob: self.config.cutoff_prob.ln(),
            cutoff_top_n: self.config.cutoff_top_n,
        }
    }

    /// Starts a streaming decode over `class_dim` classes. The returned
    /// state owns the growing prefix tree for one sequence.
    pub fn begin(&self, class_dim: usize) -> Result<DecoderState<L::State>, DecodeError> {
        if class_dim == 0 {
            return Err(DecodeError::invalid_argument("class_dim must be >= 1"));
        }
        if self.config.blank_id >= class_dim {
            return Err(DecodeError::invalid_argument(format!(
                "blank_id {} out of range for {class_dim} classes",
                self.config.blank_id
            )));
        }
        Ok(beam::init_state(&self.lm, class_dim))
    }

    /// Feeds `log_probs.len() / class_dim` further timesteps of
    /// row-major log-probabilities into a streaming decode.
    pub fn advance(
        &self,
        state: &mut DecoderState<L::State>,
        log_probs: &[f32],
    ) -> Result<(), DecodeError> {
        beam::advance(state, &self.lm, &self.params(), log_probs)
    }

    /// Ranks the live beam, including the LM end-of-sentence
    /// contribution, and returns up to `beam_size` hypotheses in
    /// descending score order. The state stays usable for further
    /// `advance` calls.
    pub fn decode(&self, state: &DecoderState<L::State>) -> Vec<Output> {
        beam::decode(state, &self.lm, self.config.beam_size)
    }

    /// Decodes a dense batch: `log_probs` is row-major
    /// `[batch_size, max_time, class_dim]` and `seq_lengths` gives the
    /// valid timestep count per item. Items are decoded independently on
    /// up to `num_threads` workers; outputs are ordered by batch index.
    pub fn decode_batch(
        &self,
        log_probs: &[f32],
        batch_size: usize,
        max_time: usize,
        class_dim: usize,
        seq_lengths: &[usize],
    ) -> Result<BatchDecodeOutput, DecodeError> {
        batch::decode_batch(
            &self.lm,
            &self.params(),
            self.config.num_threads,
            log_probs,
            batch_size,
            max_time,
            class_dim,
            seq_lengths,
        )
    }
}

/// Builder for [`CtcDecoder`]. The language model defaults to
/// [`ZeroLm`]; supplying one changes the decoder's type parameter.
pub struct CtcDecoderBuilder<L: LanguageModel = ZeroLm> {
    config: CtcDecoderConfig,
    lm: L,
}

impl CtcDecoderBuilder<ZeroLm> {
    pub fn new(config: CtcDecoderConfig) -> Self {
        Self { config, lm: ZeroLm }
    }
}

impl<L: LanguageModel> CtcDecoderBuilder<L> {
    pub fn with_lm<M: LanguageModel>(self, lm: M) -> CtcDecoderBuilder<M> {
        CtcDecoderBuilder {
            config: self.config,
            lm,
        }
    }

    pub fn with_beam_size(mut self, beam_size: usize) -> Self {
        self.config.beam_size = beam_size;
        self
    }

    pub fn with_cutoff(mut self, cutoff_prob: f64, cutoff_top_n: usize) -> Self {
        self.config.cutoff_prob = cutoff_prob;
        self.config.cutoff_top_n = cutoff_top_n;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.config.num_threads = num_threads;
        self
    }

    pub fn build(self) -> Result<CtcDecoder<L>, DecodeError> {
        CtcDecoder::with_lm(self.config, self.lm)
    }
}
