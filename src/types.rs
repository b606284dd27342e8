/// One decoded hypothesis: collapsed token sequence, the timestep each
/// token was first emitted at, and the final score (natural-log CTC
/// marginal plus any language-model contribution).
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub tokens: Vec<i32>,
    pub timesteps: Vec<i32>,
    pub probability: f32,
}

/// Dense batch decoding result. Token and timestep buffers are row-major
/// `[batch, beam, max_time]`, zero-padded past each hypothesis length;
/// scores and lengths are `[batch, beam]`. Beam slots a sequence did not
/// fill stay zeroed with a length of 0.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDecodeOutput {
    pub batch_size: usize,
    pub beam_size: usize,
    pub max_time: usize,
    pub tokens: Vec<i32>,
    pub timesteps: Vec<i32>,
    pub scores: Vec<f32>,
    pub output_lengths: Vec<i32>,
}

impl BatchDecodeOutput {
    pub(crate) fn zeroed(batch_size: usize, beam_size: usize, max_time: usize) -> Self {
        Self {
            batch_size,
            beam_size,
            max_time,
            tokens: vec![0; batch_size * beam_size * max_time],
            timesteps: vec![0; batch_size * beam_size * max_time],
            scores: vec![0.0; batch_size * beam_size],
            output_lengths: vec![0; batch_size * beam_size],
        }
    }

    fn row(&self, batch: usize, beam: usize) -> usize {
        debug_assert!(batch < self.batch_size && beam < self.beam_size);
        (batch * self.beam_size + beam) * self.max_time
    }

    pub fn output_length(&self, batch: usize, beam: usize) -> usize {
        self.output_lengths[batch * self.beam_size + beam] as usize
    }

    pub fn score(&self, batch: usize, beam: usize) -> f32 {
        self.scores[batch * self.beam_size + beam]
    }

    /// Token indices of one hypothesis, trimmed to its actual length.
    pub fn tokens(&self, batch: usize, beam: usize) -> &[i32] {
        let row = self.row(batch, beam);
        &self.tokens[row..row + self.output_length(batch, beam)]
    }

    /// Emission timesteps of one hypothesis, trimmed to its actual length.
    pub fn timesteps(&self, batch: usize, beam: usize) -> &[i32] {
        let row = self.row(batch, beam);
        &self.timesteps[row..row + self.output_length(batch, beam)]
    }

    pub fn hypothesis(&self, batch: usize, beam: usize) -> Output {
        Output {
            tokens: self.tokens(batch, beam).to_vec(),
            timesteps: self.timesteps(batch, beam).to_vec(),
            probability: self.score(batch, beam),
        }
    }
}
