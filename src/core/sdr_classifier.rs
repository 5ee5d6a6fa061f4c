//! SDRClassifier module.
//!
//! Learns to map sparse distributed representations (SDRs) to future discrete output
//! buckets for multiple prediction steps, and tracks a representative scalar value per
//! bucket so predicted bucket indices can be mapped back to real values. It sits
//! downstream of a sequence-memory/encoder stage that supplies the sparse pattern and
//! the bucketized target on every time step, and can be queried for next-step
//! predictions before the true outcome is known.
//!
//! Mechanism:
//! - Records recent input patterns with their learning iteration during training.
//! - Maintains one input-by-bucket weight matrix per prediction step, growing the
//!   matrices with zero padding as new input bits or buckets are encountered.
//! - For each new sample, updates the weights of every step whose elapsed iteration
//!   count matches a retained historical pattern, pulling that step's prediction for
//!   the historical pattern toward the currently observed bucket (error-driven online
//!   update, no batching).
//!
//! Inference:
//! - For each step, sums the weight rows of the active input bits on top of a uniform
//!   prior, exponentiates, and L1-normalizes, yielding a softmax probability
//!   distribution over buckets.
//! - Also reports the tracked actual value per bucket, so callers can translate the
//!   most likely bucket into a scalar prediction.
//!
//! State can be persisted in two independent formats (a versioned text stream and a
//! schema-typed binary form, see the `persistence` module) and compared for deep
//! equality to validate round trips.

use super::{
    bucket_values::BucketValues,
    history::PatternHistory,
    persistence::{self, ClassifierState, StepWeights},
    result::{ClassifierResult, ResultKey},
    weights::WeightStore,
};
use anyhow::Result;
use log::debug;
use std::io::{Read, Write};

/// Current persisted-state version. Version 0 streams (which predate explicit
/// iteration tracking) are still readable.
pub const VERSION: u32 = 1;

/// An online classifier mapping sparse input patterns to per-step bucket
/// probability distributions.
pub struct SDRClassifier {
    /// Learning rate for weight updates.
    alpha: f64,

    /// The current learning iteration (offset-adjusted record number).
    learn_iteration: u32,

    /// Offset between caller record numbers and `learn_iteration`, captured on the
    /// first call to `compute`.
    record_num_minus_learn_iteration: u32,

    /// Whether the offset has been captured yet.
    record_num_minus_learn_iteration_set: bool,

    /// `max(steps) + 1`; bounds how much pattern history is retained.
    max_steps: u32,

    /// Highest input bit index seen so far.
    max_input_idx: usize,

    /// Highest bucket index seen so far.
    max_bucket_idx: usize,

    /// The prediction steps this classifier learns, ascending and unique.
    steps: Vec<u32>,

    /// One weight matrix per step, indexed by position in `steps`.
    weights: WeightStore,

    /// Recent input patterns keyed by learning iteration.
    history: PatternHistory,

    /// Smoothed representative scalar per bucket.
    bucket_values: BucketValues,

    /// Persisted-state version; always [`VERSION`] in memory.
    version: u32,

    /// Diagnostic verbosity; non-zero enables debug logging in `compute`.
    verbosity: u32,
}

impl SDRClassifier {
    /// Creates a new classifier.
    ///
    /// # Arguments
    ///
    /// * `steps` - The prediction steps to learn; sorted and de-duplicated internally.
    ///   Must be non-empty.
    /// * `alpha` - The learning rate for weight updates.
    /// * `act_value_alpha` - The smoothing rate for per-bucket actual values.
    /// * `verbosity` - Non-zero enables per-call debug logging.
    pub fn new(mut steps: Vec<u32>, alpha: f64, act_value_alpha: f64, verbosity: u32) -> Self {
        assert!(!steps.is_empty(), "at least one prediction step is required");

        steps.sort_unstable();
        steps.dedup();

        let max_steps = steps.last().copied().unwrap_or(0) + 1;

        Self {
            alpha,
            learn_iteration: 0,
            record_num_minus_learn_iteration: 0,
            record_num_minus_learn_iteration_set: false,
            max_steps,
            max_input_idx: 0,
            max_bucket_idx: 0,
            weights: WeightStore::new(steps.len()),
            history: PatternHistory::with_capacity(max_steps as usize),
            bucket_values: BucketValues::new(act_value_alpha),
            steps,
            version: VERSION,
            verbosity,
        }
    }

    /// The prediction steps this classifier learns, ascending and unique.
    #[inline]
    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    /// The current learning iteration.
    #[inline]
    pub fn learn_iteration(&self) -> u32 {
        self.learn_iteration
    }

    /// Highest input bit index seen so far.
    #[inline]
    pub fn max_input_idx(&self) -> usize {
        self.max_input_idx
    }

    /// Highest bucket index seen so far.
    #[inline]
    pub fn max_bucket_idx(&self) -> usize {
        self.max_bucket_idx
    }

    /// Processes one input sample.
    ///
    /// Captures the record-number offset on the first call, records the pattern in the
    /// history, grows weight storage when new input bits appear, optionally writes the
    /// per-step distributions and the actual-value vector into `result`, and optionally
    /// performs the error-driven weight update against retained historical patterns.
    ///
    /// # Arguments
    ///
    /// * `record_num` - Caller-supplied record number; must not decrease across calls.
    /// * `pattern` - Active bit indices of the input SDR. Must be non-empty.
    /// * `bucket_idx` - The target bucket index for the current sample.
    /// * `act_value` - The scalar value that fell into `bucket_idx`.
    /// * `category` - Whether the target is categorical; categorical actual values are
    ///   assigned directly instead of smoothed.
    /// * `learn` - Whether to perform weight updates.
    /// * `infer` - Whether to write inference output into `result`.
    #[allow(clippy::too_many_arguments)]
    pub fn compute<R: ClassifierResult>(
        &mut self,
        record_num: u32,
        pattern: &[usize],
        bucket_idx: usize,
        act_value: f64,
        category: bool,
        learn: bool,
        infer: bool,
        result: &mut R,
    ) {
        assert!(!pattern.is_empty(), "input pattern must be non-empty");

        // Wrapping arithmetic: after a version-0 load the offset is recaptured here and
        // the caller may resume at a record number below the restored iteration, so the
        // offset is only meaningful modulo 2^32.
        if !self.record_num_minus_learn_iteration_set {
            self.record_num_minus_learn_iteration = record_num.wrapping_sub(self.learn_iteration);
            self.record_num_minus_learn_iteration_set = true;
        }

        self.learn_iteration = record_num.wrapping_sub(self.record_num_minus_learn_iteration);

        if self.verbosity > 0 {
            debug!(
                "compute: record_num={} learn_iteration={} active_bits={} bucket_idx={} learn={} infer={}",
                record_num,
                self.learn_iteration,
                pattern.len(),
                bucket_idx,
                learn,
                infer,
            );
        }

        let mut pattern = pattern.to_vec();
        pattern.sort_unstable();
        pattern.dedup();

        // New input bits grow every step's matrix with zero padding.
        let max_bit = *pattern.last().unwrap();
        if max_bit > self.max_input_idx {
            self.max_input_idx = max_bit;
            self.weights
                .ensure_capacity(self.max_input_idx, self.max_bucket_idx);
        }

        self.history.record(self.learn_iteration, pattern.clone());

        if infer {
            self.infer(&pattern, act_value, result);
        }

        if learn {
            if bucket_idx > self.max_bucket_idx {
                self.max_bucket_idx = bucket_idx;
                self.weights
                    .ensure_capacity(self.max_input_idx, self.max_bucket_idx);
            }

            self.bucket_values.ensure_capacity(self.max_bucket_idx);
            self.bucket_values.observe(bucket_idx, act_value, category);

            for (iteration, hist_pattern) in self.history.iter() {
                // Version-0 snapshots can carry positionally inferred iterations above
                // `learn_iteration`; the wrapped elapsed count then simply fails the
                // step lookup.
                let n_steps = self.learn_iteration.wrapping_sub(iteration);

                if let Ok(pos) = self.steps.binary_search(&n_steps) {
                    let error = self.calculate_error(bucket_idx, hist_pattern, pos);

                    for &bit in hist_pattern {
                        for (bucket, err) in error.iter().enumerate() {
                            self.weights.accumulate(pos, bit, bucket, self.alpha * err);
                        }
                    }
                }
            }
        }
    }

    /// Performs inference for the current pattern without learning.
    ///
    /// Writes one likelihood vector per step into `result`, plus the shared
    /// actual-value vector. For buckets not yet observed the actual value reported is
    /// `act_value`, except when 0-step prediction is configured: a same-step prediction
    /// must not leak the current label, so unseen buckets report `0.0` instead.
    pub fn infer<R: ClassifierResult>(&self, pattern: &[usize], act_value: f64, result: &mut R) {
        let unseen_value = if self.steps[0] == 0 { 0.0 } else { act_value };

        let act_values =
            result.create_vector(ResultKey::ActualValues, self.bucket_values.len(), 0.0);
        for (bucket, value) in act_values.iter_mut().enumerate() {
            *value = if self.bucket_values.is_seen(bucket) {
                self.bucket_values.value(bucket)
            } else {
                unseen_value
            };
        }

        let prior = 1.0 / self.bucket_values.len() as f64;
        for (pos, &step) in self.steps.iter().enumerate() {
            let likelihoods =
                result.create_vector(ResultKey::Step(step), self.max_bucket_idx + 1, prior);
            self.infer_single_step(pattern, pos, likelihoods);
        }
    }

    /// Computes the softmax likelihood vector for the step at `pos`.
    ///
    /// `into` must be pre-filled with the uniform prior. Each active bit's weight row is
    /// added on top, then the scores are exponentiated and L1-normalized. The per-vector
    /// maximum is subtracted before exponentiating; see DESIGN.md.
    fn infer_single_step(&self, pattern: &[usize], pos: usize, into: &mut [f64]) {
        for &bit in pattern {
            // Bits beyond the grown input range carry zero weight and contribute nothing.
            if bit >= self.weights.num_inputs() {
                continue;
            }
            for (score, weight) in into.iter_mut().zip(self.weights.row(pos, bit)) {
                *score += weight;
            }
        }

        let max = into.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for score in into.iter_mut() {
            *score = (*score - max).exp();
        }

        let total: f64 = into.iter().sum();
        for score in into.iter_mut() {
            *score /= total;
        }
    }

    /// Computes the error vector `target - predicted` for one historical pattern at the
    /// step at `pos`, where `target` is one-hot at `bucket_idx`.
    fn calculate_error(&self, bucket_idx: usize, pattern: &[usize], pos: usize) -> Vec<f64> {
        let prior = 1.0 / self.bucket_values.len() as f64;
        let mut likelihoods = vec![prior; self.max_bucket_idx + 1];
        self.infer_single_step(pattern, pos, &mut likelihoods);

        for (bucket, value) in likelihoods.iter_mut().enumerate() {
            let target = if bucket == bucket_idx { 1.0 } else { 0.0 };
            *value = target - *value;
        }

        likelihoods
    }

    /// Deep structural comparison used to validate persistence round trips.
    ///
    /// Learning rates and bucket-value estimates compare with absolute tolerance
    /// `1e-6`; everything else, including every weight cell, compares exactly. The
    /// asymmetry is deliberate: some persisted fields tolerate limited-precision text
    /// formatting, weight cells do not.
    pub fn equals(&self, other: &Self) -> bool {
        const TOLERANCE: f64 = 1e-6;

        if self.steps != other.steps {
            return false;
        }

        if (self.alpha - other.alpha).abs() > TOLERANCE
            || (self.bucket_values.act_value_alpha() - other.bucket_values.act_value_alpha())
                .abs()
                > TOLERANCE
            || self.learn_iteration != other.learn_iteration
            || self.record_num_minus_learn_iteration != other.record_num_minus_learn_iteration
            || self.record_num_minus_learn_iteration_set
                != other.record_num_minus_learn_iteration_set
            || self.max_steps != other.max_steps
        {
            return false;
        }

        if self.history.len() != other.history.len() {
            return false;
        }
        for ((iter_a, pattern_a), (iter_b, pattern_b)) in
            self.history.iter().zip(other.history.iter())
        {
            if iter_a != iter_b || pattern_a != pattern_b {
                return false;
            }
        }

        if self.max_bucket_idx != other.max_bucket_idx
            || self.max_input_idx != other.max_input_idx
        {
            return false;
        }

        for pos in 0..self.steps.len() {
            if self.weights.cells(pos) != other.weights.cells(pos) {
                return false;
            }
        }

        if self.bucket_values.len() != other.bucket_values.len() {
            return false;
        }
        for ((value_a, seen_a), (value_b, seen_b)) in
            self.bucket_values.iter().zip(other.bucket_values.iter())
        {
            if (value_a - value_b).abs() > TOLERANCE || seen_a != seen_b {
                return false;
            }
        }

        self.version == other.version && self.verbosity == other.verbosity
    }

    /// Serializes the full state as the versioned text stream format.
    pub fn save_to_stream<W: Write>(&self, out: &mut W) -> Result<()> {
        persistence::write_stream(&self.snapshot(), out)
    }

    /// Replaces this instance's state with one parsed from the text stream format.
    ///
    /// Version 0 streams are upgraded on load. On error the instance may be left
    /// partially cleared and must be discarded.
    pub fn load_from_stream<R: Read>(&mut self, input: &mut R) -> Result<()> {
        let state = persistence::read_stream(input)?;
        debug!(
            "loaded stream state: learn_iteration={} steps={:?}",
            state.learn_iteration, state.steps
        );
        self.restore(state)
    }

    /// Serializes the full state as the schema-typed binary format.
    pub fn write_to_schema<W: Write>(&self, out: &mut W) -> Result<()> {
        persistence::write_schema(&self.snapshot(), out)
    }

    /// Replaces this instance's state with one parsed from the schema-typed binary
    /// format.
    pub fn read_from_schema<R: Read>(&mut self, input: &mut R) -> Result<()> {
        let state = persistence::read_schema(input)?;
        self.restore(state)
    }

    /// Byte length of the stream-format serialization, via a throwaway in-memory save.
    pub fn persistent_size(&self) -> Result<usize> {
        let mut buffer = Vec::new();
        self.save_to_stream(&mut buffer)?;
        Ok(buffer.len())
    }

    /// Captures the canonical state-transfer snapshot both codecs serialize.
    pub(crate) fn snapshot(&self) -> ClassifierState {
        let (actual_values, actual_values_set) = self.bucket_values.iter().unzip();

        ClassifierState {
            version: self.version,
            alpha: self.alpha,
            act_value_alpha: self.bucket_values.act_value_alpha(),
            learn_iteration: self.learn_iteration,
            record_num_minus_learn_iteration: self.record_num_minus_learn_iteration,
            record_num_minus_learn_iteration_set: self.record_num_minus_learn_iteration_set,
            max_steps: self.max_steps,
            max_input_idx: self.max_input_idx,
            max_bucket_idx: self.max_bucket_idx,
            verbosity: self.verbosity,
            steps: self.steps.clone(),
            iteration_history: self.history.iter().map(|(iteration, _)| iteration).collect(),
            pattern_history: self
                .history
                .iter()
                .map(|(_, pattern)| pattern.to_vec())
                .collect(),
            weights: self
                .steps
                .iter()
                .enumerate()
                .map(|(pos, &step)| StepWeights {
                    step,
                    cells: self.weights.cells(pos).to_vec(),
                })
                .collect(),
            actual_values,
            actual_values_set,
        }
    }

    /// Rebuilds this instance from a state-transfer snapshot, validating structural
    /// invariants. The in-memory version is stamped to [`VERSION`] regardless of the
    /// snapshot's source version.
    pub(crate) fn restore(&mut self, state: ClassifierState) -> Result<()> {
        persistence::validate(&state)?;

        let ClassifierState {
            alpha,
            act_value_alpha,
            learn_iteration,
            record_num_minus_learn_iteration,
            record_num_minus_learn_iteration_set,
            max_steps,
            max_input_idx,
            max_bucket_idx,
            verbosity,
            steps,
            iteration_history,
            pattern_history,
            weights,
            actual_values,
            actual_values_set,
            ..
        } = state;

        self.alpha = alpha;
        self.learn_iteration = learn_iteration;
        self.record_num_minus_learn_iteration = record_num_minus_learn_iteration;
        self.record_num_minus_learn_iteration_set = record_num_minus_learn_iteration_set;
        self.max_steps = max_steps;
        self.max_input_idx = max_input_idx;
        self.max_bucket_idx = max_bucket_idx;
        self.verbosity = verbosity;
        self.weights = WeightStore::from_flat(
            weights.into_iter().map(|w| w.cells).collect(),
            max_input_idx,
            max_bucket_idx,
        );
        self.history = PatternHistory::from_entries(
            max_steps as usize,
            iteration_history.into_iter().zip(pattern_history).collect(),
        );
        self.bucket_values =
            BucketValues::from_parts(act_value_alpha, actual_values, actual_values_set);
        self.steps = steps;
        self.version = VERSION;

        Ok(())
    }
}
