//! The contract between the classifier and whatever container carries its inference
//! output downstream.
//!
//! The classifier does not own its output representation: per inference call it asks the
//! container for one freshly sized, fill-initialized vector per prediction step (keyed
//! by the step id) plus one for the per-bucket actual values, and writes into them. This
//! keeps the classifier decoupled from whichever result type the surrounding pipeline
//! uses; [`InferenceResult`] is a ready map-backed implementation for callers without
//! their own.

use fxhash::FxHashMap;

/// Key under which one output vector is stored in a classifier result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKey {
    /// The predicted bucket distribution for one prediction step.
    Step(u32),

    /// The per-bucket actual-value vector shared by all steps.
    ActualValues,
}

/// Receives the classifier's inference output.
pub trait ClassifierResult {
    /// Returns a freshly allocated vector of `len` copies of `fill` stored under `key`,
    /// replacing any vector previously stored there.
    fn create_vector(&mut self, key: ResultKey, len: usize, fill: f64) -> &mut Vec<f64>;
}

/// Map-backed [`ClassifierResult`] implementation.
#[derive(Debug, Default, Clone)]
pub struct InferenceResult {
    vectors: FxHashMap<ResultKey, Vec<f64>>,
}

impl InferenceResult {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The predicted bucket distribution for `step`, if inference produced one.
    #[inline]
    pub fn distribution(&self, step: u32) -> Option<&[f64]> {
        self.vectors.get(&ResultKey::Step(step)).map(Vec::as_slice)
    }

    /// The per-bucket actual-value vector, if inference produced one.
    #[inline]
    pub fn actual_values(&self) -> Option<&[f64]> {
        self.vectors.get(&ResultKey::ActualValues).map(Vec::as_slice)
    }
}

impl ClassifierResult for InferenceResult {
    fn create_vector(&mut self, key: ResultKey, len: usize, fill: f64) -> &mut Vec<f64> {
        self.vectors.insert(key, vec![fill; len]);
        self.vectors.get_mut(&key).unwrap()
    }
}
