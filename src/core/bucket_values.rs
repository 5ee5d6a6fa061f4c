//! Tracks a representative scalar value per output bucket.
//!
//! Bucket indices are only meaningful to the encoder that produced them; to turn a
//! predicted bucket back into a real-valued prediction the classifier keeps, for every
//! bucket it has seen, a running estimate of the scalar values that landed in it.
//!
//! Continuous targets are smoothed exponentially so noisy observations average out.
//! Categorical targets are assigned directly, since each observation is authoritative
//! and smoothing between category labels would be meaningless. The first observation of
//! a bucket is always assigned directly to avoid biasing the estimate toward zero.

/// Smoothed per-bucket scalar estimates with seen/unseen flags.
#[derive(Debug, Clone)]
pub struct BucketValues {
    /// Smoothing rate for continuous targets.
    act_value_alpha: f64,

    /// Current estimate per bucket index.
    values: Vec<f64>,

    /// Whether the bucket has ever been observed.
    seen: Vec<bool>,
}

impl BucketValues {
    /// Creates a tracker with a single unseen bucket, smoothing at `act_value_alpha`.
    #[inline]
    pub fn new(act_value_alpha: f64) -> Self {
        Self {
            act_value_alpha,
            values: vec![0.0],
            seen: vec![false],
        }
    }

    /// The smoothing rate this tracker was configured with.
    #[inline]
    pub fn act_value_alpha(&self) -> f64 {
        self.act_value_alpha
    }

    /// Number of buckets tracked so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The current estimate for `bucket`.
    #[inline]
    pub fn value(&self, bucket: usize) -> f64 {
        self.values[bucket]
    }

    /// Whether `bucket` has been observed at least once.
    #[inline]
    pub fn is_seen(&self, bucket: usize) -> bool {
        self.seen[bucket]
    }

    /// Extends both arrays with `(0.0, unseen)` defaults until `max_bucket_idx` is a
    /// valid index. Never shrinks.
    pub fn ensure_capacity(&mut self, max_bucket_idx: usize) {
        while self.values.len() <= max_bucket_idx {
            self.values.push(0.0);
            self.seen.push(false);
        }
    }

    /// Folds one observation into the estimate for `bucket`.
    ///
    /// The first observation of a bucket, and every categorical observation, replaces
    /// the estimate outright; all other observations are smoothed exponentially.
    pub fn observe(&mut self, bucket: usize, value: f64, category: bool) {
        if !self.seen[bucket] || category {
            self.values[bucket] = value;
            self.seen[bucket] = true;
        } else {
            self.values[bucket] =
                (1.0 - self.act_value_alpha) * self.values[bucket] + self.act_value_alpha * value;
        }
    }

    /// Iterates `(estimate, seen)` pairs in bucket order, as persisted.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (f64, bool)> + '_ {
        self.values.iter().copied().zip(self.seen.iter().copied())
    }

    /// Rebuilds a tracker from persisted parallel arrays.
    pub fn from_parts(act_value_alpha: f64, values: Vec<f64>, seen: Vec<bool>) -> Self {
        debug_assert_eq!(values.len(), seen.len());
        Self {
            act_value_alpha,
            values,
            seen,
        }
    }
}
