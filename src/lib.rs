//! Online multi-step SDR classifier.
//!
//! Maps sparse distributed representations (SDRs) to probability distributions over
//! discrete output buckets, one distribution per configured prediction step, learning
//! online from a single pass over the input stream. Classifier state can be persisted
//! in two independent formats and compared for deep equality to validate round trips.

pub mod core;
