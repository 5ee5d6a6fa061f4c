pub mod bucket_values;
pub mod history;
pub mod persistence;
pub mod result;
pub mod sdr_classifier;
pub mod weights;
