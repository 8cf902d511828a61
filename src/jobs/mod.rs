//! Job admission (§4.3).

pub mod admission;

pub use admission::{admit_job, AdmissionError};
