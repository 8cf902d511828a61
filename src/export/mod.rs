//! The streaming export engine (§4.4): cursor source -> format encoder -> multipart sink.

pub mod encoders;
pub mod engine;
pub mod sink;
pub mod source;

pub use engine::{run, ExportOutcome, ExportRequest};
pub use source::Dataset;
