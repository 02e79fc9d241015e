pub mod batch;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod exporter;
pub mod exposition;
pub mod import;
pub mod range;
pub mod reader;
pub mod retry;
pub mod sample;
pub mod schema;
pub mod sink;

pub use error::{Error, Result};

/// Unix seconds, the resolution of below's store.
pub type Time = u64;
