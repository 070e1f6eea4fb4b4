pub mod api;
pub mod csv_io;
pub mod database;
pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod progress_log;
pub mod transform;

pub use error::{EtlError, Result};
pub use pipeline::{EtlPipeline, PipelineReport};
