// src/lib.rs
pub mod checkpoint;
pub mod config;
pub mod duck;
pub mod error;
pub mod fetch;
pub mod gitignore;
pub mod logging;
pub mod pg;
pub mod pipeline;
pub mod process;
pub mod schema;
pub mod sink;

pub use error::{IngestError, Result};
