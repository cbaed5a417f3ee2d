//! attemptlog-core: patch model, read-model data types and feed configuration
//! shared by the sequence, projection, source and runtime crates.

pub mod config;
pub mod types;

pub use config::{ConfigError, FeedConfig, ProcessNaming, TodoConfig, TodoRule};
