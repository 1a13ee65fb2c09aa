//! examforge: exam item generation pipeline.
//!
//! This library plans, drafts and validates Year 6 multiple-choice exam
//! items through a small set of agents connected by an in-process event bus.

// Core modules
pub mod agents;
pub mod bus;
pub mod cli;
pub mod error;
pub mod exam;
pub mod llm;
pub mod pipeline;
pub mod storage;
pub mod utils;

// Re-export commonly used error types
pub use error::{BusError, LlmError, OracleError, StorageError};
